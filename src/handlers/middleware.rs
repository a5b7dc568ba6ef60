//! Middleware for authentication and security headers

use crate::error::{AccessError, AppError};
use crate::handlers::auth::principal_from_headers;
use crate::handlers::AppState;
use crate::models::Principal;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Resolve the session to a teacher/admin principal, available via
/// `Extension<Principal>`
pub async fn require_dashboard_user(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers().clone();
    let principal = principal_from_headers(&state, &headers).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Admin-only routes. Must run inside [`require_dashboard_user`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<Principal>()
        .is_some_and(Principal::is_admin);
    if !is_admin {
        return Err(AccessError::Forbidden.into());
    }
    Ok(next.run(request).await)
}

/// Security headers middleware
pub async fn security_headers(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; form-action 'self'; base-uri 'self'; frame-ancestors 'none'",
        ),
    );

    if state.is_production {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
    }

    response
}
