//! Authentication handlers and session cookie helpers

use crate::error::{AccessError, AppError, AppResult};
use crate::models::*;
use crate::security::{generate_token, hash_token};
use crate::services::{audit, users};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, Utc};
use std::net::SocketAddr;

use super::AppState;

/// Session cookie name
pub const SESSION_COOKIE: &str = "apl_session";

/// Rate limit: max attempts per IP per hour
const MAX_LOGIN_ATTEMPTS: i64 = 10;

const LOGIN_ENDPOINT: &str = "login";

// =============================================================================
// Endpoints
// =============================================================================

/// Teacher/admin login
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let client_ip = client_ip(&headers, peer.map(|c| c.0), &state.trusted_proxies);

    if state
        .store
        .count_recent_attempts(&client_ip, LOGIN_ENDPOINT)
        .await?
        >= MAX_LOGIN_ATTEMPTS
    {
        tracing::warn!("Login rate limit hit for {}", client_ip);
        return Err(AppError::RateLimited);
    }
    state.store.record_attempt(&client_ip, LOGIN_ENDPOINT).await?;

    let authenticated =
        users::authenticate(state.store.as_ref(), &input.email, &input.password).await;
    let principal = match authenticated {
        Ok(principal) => principal,
        Err(e) => {
            tracing::info!("Refused login from {}: {}", client_ip, e);
            return Err(e);
        }
    };

    let token = generate_token();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.chars().take(500).collect());

    state
        .store
        .create_session(NewSession {
            user_id: principal.id,
            token_hash: hash_token(&token),
            expires_at: Utc::now() + Duration::hours(state.session_expiry_hours),
            ip_address: client_ip.clone(),
            user_agent,
        })
        .await?;

    audit(
        state.store.as_ref(),
        AuditEntry::new("login", "user", principal.id)
            .by(principal.id)
            .from_ip(client_ip),
    )
    .await;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, &state))],
        Json(ApiResponse::success(principal)),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    if let Some(token) = extract_session_token(&headers) {
        if let Some(session) = state.store.delete_session(&hash_token(&token)).await? {
            audit(
                state.store.as_ref(),
                AuditEntry::new("logout", "user", session.user_id).by(session.user_id),
            )
            .await;
        }
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(ApiResponse::success(())),
    ))
}

/// Change the signed-in user's password. The current session stays valid.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    users::change_password(state.store.as_ref(), &principal, &input).await?;
    Ok(Json(ApiResponse::success(())))
}

/// The principal attached by the session middleware
pub async fn me(Extension(principal): Extension<Principal>) -> Json<ApiResponse<Principal>> {
    Json(ApiResponse::success(principal))
}

/// Resolve the session cookie to a dashboard principal
pub async fn principal_from_headers(state: &AppState, headers: &HeaderMap) -> AppResult<Principal> {
    let token = extract_session_token(headers).ok_or(AccessError::Unauthenticated)?;
    let session = state
        .store
        .find_session(&hash_token(&token))
        .await?
        .ok_or(AccessError::Unauthenticated)?;
    users::resolve_principal(state.store.as_ref(), session.user_id).await
}

// =============================================================================
// Cookies
// =============================================================================

fn session_cookie(token: &str, state: &AppState) -> String {
    let secure = if state.is_production { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        state.session_expiry_hours * 3600,
        secure
    )
}

pub fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        SESSION_COOKIE
    )
}

pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;

    cookie_header
        .split(';')
        .filter_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Caller IP. X-Forwarded-For is only believed when the peer is a trusted proxy.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[String],
) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    let peer_ip = peer.ip().to_string();

    if trusted_proxies.iter().any(|p| peer_ip.starts_with(p.as_str())) {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer_ip
}
