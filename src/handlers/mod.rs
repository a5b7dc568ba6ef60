//! HTTP request handlers and the API router

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod middleware;
pub mod supervisor;

use crate::db::Store;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub is_production: bool,
    pub trusted_proxies: Arc<[String]>,
    pub session_expiry_hours: i64,
    pub assessment_link_days: i64,
    pub public_base_url: Arc<str>,
}

/// All `/api` routes with their access layers
pub fn api_router(state: AppState) -> Router {
    let session = from_fn_with_state(state.clone(), middleware::require_dashboard_user);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).route_layer(session.clone()))
        .route(
            "/password",
            post(auth::change_password).route_layer(session.clone()),
        );

    let dashboard_routes = Router::new()
        .route("/scope", get(dashboard::scope))
        .route("/stats", get(dashboard::stats))
        .route("/students", get(dashboard::students))
        .route("/students/:id", get(dashboard::student_report))
        .route(
            "/students/:id/specialization",
            put(dashboard::update_specialization),
        )
        .route("/timesheets", get(dashboard::timesheets))
        .route("/timesheets/:id/approve", post(dashboard::approve_timesheet))
        .route("/timesheets/:id/reject", post(dashboard::reject_timesheet))
        .route(
            "/assessments",
            get(dashboard::assessments).post(dashboard::issue_assessment),
        )
        .route(
            "/companies",
            get(dashboard::companies).post(dashboard::create_company),
        )
        .route(
            "/companies/:id",
            put(dashboard::update_company).delete(dashboard::delete_company),
        )
        .route(
            "/classes",
            get(dashboard::classes).post(dashboard::create_class),
        )
        .route_layer(session.clone());

    // Layers run bottom-up: the session is resolved before the admin check
    let admin_routes = Router::new()
        .route("/overview", get(admin::overview))
        .route("/users", post(admin::create_user))
        .route("/users/:id", delete(admin::delete_user))
        .route("/teachers/pending", get(admin::pending_teachers))
        .route("/teachers/:id/approve", post(admin::approve_teacher))
        .route("/teachers/:id/reject", post(admin::reject_teacher))
        .route_layer(from_fn(middleware::require_admin))
        .route_layer(session);

    let supervisor_routes = Router::new().route(
        "/:request_id",
        get(supervisor::view).post(supervisor::submit),
    );

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/dashboard", dashboard_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/supervisor", supervisor_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::security_headers,
        ))
        .with_state(state)
}
