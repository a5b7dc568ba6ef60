//! APL Portal
//!
//! Backend for a school's workplace-based learning (APL) programme.
//!
//! ## Features
//!
//! - **Dashboard**: teachers and admins review timesheets, hours and
//!   assessments for the students in their scope
//! - **Supervisor links**: one-time tokenized assessment forms for workplace
//!   supervisors
//! - **Administration**: user lifecycle and teacher approval

mod config;
mod db;
mod error;
mod handlers;
mod hours;
mod models;
mod scope;
mod security;
mod services;
mod validation;

#[cfg(test)]
mod test_support;

use db::Store;
use handlers::AppState;
use models::{NewUser, Role};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apl_portal=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Starting APL Portal");
    tracing::info!("Environment: {:?}", config.environment);

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(db::PgStore::new(pool));

    if let Some(bootstrap) = &config.bootstrap_admin {
        ensure_admin(store.as_ref(), bootstrap).await?;
    }

    let state = AppState {
        store,
        is_production: config.is_production(),
        trusted_proxies: Arc::from(config.trusted_proxies.clone()),
        session_expiry_hours: config.session_expiry_hours,
        assessment_link_days: config.assessment_link_days,
        public_base_url: Arc::from(config.public_base_url.as_str()),
    };

    let cors = if config.is_production() {
        CorsLayer::new()
            .allow_origin(
                config
                    .cors_origins
                    .iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    let app = handlers::api_router(state)
        .fallback_service(ServeDir::new(&config.frontend_dir))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(cors);

    let addr = config.server_addr();
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Frontend served from: {}", config.frontend_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the first admin account when none exists
async fn ensure_admin(
    store: &dyn Store,
    bootstrap: &config::BootstrapAdmin,
) -> Result<(), Box<dyn std::error::Error>> {
    if store.count_admins().await? > 0 {
        return Ok(());
    }

    let password_hash = security::hash_password(&bootstrap.password)
        .map_err(|e| format!("could not hash bootstrap password: {e}"))?;
    let admin = store
        .create_user(NewUser {
            role: Role::Admin,
            first_name: "Admin".to_string(),
            last_name: String::new(),
            email: bootstrap.email.trim().to_lowercase(),
            password_hash,
            class_id: None,
            teacher_uid: None,
            school: None,
            approved: true,
        })
        .await?;

    tracing::info!("Bootstrap admin {} created", admin.email);
    Ok(())
}
