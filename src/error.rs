//! Application error type and its HTTP mapping

use crate::db::StoreError;
use crate::handlers::auth::clear_session_cookie;
use crate::models::ApiResponse;
use crate::validation::{LinkError, ValidationError};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Why a caller may not proceed
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Your teacher account is awaiting admin approval")]
    ApprovalPending,

    #[error("This account cannot use the dashboard")]
    NotDashboardUser,

    #[error("You do not have access to this resource")]
    Forbidden,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many attempts. Please try again later.")]
    RateLimited,

    #[error("Could not save the assessment, please try again")]
    Commit,

    #[error("Internal error")]
    Store(#[from] StoreError),

    #[error("Internal error")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AccessError {
    /// Failures about who the caller is, rather than what they asked for
    pub fn forces_sign_out(self) -> bool {
        !matches!(self, AccessError::Forbidden)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Access(AccessError::Unauthenticated | AccessError::InvalidCredentials) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Access(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Link(LinkError::MissingToken) => StatusCode::BAD_REQUEST,
            AppError::Link(LinkError::RequestNotFound) => StatusCode::NOT_FOUND,
            AppError::Link(LinkError::InvalidOrUsed) => StatusCode::FORBIDDEN,
            AppError::Link(LinkError::Expired) => StatusCode::GONE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Commit | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Store(e) => tracing::error!("Storage error: {}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {}", e),
            _ => {}
        }

        let status = self.status();
        let body = Json(ApiResponse::<()>::error(self.to_string()));

        if let AppError::Access(access) = self {
            if !access.forces_sign_out() {
                return (status, body).into_response();
            }
            return (status, [(header::SET_COOKIE, clear_session_cookie())], body).into_response();
        }

        (status, body).into_response()
    }
}
