//! Admin handlers: user lifecycle and teacher approval

use crate::error::AppResult;
use crate::models::*;
use crate::services::admin::{self as admin_service, AdminOverview};
use crate::services::{approval, users};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use super::AppState;

/// Create a student or teacher
pub async fn create_user(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Json(input): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserResponse>>)> {
    let user = users::create_user(state.store.as_ref(), &admin, &input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user.into()))))
}

/// Delete a user and everything keyed by it
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<users::DeletionReport>>> {
    let report = users::delete_user(state.store.as_ref(), &admin, id).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Counts, schools, teachers and students for the admin page
pub async fn overview(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
) -> AppResult<Json<ApiResponse<AdminOverview>>> {
    let overview = admin_service::overview(state.store.as_ref(), &admin).await?;
    Ok(Json(ApiResponse::success(overview)))
}

pub async fn pending_teachers(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
) -> AppResult<Json<ApiResponse<Vec<UserResponse>>>> {
    let teachers = approval::pending_teachers(state.store.as_ref(), &admin).await?;
    Ok(Json(ApiResponse::success(teachers)))
}

pub async fn approve_teacher(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let teacher = approval::approve_teacher(state.store.as_ref(), &admin, id).await?;
    Ok(Json(ApiResponse::success(teacher)))
}

pub async fn reject_teacher(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<approval::RejectOutcome>>> {
    let outcome = approval::reject_teacher(state.store.as_ref(), &admin, id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
