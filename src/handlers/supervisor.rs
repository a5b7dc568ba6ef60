//! Public supervisor endpoints, authorized by the link token alone

use crate::error::AppResult;
use crate::models::*;
use crate::services::assessment::{self, LinkView, SubmissionReceipt};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

pub async fn view(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<ApiResponse<LinkView>>> {
    let view = assessment::view(
        state.store.as_ref(),
        request_id,
        query.token.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(ApiResponse::success(view)))
}

pub async fn submit(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
    Json(input): Json<AssessmentSubmission>,
) -> AppResult<Json<ApiResponse<SubmissionReceipt>>> {
    let receipt = assessment::submit(
        state.store.as_ref(),
        request_id,
        query.token.as_deref(),
        &input,
        Utc::now(),
    )
    .await?;
    Ok(Json(ApiResponse::success(receipt)))
}
