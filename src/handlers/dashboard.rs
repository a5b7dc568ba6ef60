//! Dashboard handlers for teachers and admins.
//!
//! Every handler runs behind the session middleware and passes the resolved
//! principal into the service layer, which applies the scope rule.

use crate::error::AppResult;
use crate::models::*;
use crate::scope::Scope;
use crate::services::assessment::{self, AssessmentFilter, IssuedLink};
use crate::services::reports::{
    self, ClassSummary, DashboardStats, StudentReport, StudentSummary, TimesheetFilter,
};
use crate::services::users;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TimesheetQuery {
    #[serde(default)]
    pub status: TimesheetFilter,
}

#[derive(Debug, Deserialize)]
pub struct AssessmentQuery {
    #[serde(default)]
    pub status: AssessmentFilter,
}

pub async fn scope(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<ApiResponse<Scope>>> {
    let scope = users::load_scope(state.store.as_ref(), &principal).await?;
    Ok(Json(ApiResponse::success(scope)))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let stats = reports::stats(state.store.as_ref(), &principal, query.class_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn students(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<ApiResponse<Vec<StudentSummary>>>> {
    let students = reports::students(state.store.as_ref(), &principal).await?;
    Ok(Json(ApiResponse::success(students)))
}

pub async fn student_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StudentReport>>> {
    let report = reports::student_report(state.store.as_ref(), &principal, id).await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn update_specialization(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(input): Json<SpecializationRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    users::update_specialization(state.store.as_ref(), &principal, id, &input).await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn timesheets(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TimesheetQuery>,
) -> AppResult<Json<ApiResponse<Vec<TimesheetSummary>>>> {
    let sheets = reports::timesheets(state.store.as_ref(), &principal, query.status).await?;
    Ok(Json(ApiResponse::success(sheets)))
}

pub async fn approve_timesheet(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TimesheetSummary>>> {
    let sheet = reports::review_timesheet(state.store.as_ref(), &principal, id, true).await?;
    Ok(Json(ApiResponse::success(sheet)))
}

pub async fn reject_timesheet(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TimesheetSummary>>> {
    let sheet = reports::review_timesheet(state.store.as_ref(), &principal, id, false).await?;
    Ok(Json(ApiResponse::success(sheet)))
}

pub async fn assessments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AssessmentQuery>,
) -> AppResult<Json<ApiResponse<Vec<AssessmentRequest>>>> {
    let requests = assessment::list_requests(state.store.as_ref(), &principal, query.status).await?;
    Ok(Json(ApiResponse::success(requests)))
}

/// Issue a supervisor link. The raw token is only in this response.
pub async fn issue_assessment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<IssueAssessmentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<IssuedLink>>)> {
    let issued = assessment::issue_request(
        state.store.as_ref(),
        &principal,
        &input,
        state.assessment_link_days,
        &state.public_base_url,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(issued))))
}

pub async fn companies(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<ApiResponse<Vec<Company>>>> {
    let companies = reports::companies(state.store.as_ref(), &principal).await?;
    Ok(Json(ApiResponse::success(companies)))
}

pub async fn create_company(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<CreateCompany>,
) -> AppResult<(StatusCode, Json<ApiResponse<Company>>)> {
    let company = reports::create_company(state.store.as_ref(), &principal, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(company))))
}

pub async fn update_company(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateCompany>,
) -> AppResult<Json<ApiResponse<Company>>> {
    let company = reports::update_company(state.store.as_ref(), &principal, id, input).await?;
    Ok(Json(ApiResponse::success(company)))
}

pub async fn delete_company(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    reports::delete_company(state.store.as_ref(), &principal, id).await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn classes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<ApiResponse<Vec<ClassSummary>>>> {
    let classes = reports::classes(state.store.as_ref(), &principal).await?;
    Ok(Json(ApiResponse::success(classes)))
}

pub async fn create_class(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<CreateClassRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Class>>)> {
    let class = reports::create_class(state.store.as_ref(), &principal, &input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(class))))
}
