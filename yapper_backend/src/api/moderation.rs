use super::{ApiError, ApiResult, AppState, AuthenticatedUser};
use crate::moderation::{AuditEntryView, BanOutcome, BanRequest, ReportRequest};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct CreatedResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListReportsParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    approved: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityCodeRequest {
    code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SecurityCodeResponse {
    enabled: bool,
}

pub(crate) async fn add_report(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(payload): Json<ReportRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let id = state.moderation.add_report(caller.id, payload)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub(crate) async fn list_reports(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(params): Query<ListReportsParams>,
) -> ApiResult<Vec<AuditEntryView>> {
    let reports = state
        .moderation
        .list_reports(caller.id, params.limit.unwrap_or(100))?;
    Ok(Json(reports))
}

pub(crate) async fn ban_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(payload): Json<BanRequest>,
) -> ApiResult<BanOutcome> {
    let outcome = state.moderation.ban_user(caller.id, payload)?;
    Ok(Json(outcome))
}

pub(crate) async fn request_verification(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let id = state.moderation.request_verification(caller.id)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub(crate) async fn review_verification(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(entry_id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .moderation
        .review_verification(caller.id, entry_id, payload.approved)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn set_security_code(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(payload): Json<SecurityCodeRequest>,
) -> ApiResult<SecurityCodeResponse> {
    state.moderation.set_security_code(caller.id, &payload.code)?;
    Ok(Json(SecurityCodeResponse { enabled: true }))
}
