use super::{ApiError, ApiResult, AppState, AuthenticatedUser};
use crate::content::{AddCommentInput, CreatePostInput, FeedFilter, PostView};
use crate::database::models::{CommentRecord, PostRecord};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Body for destructive endpoints; elevated actors confirm with their code.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DeleteRequest {
    #[serde(default)]
    security_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeletedResponse {
    deleted: bool,
}

pub(crate) async fn get_feed(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(filter): Query<FeedFilter>,
) -> ApiResult<Vec<PostView>> {
    let feed = state.content.get_feed(caller.id, filter)?;
    Ok(Json(feed))
}

pub(crate) async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(payload): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<PostRecord>), ApiError> {
    let post = state.content.create_post(caller.id, payload)?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub(crate) async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(post_id): Path<i64>,
    payload: Option<Json<DeleteRequest>>,
) -> ApiResult<DeletedResponse> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    state
        .content
        .delete_post(caller.id, post_id, payload.security_code.as_deref())?;
    Ok(Json(DeletedResponse { deleted: true }))
}

pub(crate) async fn add_comment(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(post_id): Path<i64>,
    Json(payload): Json<AddCommentInput>,
) -> Result<(StatusCode, Json<CommentRecord>), ApiError> {
    let comment = state.content.add_comment(caller.id, post_id, payload)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub(crate) async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    payload: Option<Json<DeleteRequest>>,
) -> ApiResult<DeletedResponse> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    state.content.delete_comment(
        caller.id,
        post_id,
        comment_id,
        payload.security_code.as_deref(),
    )?;
    Ok(Json(DeletedResponse { deleted: true }))
}
