use super::{ApiResult, AppState, AuthenticatedUser};
use crate::reactions::{LikeOutcome, LikeTarget};
use axum::extract::{Path, State};
use axum::Json;

pub(crate) async fn like_post(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(post_id): Path<i64>,
) -> ApiResult<LikeOutcome> {
    let outcome = state
        .reactions
        .toggle_like(caller.id, LikeTarget::Post(post_id))?;
    Ok(Json(outcome))
}

pub(crate) async fn like_comment(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(comment_id): Path<i64>,
) -> ApiResult<LikeOutcome> {
    let outcome = state
        .reactions
        .toggle_like(caller.id, LikeTarget::Comment(comment_id))?;
    Ok(Json(outcome))
}
