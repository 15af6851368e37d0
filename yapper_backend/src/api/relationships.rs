use super::{ApiError, ApiResult, AppState, AuthenticatedUser};
use crate::relationships::{BlockOutcome, FollowOutcome};
use crate::users::ProfileView;
use axum::extract::{Path, State};
use axum::Json;

fn parse_user_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid user id `{raw}`")))
}

pub(crate) async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(handle): Path<String>,
) -> ApiResult<ProfileView> {
    let profile = state.users.profile(caller.id, &handle)?;
    Ok(Json(profile))
}

pub(crate) async fn toggle_follow(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(target): Path<String>,
) -> ApiResult<FollowOutcome> {
    let target_id = parse_user_id(&target)?;
    let outcome = state.relationships.toggle_follow(caller.id, target_id)?;
    Ok(Json(outcome))
}

pub(crate) async fn toggle_block(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(target): Path<String>,
) -> ApiResult<BlockOutcome> {
    let target_id = parse_user_id(&target)?;
    let outcome = state.relationships.toggle_block(caller.id, target_id)?;
    Ok(Json(outcome))
}
