use super::{ApiResult, AppState, AuthenticatedUser};
use crate::notifications::NotificationView;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct ListNotificationsParams {
    #[serde(default)]
    limit: Option<usize>,
}

pub(crate) async fn list_notifications(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(params): Query<ListNotificationsParams>,
) -> ApiResult<Vec<NotificationView>> {
    let notifications = state.notifications.list(caller.id, params.limit)?;
    Ok(Json(notifications))
}

pub(crate) async fn mark_read(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(notification_id): Path<i64>,
) -> Result<StatusCode, super::ApiError> {
    state.notifications.mark_read(caller.id, notification_id)?;
    Ok(StatusCode::NO_CONTENT)
}
