use super::{ApiError, AppState};
use crate::error::CoreError;
use crate::identity::Caller;
use axum::extract::{FromRequestParts, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

const TOKEN_COOKIE: &str = "token";

/// Reads the session credential from `Authorization: Bearer` or the `token`
/// cookie, in that order.
pub(crate) fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Extractor for handlers that need a signed-in, un-banned caller.
pub(crate) struct AuthenticatedUser(pub Caller);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| CoreError::Unauthorized("Missing session token.".into()))?;
        let caller = state.identity.resolve(&token)?;
        Ok(Self(caller))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    user: Caller,
    live: bool,
}

pub(crate) async fn current_session(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Json<SessionResponse> {
    let live = state.sessions.get(caller.id).is_some();
    Json(SessionResponse { user: caller, live })
}
