use super::auth::extract_token;
use super::{ApiError, AppState};
use crate::error::CoreError;
use crate::identity::IdentityResolver;
use crate::sessions::{
    ServerMessage, SessionCommand, SessionConnection, SessionNotifier, SessionRegistry,
};
use crate::utils::unix_now;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct WsParams {
    #[serde(default)]
    token: Option<String>,
}

/// Upgrades to the live session socket. Browsers cannot set headers on a
/// websocket handshake, so the credential may also arrive as `?token=`.
/// Banned callers are rejected before the upgrade.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| extract_token(&headers))
        .ok_or_else(|| CoreError::Unauthorized("Missing session token.".into()))?;
    let caller = state.identity.resolve(&token)?;
    let registry = state.sessions.clone();
    let identity = state.identity.clone();
    Ok(ws.on_upgrade(move |socket| run_session(socket, registry, identity, caller.id)))
}

/// Re-applies the ban gate once the connection is registered. A ban issued
/// between the handshake check and registration found no live session, so
/// the logout is delivered here instead.
pub(crate) fn close_if_banned(
    identity: &IdentityResolver,
    registry: &SessionRegistry,
    user_id: i64,
) -> bool {
    match identity.resolve_user(user_id, unix_now()) {
        Ok(_) => false,
        Err(CoreError::Banned { reason, .. }) => {
            tracing::info!(user_id, "ban landed during session handshake");
            SessionNotifier::new(registry.clone()).notify(user_id, ServerMessage::Logout { reason });
            true
        }
        Err(err) => {
            tracing::warn!(user_id, error = %err, "session user no longer resolves");
            if let Some(handle) = registry.get(user_id) {
                let _ = handle.send(SessionCommand::Close);
            }
            true
        }
    }
}

async fn run_session(
    socket: WebSocket,
    registry: SessionRegistry,
    identity: IdentityResolver,
    user_id: i64,
) {
    let mut connection = SessionConnection::open();
    let connection_id = connection.connection_id();
    registry.register(user_id, connection.handle());
    tracing::info!(user_id, %connection_id, "session connected");
    close_if_banned(&identity, &registry, user_id);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            command = connection.next_command() => match command {
                SessionCommand::Push(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(user_id, error = %err, "failed to encode session message");
                            continue;
                        }
                    };
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        tracing::warn!(user_id, error = %err, "failed to push session message");
                        break;
                    }
                }
                SessionCommand::Close => {
                    if let Err(err) = sink.send(Message::Close(None)).await {
                        tracing::debug!(user_id, error = %err, "close frame not delivered");
                    }
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(user_id, error = %err, "session socket error");
                    break;
                }
            },
        }
    }

    registry.unregister(user_id, connection_id);
    tracing::info!(user_id, %connection_id, "session disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::database::models::NewUser;
    use crate::database::repositories::UserRepository;
    use crate::database::Database;
    use crate::identity::{Role, SessionSigner};

    fn setup() -> (Database, IdentityResolver, SessionRegistry, i64) {
        let database = Database::open_in_memory().expect("db");
        let user_id = database
            .with_repositories(|repos| {
                repos.users().create(&NewUser {
                    handle: "mallory".into(),
                    role: Role::Standard,
                })
            })
            .expect("user");
        let identity = IdentityResolver::new(
            database.clone(),
            SessionSigner::new(&SessionConfig::new("test-secret")),
        );
        (database, identity, SessionRegistry::new(), user_id)
    }

    #[test]
    fn ban_issued_before_registration_still_logs_out() {
        let (database, identity, registry, user_id) = setup();
        let mut connection = SessionConnection::open();
        database
            .with_repositories(|repos| repos.users().set_ban(user_id, unix_now() + 3_600, "spam"))
            .unwrap();
        registry.register(user_id, connection.handle());

        assert!(close_if_banned(&identity, &registry, user_id));
        assert_eq!(
            connection.try_next_command(),
            Some(SessionCommand::Push(ServerMessage::Logout {
                reason: "spam".into()
            }))
        );
        assert_eq!(connection.try_next_command(), Some(SessionCommand::Close));
        assert!(registry.is_empty());
    }

    #[test]
    fn unbanned_registration_is_left_alone() {
        let (_, identity, registry, user_id) = setup();
        let mut connection = SessionConnection::open();
        registry.register(user_id, connection.handle());

        assert!(!close_if_banned(&identity, &registry, user_id));
        assert_eq!(connection.try_next_command(), None);
        assert_eq!(registry.len(), 1);
    }
}
