//! Live session registry and the notifier that pushes forced-logout notices.
//!
//! Each websocket connection registers an unbounded channel under its user
//! id. The socket task drains that channel; the notifier only ever talks to
//! the channel, so a moderation decision never blocks on network IO.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Messages the server pushes to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    Logout { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Push(ServerMessage),
    Close,
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub connection_id: Uuid,
    sender: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<(), SessionCommand> {
        self.sender.send(command).map_err(|err| err.0)
    }
}

/// Creates the handle for a new connection plus the receiver its socket task
/// drains.
pub fn connection_channel() -> (SessionHandle, mpsc::UnboundedReceiver<SessionCommand>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        SessionHandle {
            connection_id: Uuid::new_v4(),
            sender,
        },
        receiver,
    )
}

/// The socket task's end of a connection. It holds its own sender, so the
/// command stream only ends on an explicit [`SessionCommand::Close`], never
/// because the registry dropped or replaced its copy of the handle.
pub struct SessionConnection {
    handle: SessionHandle,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl SessionConnection {
    pub fn open() -> Self {
        let (handle, commands) = connection_channel();
        Self { handle, commands }
    }

    pub fn connection_id(&self) -> Uuid {
        self.handle.connection_id
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub async fn next_command(&mut self) -> SessionCommand {
        self.commands.recv().await.unwrap_or(SessionCommand::Close)
    }

    pub fn try_next_command(&mut self) -> Option<SessionCommand> {
        self.commands.try_recv().ok()
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<i64, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the handle, replacing (without closing) any prior one.
    pub fn register(&self, user_id: i64, handle: SessionHandle) {
        let mut guard = self.inner.write().unwrap_or_else(|err| err.into_inner());
        if let Some(previous) = guard.insert(user_id, handle) {
            tracing::debug!(
                user_id,
                replaced = %previous.connection_id,
                "session registration replaced an older connection"
            );
        }
    }

    /// Removes the entry only if it still belongs to `connection_id`.
    pub fn unregister(&self, user_id: i64, connection_id: Uuid) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(|err| err.into_inner());
        match guard.get(&user_id) {
            Some(current) if current.connection_id == connection_id => {
                guard.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, user_id: i64) -> Option<SessionHandle> {
        let guard = self.inner.read().unwrap_or_else(|err| err.into_inner());
        guard.get(&user_id).cloned()
    }

    fn take(&self, user_id: i64) -> Option<SessionHandle> {
        let mut guard = self.inner.write().unwrap_or_else(|err| err.into_inner());
        guard.remove(&user_id)
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(|err| err.into_inner());
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends a close to every live session and empties the registry.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(i64, SessionHandle)> = {
            let mut guard = self.inner.write().unwrap_or_else(|err| err.into_inner());
            guard.drain().collect()
        };
        for (user_id, handle) in &drained {
            if handle.send(SessionCommand::Close).is_err() {
                tracing::debug!(user_id, "session already gone during shutdown");
            }
        }
        drained.len()
    }
}

/// Bridges moderation decisions to live connections.
#[derive(Clone)]
pub struct SessionNotifier {
    registry: SessionRegistry,
}

impl SessionNotifier {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Pushes `message` then closes the user's connection. Returns whether a
    /// live session was found. Delivery failures are logged, never returned.
    pub fn notify(&self, user_id: i64, message: ServerMessage) -> bool {
        let Some(handle) = self.registry.take(user_id) else {
            tracing::debug!(user_id, "no live session to notify");
            return false;
        };
        if handle.send(SessionCommand::Push(message)).is_err() {
            tracing::warn!(
                user_id,
                connection_id = %handle.connection_id,
                "failed to push session notice; connection already closed"
            );
        }
        if handle.send(SessionCommand::Close).is_err() {
            tracing::warn!(
                user_id,
                connection_id = %handle.connection_id,
                "failed to close session"
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_notice_serializes_with_action_tag() {
        let json = serde_json::to_value(ServerMessage::Logout {
            reason: "spam".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"action": "logout", "reason": "spam"}));
    }

    #[test]
    fn stale_teardown_does_not_evict_replacement() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = connection_channel();
        let (second, _rx2) = connection_channel();
        let first_id = first.connection_id;
        let second_id = second.connection_id;

        registry.register(7, first);
        registry.register(7, second);
        assert_eq!(registry.len(), 1);

        assert!(!registry.unregister(7, first_id));
        assert_eq!(registry.get(7).unwrap().connection_id, second_id);
        assert!(registry.unregister(7, second_id));
        assert!(registry.is_empty());
    }

    #[test]
    fn replaced_connection_keeps_running() {
        let registry = SessionRegistry::new();
        let mut first = SessionConnection::open();
        let second = SessionConnection::open();

        registry.register(7, first.handle());
        registry.register(7, second.handle());

        assert_eq!(first.try_next_command(), None);
        assert_eq!(
            registry.get(7).map(|handle| handle.connection_id),
            Some(second.connection_id())
        );
        assert!(!registry.unregister(7, first.connection_id()));
    }

    #[tokio::test]
    async fn connection_commands_end_only_on_close() {
        let registry = SessionRegistry::new();
        let mut connection = SessionConnection::open();
        registry.register(4, connection.handle());
        let notifier = SessionNotifier::new(registry.clone());

        assert!(notifier.notify(
            4,
            ServerMessage::Logout {
                reason: "spam".into()
            }
        ));
        assert!(registry.is_empty());
        assert_eq!(
            connection.next_command().await,
            SessionCommand::Push(ServerMessage::Logout {
                reason: "spam".into()
            })
        );
        assert_eq!(connection.next_command().await, SessionCommand::Close);
        assert_eq!(connection.try_next_command(), None);
    }

    #[test]
    fn notify_pushes_then_closes() {
        let registry = SessionRegistry::new();
        let notifier = SessionNotifier::new(registry.clone());
        let (handle, mut rx) = connection_channel();
        registry.register(3, handle);

        assert!(notifier.notify(
            3,
            ServerMessage::Logout {
                reason: "bye".into()
            }
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionCommand::Push(ServerMessage::Logout {
                reason: "bye".into()
            })
        );
        assert_eq!(rx.try_recv().unwrap(), SessionCommand::Close);
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn notify_without_session_is_a_no_op() {
        let notifier = SessionNotifier::new(SessionRegistry::new());
        assert!(!notifier.notify(
            1,
            ServerMessage::Logout {
                reason: "none".into()
            }
        ));
    }

    #[test]
    fn notify_swallows_dropped_receivers() {
        let registry = SessionRegistry::new();
        let notifier = SessionNotifier::new(registry.clone());
        let (handle, rx) = connection_channel();
        registry.register(9, handle);
        drop(rx);
        assert!(notifier.notify(
            9,
            ServerMessage::Logout {
                reason: "gone".into()
            }
        ));
    }

    #[test]
    fn close_all_drains_registry() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a) = connection_channel();
        let (b, _rx_b) = connection_channel();
        registry.register(1, a);
        registry.register(2, b);
        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(rx_a.try_recv().unwrap(), SessionCommand::Close);
    }
}
