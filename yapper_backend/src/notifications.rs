use crate::database::models::{NewNotification, NotificationKind, NotificationRecord};
use crate::database::repositories::{NotificationRepository, SqliteRepositories, UserRepository};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use anyhow::Result;
use serde::Serialize;

const DEFAULT_LIST_LIMIT: usize = 50;

/// Appends an activity record unless the actor is notifying themselves.
/// Runs on the caller's repositories so it joins the caller's transaction.
pub(crate) fn fan_out(repos: &SqliteRepositories<'_>, record: NewNotification) -> Result<bool> {
    if record.sender_id == record.recipient_id {
        return Ok(false);
    }
    let id = repos.notifications().append(&record)?;
    tracing::debug!(
        notification_id = id,
        recipient_id = record.recipient_id,
        kind = record.kind.as_str(),
        "notification queued"
    );
    Ok(true)
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    pub id: i64,
    pub kind: NotificationKind,
    pub action: &'static str,
    pub sender_id: i64,
    pub sender_handle: Option<String>,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub read: bool,
    pub created_at: String,
}

impl NotificationView {
    fn from_record(record: NotificationRecord, sender_handle: Option<String>) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            action: record.kind.action_text(),
            sender_id: record.sender_id,
            sender_handle,
            post_id: record.post_id,
            comment_id: record.comment_id,
            read: record.read,
            created_at: record.created_at,
        }
    }
}

#[derive(Clone)]
pub struct NotificationService {
    database: Database,
}

impl NotificationService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn list(&self, recipient_id: i64, limit: Option<usize>) -> CoreResult<Vec<NotificationView>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 200);
        self.database.with_repositories(|repos| {
            let records = repos.notifications().list_for_recipient(recipient_id, limit)?;
            let users = repos.users();
            let mut views = Vec::with_capacity(records.len());
            for record in records {
                let sender = users.get(record.sender_id)?.map(|user| user.handle);
                views.push(NotificationView::from_record(record, sender));
            }
            Ok(views)
        })
    }

    pub fn mark_read(&self, recipient_id: i64, notification_id: i64) -> CoreResult<()> {
        let updated = self
            .database
            .with_repositories(|repos| repos.notifications().mark_read(notification_id, recipient_id))?;
        if !updated {
            return Err(CoreError::not_found("Notification not found."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewUser;
    use crate::identity::Role;

    fn setup() -> (Database, i64, i64) {
        let database = Database::open_in_memory().expect("db");
        let (a, b) = database
            .with_repositories(|repos| {
                let a = repos.users().create(&NewUser {
                    handle: "alice".into(),
                    role: Role::Standard,
                })?;
                let b = repos.users().create(&NewUser {
                    handle: "bob".into(),
                    role: Role::Standard,
                })?;
                Ok::<_, anyhow::Error>((a, b))
            })
            .expect("users");
        (database, a, b)
    }

    #[test]
    fn self_notifications_are_skipped() {
        let (database, alice, bob) = setup();
        let queued = database
            .with_repositories(|repos| {
                let own = fan_out(
                    &repos,
                    NewNotification {
                        recipient_id: alice,
                        sender_id: alice,
                        kind: NotificationKind::PostLiked,
                        post_id: None,
                        comment_id: None,
                    },
                )?;
                let other = fan_out(
                    &repos,
                    NewNotification {
                        recipient_id: alice,
                        sender_id: bob,
                        kind: NotificationKind::Followed,
                        post_id: None,
                        comment_id: None,
                    },
                )?;
                Ok::<_, anyhow::Error>((own, other))
            })
            .unwrap();
        assert_eq!(queued, (false, true));

        let service = NotificationService::new(database);
        let listed = service.list(alice, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].action, "followed your account.");
        assert_eq!(listed[0].sender_handle.as_deref(), Some("bob"));
    }

    #[test]
    fn only_the_recipient_can_mark_read() {
        let (database, alice, bob) = setup();
        let id = database
            .with_repositories(|repos| {
                repos.notifications().append(&NewNotification {
                    recipient_id: alice,
                    sender_id: bob,
                    kind: NotificationKind::Commented,
                    post_id: None,
                    comment_id: None,
                })
            })
            .unwrap();
        let service = NotificationService::new(database);
        assert!(matches!(
            service.mark_read(bob, id),
            Err(CoreError::NotFound(_))
        ));
        service.mark_read(alice, id).unwrap();
        assert!(service.list(alice, None).unwrap()[0].read);
    }
}
