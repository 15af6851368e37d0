use crate::database::models::{NewNotification, NotificationKind, NotificationRecord};
use crate::utils::now_utc_iso;
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};

pub(super) struct SqliteNotificationRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::NotificationRepository for SqliteNotificationRepository<'conn> {
    fn append(&self, record: &NewNotification) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO notifications (recipient_id, sender_id, kind, post_id, comment_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.recipient_id,
                record.sender_id,
                record.kind.as_str(),
                record.post_id,
                record.comment_id,
                now_utc_iso()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_for_recipient(&self, recipient_id: i64, limit: usize) -> Result<Vec<NotificationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, recipient_id, sender_id, kind, post_id, comment_id, read, created_at
            FROM notifications
            WHERE recipient_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![recipient_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, i64>(6)? != 0,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            let (id, recipient_id, sender_id, kind, post_id, comment_id, read, created_at) = row?;
            let kind = NotificationKind::parse(&kind)
                .ok_or_else(|| anyhow!("unknown notification kind {kind}"))?;
            notifications.push(NotificationRecord {
                id,
                recipient_id,
                sender_id,
                kind,
                post_id,
                comment_id,
                read,
                created_at,
            });
        }
        Ok(notifications)
    }

    fn mark_read(&self, id: i64, recipient_id: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
            params![id, recipient_id],
        )?;
        Ok(updated > 0)
    }

    fn delete_for_post(&self, post_id: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM notifications WHERE post_id = ?1",
            params![post_id],
        )?)
    }

    fn delete_for_comment(&self, comment_id: i64) -> Result<usize> {
        Ok(self.conn.execute(
            r#"
            DELETE FROM notifications
            WHERE comment_id = ?1
               OR comment_id IN (SELECT id FROM comments WHERE parent_id = ?1)
            "#,
            params![comment_id],
        )?)
    }
}
