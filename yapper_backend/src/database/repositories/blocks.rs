use crate::utils::now_utc_iso;
use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashSet;

pub(super) struct SqliteBlockRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::BlockRepository for SqliteBlockRepository<'conn> {
    fn exists(&self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2)",
            params![blocker_id, blocked_id],
            |row| row.get(0),
        )?)
    }

    fn add(&self, blocker_id: i64, blocked_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
            params![blocker_id, blocked_id, now_utc_iso()],
        )?;
        Ok(())
    }

    fn remove(&self, blocker_id: i64, blocked_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker_id, blocked_id],
        )?;
        Ok(())
    }

    fn related_to(&self, user_id: i64) -> Result<HashSet<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT blocked_id FROM blocks WHERE blocker_id = ?1
            UNION
            SELECT blocker_id FROM blocks WHERE blocked_id = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        let mut related = HashSet::new();
        for row in rows {
            related.insert(row?);
        }
        Ok(related)
    }
}
