use crate::utils::now_utc_iso;
use anyhow::Result;
use rusqlite::{params, Connection};

pub(super) struct SqliteFollowRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::FollowRepository for SqliteFollowRepository<'conn> {
    fn exists(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
            params![follower_id, followed_id],
            |row| row.get(0),
        )?)
    }

    fn add(&self, follower_id: i64, followed_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?1, ?2, ?3)",
            params![follower_id, followed_id, now_utc_iso()],
        )?;
        Ok(())
    }

    fn remove(&self, follower_id: i64, followed_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
            params![follower_id, followed_id],
        )?;
        Ok(())
    }

    fn count_followers(&self, user_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE followed_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?)
    }

    fn count_following(&self, user_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?)
    }
}
