use super::placeholders;
use crate::utils::now_utc_iso;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashSet;

pub(super) struct SqliteLikeRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> SqliteLikeRepository<'conn> {
    fn liked_subset(&self, sql_prefix: &str, user_id: i64, ids: &[i64]) -> Result<HashSet<i64>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let sql = format!("{sql_prefix} IN ({})", placeholders(2, ids.len()));
        let mut values = Vec::with_capacity(ids.len() + 1);
        values.push(Value::Integer(user_id));
        values.extend(ids.iter().map(|id| Value::Integer(*id)));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get(0))?;
        let mut liked = HashSet::new();
        for row in rows {
            liked.insert(row?);
        }
        Ok(liked)
    }
}

impl<'conn> super::LikeRepository for SqliteLikeRepository<'conn> {
    fn post_like_exists(&self, post_id: i64, user_id: i64) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM post_likes WHERE post_id = ?1 AND user_id = ?2)",
            params![post_id, user_id],
            |row| row.get(0),
        )?)
    }

    fn add_post_like(&self, post_id: i64, user_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, now_utc_iso()],
        )?;
        Ok(())
    }

    fn remove_post_like(&self, post_id: i64, user_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        Ok(())
    }

    fn count_post_likes(&self, post_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?)
    }

    fn comment_like_exists(&self, comment_id: i64, user_id: i64) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2)",
            params![comment_id, user_id],
            |row| row.get(0),
        )?)
    }

    fn add_comment_like(&self, comment_id: i64, user_id: i64, post_id: i64) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO comment_likes (comment_id, user_id, post_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![comment_id, user_id, post_id, now_utc_iso()],
        )?;
        Ok(())
    }

    fn remove_comment_like(&self, comment_id: i64, user_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
            params![comment_id, user_id],
        )?;
        Ok(())
    }

    fn count_comment_likes(&self, comment_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
            params![comment_id],
            |row| row.get(0),
        )?)
    }

    fn liked_posts(&self, user_id: i64, post_ids: &[i64]) -> Result<HashSet<i64>> {
        self.liked_subset(
            "SELECT post_id FROM post_likes WHERE user_id = ?1 AND post_id",
            user_id,
            post_ids,
        )
    }

    fn liked_comments(&self, user_id: i64, comment_ids: &[i64]) -> Result<HashSet<i64>> {
        self.liked_subset(
            "SELECT comment_id FROM comment_likes WHERE user_id = ?1 AND comment_id",
            user_id,
            comment_ids,
        )
    }

    fn delete_post_likes(&self, post_id: i64) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM post_likes WHERE post_id = ?1", params![post_id])?)
    }

    fn delete_comment_likes_for_post(&self, post_id: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM comment_likes WHERE post_id = ?1",
            params![post_id],
        )?)
    }

    fn delete_comment_likes(&self, comment_id: i64) -> Result<usize> {
        // Likes on the comment itself plus likes on its replies.
        Ok(self.conn.execute(
            r#"
            DELETE FROM comment_likes
            WHERE comment_id = ?1
               OR comment_id IN (SELECT id FROM comments WHERE parent_id = ?1)
            "#,
            params![comment_id],
        )?)
    }
}
