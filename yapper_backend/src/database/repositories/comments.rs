use super::placeholders;
use crate::database::models::{AuthorSummary, CommentRecord, FeedCommentRow, NewComment};
use crate::identity::Role;
use crate::utils::now_utc_iso;
use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

pub(super) struct SqliteCommentRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        parent_id: row.get(3)?,
        body: row.get(4)?,
        like_count: row.get(5)?,
        reply_count: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl<'conn> super::CommentRepository for SqliteCommentRepository<'conn> {
    fn create(&self, record: &NewComment) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO comments (post_id, author_id, parent_id, body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.post_id,
                record.author_id,
                record.parent_id,
                record.body,
                now_utc_iso()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<CommentRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, post_id, author_id, parent_id, body, like_count, reply_count, created_at
                FROM comments
                WHERE id = ?1
                "#,
                params![id],
                map_comment,
            )
            .optional()?)
    }

    fn list_for_posts(&self, post_ids: &[i64]) -> Result<Vec<FeedCommentRow>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT c.id, c.post_id, c.author_id, c.parent_id, c.body, c.like_count,
                   c.reply_count, c.created_at, u.handle, u.role_id, u.verified
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.post_id IN ({})
            ORDER BY c.id ASC
            "#,
            placeholders(1, post_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(post_ids.iter()), |row| {
            let comment = map_comment(row)?;
            let author = AuthorSummary {
                id: comment.author_id,
                handle: row.get(8)?,
                role: Role::from_level(row.get(9)?),
                verified: row.get::<_, i64>(10)? != 0,
            };
            Ok(FeedCommentRow { comment, author })
        })?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    fn count_for_post(&self, post_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?)
    }

    fn count_replies(&self, parent_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE parent_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )?)
    }

    fn adjust_like_count(&self, id: i64, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE comments SET like_count = like_count + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    fn adjust_reply_count(&self, id: i64, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE comments SET reply_count = reply_count + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        // Replies go first so the parent row is never orphaned mid-statement.
        self.conn
            .execute("DELETE FROM comments WHERE parent_id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn delete_for_post(&self, post_id: i64) -> Result<usize> {
        let replies = self.conn.execute(
            "DELETE FROM comments WHERE post_id = ?1 AND parent_id IS NOT NULL",
            params![post_id],
        )?;
        let top_level = self
            .conn
            .execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
        Ok(replies + top_level)
    }

    fn recount_counters(&self) -> Result<usize> {
        let corrected = self.conn.execute(
            r#"
            UPDATE comments
            SET like_count = (SELECT COUNT(*) FROM comment_likes WHERE comment_id = comments.id),
                reply_count = (SELECT COUNT(*) FROM comments AS r WHERE r.parent_id = comments.id)
            WHERE like_count <> (SELECT COUNT(*) FROM comment_likes WHERE comment_id = comments.id)
               OR reply_count <> (SELECT COUNT(*) FROM comments AS r WHERE r.parent_id = comments.id)
            "#,
            [],
        )?;
        Ok(corrected)
    }
}
