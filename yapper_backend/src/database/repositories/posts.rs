use crate::database::models::{AuthorSummary, FeedPostRow, FeedQuery, NewPost, PostRecord};
use crate::identity::Role;
use crate::utils::now_utc_iso;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

pub(super) struct SqlitePostRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::PostRepository for SqlitePostRepository<'conn> {
    fn create(&self, record: &NewPost) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO posts (owner_id, description, attachment_ref, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.owner_id,
                record.description,
                record.attachment_ref,
                now_utc_iso()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<PostRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, owner_id, description, attachment_ref, like_count, comment_count, created_at
                FROM posts
                WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(PostRecord {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        description: row.get(2)?,
                        attachment_ref: row.get(3)?,
                        like_count: row.get(4)?,
                        comment_count: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    fn list_feed(&self, query: &FeedQuery) -> Result<Vec<FeedPostRow>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(username) = query.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            values.push(Value::Text(username.to_string()));
            clauses.push(format!("u.handle = ?{} COLLATE NOCASE", values.len()));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            values.push(Value::Text(format!("%{}%", escape_like(search.trim()))));
            clauses.push(format!("p.description LIKE ?{} ESCAPE '\\'", values.len()));
        }
        if let Some(viewer_id) = query.viewer_id {
            values.push(Value::Integer(viewer_id));
            let n = values.len();
            clauses.push(format!(
                "p.owner_id NOT IN (SELECT blocked_id FROM blocks WHERE blocker_id = ?{n}) \
                 AND p.owner_id NOT IN (SELECT blocker_id FROM blocks WHERE blocked_id = ?{n})"
            ));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        values.push(Value::Integer(query.limit.max(1) as i64));
        let sql = format!(
            r#"
            SELECT p.id, p.owner_id, p.description, p.attachment_ref, p.like_count,
                   p.comment_count, p.created_at, u.handle, u.role_id, u.verified
            FROM posts p
            JOIN users u ON u.id = p.owner_id
            {where_clause}
            ORDER BY p.id DESC
            LIMIT ?{}
            "#,
            values.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let post = PostRecord {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                description: row.get(2)?,
                attachment_ref: row.get(3)?,
                like_count: row.get(4)?,
                comment_count: row.get(5)?,
                created_at: row.get(6)?,
            };
            let owner = AuthorSummary {
                id: post.owner_id,
                handle: row.get(7)?,
                role: Role::from_level(row.get(8)?),
                verified: row.get::<_, i64>(9)? != 0,
            };
            Ok(FeedPostRow { post, owner })
        })?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    fn adjust_like_count(&self, id: i64, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE posts SET like_count = like_count + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    fn adjust_comment_count(&self, id: i64, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE posts SET comment_count = comment_count + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn recount_counters(&self) -> Result<usize> {
        let corrected = self.conn.execute(
            r#"
            UPDATE posts
            SET like_count = (SELECT COUNT(*) FROM post_likes WHERE post_id = posts.id),
                comment_count = (SELECT COUNT(*) FROM comments WHERE post_id = posts.id)
            WHERE like_count <> (SELECT COUNT(*) FROM post_likes WHERE post_id = posts.id)
               OR comment_count <> (SELECT COUNT(*) FROM comments WHERE post_id = posts.id)
            "#,
            [],
        )?;
        Ok(corrected)
    }
}

/// Escapes `LIKE` wildcards so user search text matches literally under
/// `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
