use crate::database::models::{NewUser, UserRecord};
use crate::identity::Role;
use crate::utils::now_utc_iso;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteUserRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const USER_COLUMNS: &str = "id, handle, role_id, security_code, verified, banned_until, \
                            ban_reason, followers, following, created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        handle: row.get(1)?,
        role: Role::from_level(row.get(2)?),
        security_code: row.get(3)?,
        verified: row.get::<_, i64>(4)? != 0,
        banned_until: row.get(5)?,
        ban_reason: row.get(6)?,
        followers: row.get(7)?,
        following: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl<'conn> super::UserRepository for SqliteUserRepository<'conn> {
    fn create(&self, record: &NewUser) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO users (handle, role_id, created_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![record.handle, record.role.level(), now_utc_iso()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], map_user)
            .optional()?)
    }

    fn get_by_handle(&self, handle: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE handle = ?1 COLLATE NOCASE");
        Ok(self
            .conn
            .query_row(&sql, params![handle.trim()], map_user)
            .optional()?)
    }

    fn adjust_follow_counts(&self, follower_id: i64, followed_id: i64, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET followers = followers + ?1 WHERE id = ?2",
            params![delta, followed_id],
        )?;
        self.conn.execute(
            "UPDATE users SET following = following + ?1 WHERE id = ?2",
            params![delta, follower_id],
        )?;
        Ok(())
    }

    fn set_ban(&self, id: i64, until: i64, reason: &str) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE users
            SET banned_until = ?1, ban_reason = ?2
            WHERE id = ?3
            "#,
            params![until, reason, id],
        )?;
        Ok(())
    }

    fn clear_ban(&self, id: i64) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE users
            SET banned_until = NULL, ban_reason = NULL
            WHERE id = ?1
            "#,
            params![id],
        )?;
        Ok(())
    }

    fn set_security_code(&self, id: i64, code: &str) -> Result<bool> {
        let updated = self.conn.execute(
            r#"
            UPDATE users
            SET security_code = ?1
            WHERE id = ?2 AND (security_code IS NULL OR trim(security_code) = '')
            "#,
            params![code, id],
        )?;
        Ok(updated > 0)
    }

    fn set_verified(&self, id: i64, verified: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET verified = ?1 WHERE id = ?2",
            params![if verified { 1 } else { 0 }, id],
        )?;
        Ok(())
    }

    fn recount_follow_counts(&self) -> Result<usize> {
        let corrected = self.conn.execute(
            r#"
            UPDATE users
            SET followers = (SELECT COUNT(*) FROM follows WHERE followed_id = users.id),
                following = (SELECT COUNT(*) FROM follows WHERE follower_id = users.id)
            WHERE followers <> (SELECT COUNT(*) FROM follows WHERE followed_id = users.id)
               OR following <> (SELECT COUNT(*) FROM follows WHERE follower_id = users.id)
            "#,
            [],
        )?;
        Ok(corrected)
    }
}
