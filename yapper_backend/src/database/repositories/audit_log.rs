use crate::database::models::{AuditEntryRecord, AuditKind, AuditListingRow, NewAuditEntry};
use crate::utils::now_utc_iso;
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteAuditLogRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const ENTRY_COLUMNS: &str = "a.id, a.kind, a.reporter_id, a.subject_id, a.post_id, a.comment_id, \
                             a.reason, a.duration_secs, a.approved, a.created_at";

fn map_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntryRecord> {
    let raw_kind: String = row.get(1)?;
    let kind = AuditKind::parse(&raw_kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            anyhow!("unknown audit kind {raw_kind}").into(),
        )
    })?;
    Ok(AuditEntryRecord {
        id: row.get(0)?,
        kind,
        reporter_id: row.get(2)?,
        subject_id: row.get(3)?,
        post_id: row.get(4)?,
        comment_id: row.get(5)?,
        reason: row.get(6)?,
        duration_secs: row.get(7)?,
        approved: row.get::<_, Option<i64>>(8)?.map(|flag| flag != 0),
        created_at: row.get(9)?,
    })
}

impl<'conn> super::AuditLogRepository for SqliteAuditLogRepository<'conn> {
    fn append(&self, entry: &NewAuditEntry) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO audit_log (kind, reporter_id, subject_id, post_id, comment_id, reason, duration_secs, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.kind.as_str(),
                entry.reporter_id,
                entry.subject_id,
                entry.post_id,
                entry.comment_id,
                entry.reason,
                entry.duration_secs,
                now_utc_iso()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<AuditEntryRecord>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_log a WHERE a.id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], map_entry)
            .optional()?)
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<AuditListingRow>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}, r.handle, s.handle
            FROM audit_log a
            JOIN users r ON r.id = a.reporter_id
            JOIN users s ON s.id = a.subject_id
            ORDER BY a.id DESC
            LIMIT ?1
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditListingRow {
                entry: map_entry(row)?,
                reporter_handle: row.get(10)?,
                subject_handle: row.get(11)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn list_for_subject(&self, subject_id: i64) -> Result<Vec<AuditEntryRecord>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_log a WHERE a.subject_id = ?1 ORDER BY a.id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![subject_id], map_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn find_pending(&self, kind: AuditKind, subject_id: i64) -> Result<Option<AuditEntryRecord>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM audit_log a
            WHERE a.kind = ?1 AND a.subject_id = ?2 AND a.approved IS NULL
            ORDER BY a.id DESC
            LIMIT 1
            "#
        );
        Ok(self
            .conn
            .query_row(&sql, params![kind.as_str(), subject_id], map_entry)
            .optional()?)
    }

    fn set_approved(&self, id: i64, approved: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE audit_log SET approved = ?1 WHERE id = ?2",
            params![if approved { 1 } else { 0 }, id],
        )?;
        Ok(())
    }
}
