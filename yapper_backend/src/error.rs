//! Error taxonomy shared by every service.
//!
//! Repositories speak `anyhow`; services translate into [`CoreError`] at their
//! boundary so callers never see a raw store failure.

use serde::Serialize;
use thiserror::Error;

/// Why a destructive or privileged action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenKind {
    /// Role tier or ownership does not allow the action at all.
    InsufficientRole,
    /// The action is allowed once the elevated-action secret is supplied.
    SecretRequired,
    /// A secret was supplied but does not match the stored one.
    SecretMismatch,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Forbidden { kind: ForbiddenKind, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("You are banned for {remaining}. Reason: {reason}")]
    Banned {
        remaining: String,
        remaining_secs: i64,
        reason: String,
    },

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        CoreError::Forbidden {
            kind: ForbiddenKind::InsufficientRole,
            message: message.into(),
        }
    }

    pub fn secret_required() -> Self {
        CoreError::Forbidden {
            kind: ForbiddenKind::SecretRequired,
            message: "Security code required.".into(),
        }
    }

    pub fn secret_mismatch() -> Self {
        CoreError::Forbidden {
            kind: ForbiddenKind::SecretMismatch,
            message: "Security code mismatched.".into(),
        }
    }

    pub fn forbidden_kind(&self) -> Option<ForbiddenKind> {
        match self {
            CoreError::Forbidden { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<rusqlite::Error>() {
            Ok(sql_err) => CoreError::from(sql_err),
            Err(other) => CoreError::Internal(other),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                tracing::debug!(error = %err, "constraint violation translated to conflict");
                return CoreError::Conflict(
                    "The request conflicts with existing data, please retry.".into(),
                );
            }
        }
        CoreError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violation_becomes_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .map_err(anyhow::Error::from)
            .unwrap_err();
        assert!(matches!(CoreError::from(err), CoreError::Conflict(_)));
    }

    #[test]
    fn other_failures_become_internal() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(matches!(CoreError::from(err), CoreError::Internal(_)));
    }
}
