use crate::database::repositories::{CommentRepository, PostRepository, UserRepository};
use crate::database::Database;
use crate::error::CoreResult;
use serde::Serialize;

/// Rows whose denormalized counters disagreed with the edges and were fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub posts: usize,
    pub comments: usize,
    pub users: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.posts + self.comments + self.users
    }
}

/// Recomputes every counter from edge and tree cardinality in one
/// transaction. Operational repair, never run per request.
pub fn reconcile_counters(database: &Database) -> CoreResult<ReconcileReport> {
    let report = database.with_transaction(|repos| {
        Ok::<_, anyhow::Error>(ReconcileReport {
            posts: repos.posts().recount_counters()?,
            comments: repos.comments().recount_counters()?,
            users: repos.users().recount_follow_counts()?,
        })
    })?;
    if report.total() > 0 {
        tracing::warn!(
            posts = report.posts,
            comments = report.comments,
            users = report.users,
            "counter drift repaired"
        );
    } else {
        tracing::info!("counters consistent");
    }
    Ok(report)
}
