mod audit_log;
mod blocks;
mod comments;
mod follows;
mod likes;
mod notifications;
mod posts;
mod users;

use super::models::{
    AuditEntryRecord, AuditKind, AuditListingRow, CommentRecord, FeedCommentRow, FeedPostRow,
    FeedQuery, NewAuditEntry, NewComment, NewNotification, NewPost, NewUser, NotificationRecord,
    PostRecord, UserRecord,
};
use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashSet;

pub trait UserRepository {
    fn create(&self, record: &NewUser) -> Result<i64>;
    fn get(&self, id: i64) -> Result<Option<UserRecord>>;
    fn get_by_handle(&self, handle: &str) -> Result<Option<UserRecord>>;
    /// Applies `delta` to the followed user's `followers` and the follower's `following`.
    fn adjust_follow_counts(&self, follower_id: i64, followed_id: i64, delta: i64) -> Result<()>;
    fn set_ban(&self, id: i64, until: i64, reason: &str) -> Result<()>;
    fn clear_ban(&self, id: i64) -> Result<()>;
    /// Stores the code only when none is set yet; returns whether it was stored.
    fn set_security_code(&self, id: i64, code: &str) -> Result<bool>;
    fn set_verified(&self, id: i64, verified: bool) -> Result<()>;
    /// Recomputes follower/following counters from the follow edges.
    fn recount_follow_counts(&self) -> Result<usize>;
}

pub trait PostRepository {
    fn create(&self, record: &NewPost) -> Result<i64>;
    fn get(&self, id: i64) -> Result<Option<PostRecord>>;
    fn list_feed(&self, query: &FeedQuery) -> Result<Vec<FeedPostRow>>;
    fn adjust_like_count(&self, id: i64, delta: i64) -> Result<()>;
    fn adjust_comment_count(&self, id: i64, delta: i64) -> Result<()>;
    fn delete(&self, id: i64) -> Result<()>;
    /// Recomputes like/comment counters from the ledger and the comment tree.
    fn recount_counters(&self) -> Result<usize>;
}

pub trait CommentRepository {
    fn create(&self, record: &NewComment) -> Result<i64>;
    fn get(&self, id: i64) -> Result<Option<CommentRecord>>;
    fn list_for_posts(&self, post_ids: &[i64]) -> Result<Vec<FeedCommentRow>>;
    fn count_for_post(&self, post_id: i64) -> Result<i64>;
    fn count_replies(&self, parent_id: i64) -> Result<i64>;
    fn adjust_like_count(&self, id: i64, delta: i64) -> Result<()>;
    fn adjust_reply_count(&self, id: i64, delta: i64) -> Result<()>;
    fn delete(&self, id: i64) -> Result<()>;
    fn delete_for_post(&self, post_id: i64) -> Result<usize>;
    fn recount_counters(&self) -> Result<usize>;
}

pub trait LikeRepository {
    fn post_like_exists(&self, post_id: i64, user_id: i64) -> Result<bool>;
    fn add_post_like(&self, post_id: i64, user_id: i64) -> Result<()>;
    fn remove_post_like(&self, post_id: i64, user_id: i64) -> Result<()>;
    fn count_post_likes(&self, post_id: i64) -> Result<i64>;
    fn comment_like_exists(&self, comment_id: i64, user_id: i64) -> Result<bool>;
    fn add_comment_like(&self, comment_id: i64, user_id: i64, post_id: i64) -> Result<()>;
    fn remove_comment_like(&self, comment_id: i64, user_id: i64) -> Result<()>;
    fn count_comment_likes(&self, comment_id: i64) -> Result<i64>;
    fn liked_posts(&self, user_id: i64, post_ids: &[i64]) -> Result<HashSet<i64>>;
    fn liked_comments(&self, user_id: i64, comment_ids: &[i64]) -> Result<HashSet<i64>>;
    fn delete_post_likes(&self, post_id: i64) -> Result<usize>;
    fn delete_comment_likes_for_post(&self, post_id: i64) -> Result<usize>;
    fn delete_comment_likes(&self, comment_id: i64) -> Result<usize>;
}

pub trait FollowRepository {
    fn exists(&self, follower_id: i64, followed_id: i64) -> Result<bool>;
    fn add(&self, follower_id: i64, followed_id: i64) -> Result<()>;
    fn remove(&self, follower_id: i64, followed_id: i64) -> Result<()>;
    fn count_followers(&self, user_id: i64) -> Result<i64>;
    fn count_following(&self, user_id: i64) -> Result<i64>;
}

pub trait BlockRepository {
    fn exists(&self, blocker_id: i64, blocked_id: i64) -> Result<bool>;
    fn add(&self, blocker_id: i64, blocked_id: i64) -> Result<()>;
    fn remove(&self, blocker_id: i64, blocked_id: i64) -> Result<()>;
    /// Users with a block edge to or from `user_id`.
    fn related_to(&self, user_id: i64) -> Result<HashSet<i64>>;
}

pub trait AuditLogRepository {
    fn append(&self, entry: &NewAuditEntry) -> Result<i64>;
    fn get(&self, id: i64) -> Result<Option<AuditEntryRecord>>;
    fn list_recent(&self, limit: usize) -> Result<Vec<AuditListingRow>>;
    fn list_for_subject(&self, subject_id: i64) -> Result<Vec<AuditEntryRecord>>;
    fn find_pending(&self, kind: AuditKind, subject_id: i64) -> Result<Option<AuditEntryRecord>>;
    fn set_approved(&self, id: i64, approved: bool) -> Result<()>;
}

pub trait NotificationRepository {
    fn append(&self, record: &NewNotification) -> Result<i64>;
    fn list_for_recipient(&self, recipient_id: i64, limit: usize) -> Result<Vec<NotificationRecord>>;
    fn mark_read(&self, id: i64, recipient_id: i64) -> Result<bool>;
    fn delete_for_post(&self, post_id: i64) -> Result<usize>;
    fn delete_for_comment(&self, comment_id: i64) -> Result<usize>;
}

/// Borrowing view over one connection (or open transaction) that hands out
/// the rusqlite-backed repositories.
pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn users(&self) -> impl UserRepository + '_ {
        users::SqliteUserRepository { conn: self.conn }
    }

    pub fn posts(&self) -> impl PostRepository + '_ {
        posts::SqlitePostRepository { conn: self.conn }
    }

    pub fn comments(&self) -> impl CommentRepository + '_ {
        comments::SqliteCommentRepository { conn: self.conn }
    }

    pub fn likes(&self) -> impl LikeRepository + '_ {
        likes::SqliteLikeRepository { conn: self.conn }
    }

    pub fn follows(&self) -> impl FollowRepository + '_ {
        follows::SqliteFollowRepository { conn: self.conn }
    }

    pub fn blocks(&self) -> impl BlockRepository + '_ {
        blocks::SqliteBlockRepository { conn: self.conn }
    }

    pub fn audit_log(&self) -> impl AuditLogRepository + '_ {
        audit_log::SqliteAuditLogRepository { conn: self.conn }
    }

    pub fn notifications(&self) -> impl NotificationRepository + '_ {
        notifications::SqliteNotificationRepository { conn: self.conn }
    }

    pub fn conn(&self) -> &'conn Connection {
        self.conn
    }
}

/// `?1, ?2, ...` placeholders for an `IN (...)` list starting at `first`.
pub(super) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ")
}
