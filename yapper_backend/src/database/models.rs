use crate::identity::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub handle: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub security_code: Option<String>,
    pub verified: bool,
    pub banned_until: Option<i64>,
    pub ban_reason: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub created_at: String,
}

impl UserRecord {
    /// Returns `(until, reason)` when a ban is in force at `now`.
    pub fn active_ban(&self, now: i64) -> Option<(i64, &str)> {
        match self.banned_until {
            Some(until) if until > now => Some((until, self.ban_reason.as_deref().unwrap_or(""))),
            _ => None,
        }
    }

    /// A ban row whose expiry has already passed and can be cleared.
    pub fn has_expired_ban(&self, now: i64) -> bool {
        matches!(self.banned_until, Some(until) if until <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub handle: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub handle: String,
    pub role: Role,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub owner_id: i64,
    pub description: String,
    pub attachment_ref: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner_id: i64,
    pub description: String,
    pub attachment_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedPostRow {
    pub post: PostRecord,
    pub owner: AuthorSummary,
}

#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    /// Hides posts whose owner blocks, or is blocked by, this user.
    pub viewer_id: Option<i64>,
    pub search: Option<String>,
    pub username: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    /// `None` for a top-level comment.
    pub parent_id: Option<i64>,
    pub body: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FeedCommentRow {
    pub comment: CommentRecord,
    pub author: AuthorSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    ContentReport,
    UserReport,
    Banned,
    Unbanned,
    VerificationRequest,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::ContentReport => "ContentReport",
            AuditKind::UserReport => "UserReport",
            AuditKind::Banned => "Banned",
            AuditKind::Unbanned => "Unbanned",
            AuditKind::VerificationRequest => "VerificationRequest",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ContentReport" => Some(AuditKind::ContentReport),
            "UserReport" => Some(AuditKind::UserReport),
            "Banned" => Some(AuditKind::Banned),
            "Unbanned" => Some(AuditKind::Unbanned),
            "VerificationRequest" => Some(AuditKind::VerificationRequest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryRecord {
    pub id: i64,
    pub kind: AuditKind,
    pub reporter_id: i64,
    pub subject_id: i64,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub reason: String,
    pub duration_secs: Option<i64>,
    /// Pending while `None`.
    pub approved: Option<bool>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub kind: AuditKind,
    pub reporter_id: i64,
    pub subject_id: i64,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub reason: String,
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuditListingRow {
    pub entry: AuditEntryRecord,
    pub reporter_handle: String,
    pub subject_handle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PostLiked,
    CommentLiked,
    Commented,
    Replied,
    Followed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PostLiked => "post_liked",
            NotificationKind::CommentLiked => "comment_liked",
            NotificationKind::Commented => "commented",
            NotificationKind::Replied => "replied",
            NotificationKind::Followed => "followed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "post_liked" => Some(NotificationKind::PostLiked),
            "comment_liked" => Some(NotificationKind::CommentLiked),
            "commented" => Some(NotificationKind::Commented),
            "replied" => Some(NotificationKind::Replied),
            "followed" => Some(NotificationKind::Followed),
            _ => None,
        }
    }

    /// Activity line shown to the recipient.
    pub fn action_text(&self) -> &'static str {
        match self {
            NotificationKind::PostLiked => "liked your post.",
            NotificationKind::CommentLiked => "liked your comment.",
            NotificationKind::Commented => "commented on your post.",
            NotificationKind::Replied => "replied to your comment.",
            NotificationKind::Followed => "followed your account.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: i64,
    pub kind: NotificationKind,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub sender_id: i64,
    pub kind: NotificationKind,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
}
