//! Moderation authority: who may delete or ban whom, plus reports, bans,
//! security codes and verification review.

use crate::database::models::{AuditKind, AuditListingRow, NewAuditEntry, UserRecord};
use crate::database::repositories::{
    AuditLogRepository, CommentRepository, PostRepository, UserRepository,
};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::sessions::{ServerMessage, SessionNotifier};
use crate::utils::{parse_duration_secs, truncate_chars, unix_now};
use serde::{Deserialize, Serialize};

pub const MAX_REASON_CHARS: usize = 50;
const MIN_REASON_CHARS: usize = 3;
const SECURITY_CODE_LEN: usize = 6;

/// Decides whether `actor` may run a destructive action against content or
/// an account owned by `owner`.
///
/// Owners always act on their own content. Otherwise the actor must be
/// elevated, outrank the owner, and confirm with their security code.
pub fn check_authority(
    actor: &UserRecord,
    owner: &UserRecord,
    supplied_secret: Option<&str>,
) -> CoreResult<()> {
    if actor.id == owner.id {
        return Ok(());
    }
    if !actor.role.is_elevated() || owner.role >= actor.role {
        return Err(CoreError::forbidden(
            "You don't have permission to perform this action.",
        ));
    }
    let supplied = supplied_secret
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(CoreError::secret_required)?;
    let stored = actor
        .security_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(CoreError::secret_required)?;
    if supplied != stored {
        return Err(CoreError::secret_mismatch());
    }
    Ok(())
}

fn normalized_reason(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_REASON_CHARS {
        return Err(CoreError::validation(
            "Reason must be at least 3 characters long.",
        ));
    }
    Ok(truncate_chars(trimmed, MAX_REASON_CHARS))
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanRequest {
    pub target_id: i64,
    pub reason: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub security_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BanOutcome {
    Banned {
        user_id: i64,
        banned_until: i64,
        duration_secs: i64,
        reason: String,
        audit_id: i64,
        /// Whether a live session was found and told to log out.
        session_closed: bool,
    },
    Unbanned {
        user_id: i64,
        audit_id: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportTarget {
    Post {
        post_id: i64,
        #[serde(default)]
        comment_id: Option<i64>,
    },
    User {
        user_id: i64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub target: ReportTarget,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntryView {
    pub id: i64,
    pub kind: AuditKind,
    pub reporter_id: i64,
    pub reporter_handle: String,
    pub subject_id: i64,
    pub subject_handle: String,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub reason: String,
    pub duration_secs: Option<i64>,
    pub approved: Option<bool>,
    pub created_at: String,
}

impl From<AuditListingRow> for AuditEntryView {
    fn from(row: AuditListingRow) -> Self {
        let entry = row.entry;
        Self {
            id: entry.id,
            kind: entry.kind,
            reporter_id: entry.reporter_id,
            reporter_handle: row.reporter_handle,
            subject_id: entry.subject_id,
            subject_handle: row.subject_handle,
            post_id: entry.post_id,
            comment_id: entry.comment_id,
            reason: entry.reason,
            duration_secs: entry.duration_secs,
            approved: entry.approved,
            created_at: entry.created_at,
        }
    }
}

#[derive(Clone)]
pub struct ModerationService {
    database: Database,
    notifier: SessionNotifier,
}

impl ModerationService {
    pub fn new(database: Database, notifier: SessionNotifier) -> Self {
        Self { database, notifier }
    }

    /// Bans the target, or lifts the ban if one is currently active.
    ///
    /// The logout push happens after the ban commits, so a delivery failure
    /// can never undo the ban.
    pub fn ban_user(&self, admin_id: i64, request: BanRequest) -> CoreResult<BanOutcome> {
        let now = unix_now();
        let outcome = self.database.with_transaction(|repos| {
            let users = repos.users();
            let admin = users
                .get(admin_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            if !admin.role.is_elevated() {
                return Err(CoreError::forbidden("You don't have permission to ban users."));
            }
            let target = users
                .get(request.target_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            if target.id == admin.id {
                return Err(CoreError::forbidden("You can't ban yourself."));
            }
            check_authority(&admin, &target, request.security_code.as_deref())?;
            let reason = normalized_reason(&request.reason)?;

            if target.active_ban(now).is_some() {
                users.clear_ban(target.id)?;
                let audit_id = repos.audit_log().append(&NewAuditEntry {
                    kind: AuditKind::Unbanned,
                    reporter_id: admin.id,
                    subject_id: target.id,
                    post_id: None,
                    comment_id: None,
                    reason,
                    duration_secs: None,
                })?;
                return Ok(BanOutcome::Unbanned {
                    user_id: target.id,
                    audit_id,
                });
            }

            let raw_duration = request
                .duration
                .as_deref()
                .map(str::trim)
                .filter(|raw| !raw.is_empty())
                .ok_or_else(|| CoreError::validation("A ban duration is required."))?;
            let duration_secs = parse_duration_secs(raw_duration)
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    CoreError::validation(format!("Invalid ban duration `{raw_duration}`."))
                })?;
            let banned_until = now
                .checked_add(duration_secs)
                .ok_or_else(|| CoreError::validation("Ban duration is too long."))?;

            users.set_ban(target.id, banned_until, &reason)?;
            let audit_id = repos.audit_log().append(&NewAuditEntry {
                kind: AuditKind::Banned,
                reporter_id: admin.id,
                subject_id: target.id,
                post_id: None,
                comment_id: None,
                reason: reason.clone(),
                duration_secs: Some(duration_secs),
            })?;
            Ok(BanOutcome::Banned {
                user_id: target.id,
                banned_until,
                duration_secs,
                reason,
                audit_id,
                session_closed: false,
            })
        })?;

        match outcome {
            BanOutcome::Banned {
                user_id,
                banned_until,
                duration_secs,
                reason,
                audit_id,
                ..
            } => {
                tracing::info!(admin_id, user_id, duration_secs, "user banned");
                let session_closed = self.notifier.notify(
                    user_id,
                    ServerMessage::Logout {
                        reason: reason.clone(),
                    },
                );
                Ok(BanOutcome::Banned {
                    user_id,
                    banned_until,
                    duration_secs,
                    reason,
                    audit_id,
                    session_closed,
                })
            }
            BanOutcome::Unbanned { user_id, audit_id } => {
                tracing::info!(admin_id, user_id, "user unbanned");
                Ok(BanOutcome::Unbanned { user_id, audit_id })
            }
        }
    }

    pub fn add_report(&self, reporter_id: i64, request: ReportRequest) -> CoreResult<i64> {
        let reason = normalized_reason(&request.reason)?;
        let report_id = self.database.with_transaction(|repos| {
            let (kind, subject_id, post_id, comment_id) = match request.target {
                ReportTarget::User { user_id } => {
                    let subject = repos
                        .users()
                        .get(user_id)?
                        .ok_or_else(|| CoreError::not_found("User not found."))?;
                    (AuditKind::UserReport, subject.id, None, None)
                }
                ReportTarget::Post {
                    post_id,
                    comment_id,
                } => {
                    let post = repos
                        .posts()
                        .get(post_id)?
                        .ok_or_else(|| CoreError::not_found("Post not found."))?;
                    match comment_id {
                        Some(comment_id) => {
                            let comment = repos
                                .comments()
                                .get(comment_id)?
                                .filter(|comment| comment.post_id == post.id)
                                .ok_or_else(|| CoreError::not_found("Comment not found."))?;
                            (
                                AuditKind::ContentReport,
                                comment.author_id,
                                Some(post.id),
                                Some(comment.id),
                            )
                        }
                        None => (AuditKind::ContentReport, post.owner_id, Some(post.id), None),
                    }
                }
            };
            if subject_id == reporter_id {
                return Err(CoreError::forbidden("You can't report yourself."));
            }
            Ok(repos.audit_log().append(&NewAuditEntry {
                kind,
                reporter_id,
                subject_id,
                post_id,
                comment_id,
                reason,
                duration_secs: None,
            })?)
        })?;
        tracing::info!(report_id, reporter_id, "report filed");
        Ok(report_id)
    }

    pub fn list_reports(&self, actor_id: i64, limit: usize) -> CoreResult<Vec<AuditEntryView>> {
        self.database.with_repositories(|repos| {
            let actor = repos
                .users()
                .get(actor_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            if !actor.role.is_elevated() {
                return Err(CoreError::forbidden("You don't have permission to view reports."));
            }
            let rows = repos.audit_log().list_recent(limit.clamp(1, 500))?;
            Ok(rows.into_iter().map(AuditEntryView::from).collect())
        })
    }

    /// Stores the elevated-action code. It can be set exactly once.
    pub fn set_security_code(&self, user_id: i64, code: &str) -> CoreResult<()> {
        let code = code.trim();
        if code.len() != SECURITY_CODE_LEN || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::validation("Security code must be exactly 6 digits."));
        }
        let stored = self
            .database
            .with_transaction(|repos| repos.users().set_security_code(user_id, code))?;
        if !stored {
            return Err(CoreError::Conflict("A security code is already set.".into()));
        }
        tracing::info!(user_id, "security code enabled");
        Ok(())
    }

    pub fn request_verification(&self, user_id: i64) -> CoreResult<i64> {
        let entry_id = self.database.with_transaction(|repos| {
            let user = repos
                .users()
                .get(user_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            if user.verified {
                return Err(CoreError::Conflict("Your account is already verified.".into()));
            }
            let audit = repos.audit_log();
            if audit
                .find_pending(AuditKind::VerificationRequest, user_id)?
                .is_some()
            {
                return Err(CoreError::Conflict(
                    "A verification request is already pending.".into(),
                ));
            }
            Ok(audit.append(&NewAuditEntry {
                kind: AuditKind::VerificationRequest,
                reporter_id: user_id,
                subject_id: user_id,
                post_id: None,
                comment_id: None,
                reason: "Verification requested".into(),
                duration_secs: None,
            })?)
        })?;
        tracing::info!(user_id, entry_id, "verification requested");
        Ok(entry_id)
    }

    pub fn review_verification(
        &self,
        reviewer_id: i64,
        entry_id: i64,
        approved: bool,
    ) -> CoreResult<()> {
        self.database.with_transaction(|repos| {
            let reviewer = repos
                .users()
                .get(reviewer_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            if !reviewer.role.is_elevated() {
                return Err(CoreError::forbidden(
                    "You don't have permission to review verification requests.",
                ));
            }
            let audit = repos.audit_log();
            let entry = audit
                .get(entry_id)?
                .filter(|entry| entry.kind == AuditKind::VerificationRequest)
                .ok_or_else(|| CoreError::not_found("Verification request not found."))?;
            if entry.approved.is_some() {
                return Err(CoreError::Conflict("Request was already reviewed.".into()));
            }
            audit.set_approved(entry.id, approved)?;
            if approved {
                repos.users().set_verified(entry.subject_id, true)?;
            }
            Ok(())
        })?;
        tracing::info!(reviewer_id, entry_id, approved, "verification reviewed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::database::models::{NewComment, NewPost, NewUser};
    use crate::error::ForbiddenKind;
    use crate::identity::{IdentityResolver, Role, SessionSigner};
    use crate::sessions::{connection_channel, SessionCommand, SessionRegistry};

    struct Fixture {
        service: ModerationService,
        database: Database,
        registry: SessionRegistry,
        admin: i64,
        other_admin: i64,
        user: i64,
        bystander: i64,
    }

    fn create(database: &Database, handle: &str, role: Role) -> i64 {
        database
            .with_repositories(|repos| {
                repos.users().create(&NewUser {
                    handle: handle.into(),
                    role,
                })
            })
            .expect("user")
    }

    fn setup_service() -> Fixture {
        let database = Database::open_in_memory().expect("db");
        let admin = create(&database, "admin", Role::ADMIN);
        let other_admin = create(&database, "admin2", Role::ADMIN);
        let user = create(&database, "spammer", Role::Standard);
        let bystander = create(&database, "bystander", Role::Standard);
        let registry = SessionRegistry::new();
        let service = ModerationService::new(database.clone(), SessionNotifier::new(registry.clone()));
        service.set_security_code(admin, "123456").unwrap();
        Fixture {
            service,
            database,
            registry,
            admin,
            other_admin,
            user,
            bystander,
        }
    }

    fn ban(target_id: i64, duration: Option<&str>, code: Option<&str>) -> BanRequest {
        BanRequest {
            target_id,
            reason: "spam".into(),
            duration: duration.map(str::to_string),
            security_code: code.map(str::to_string),
        }
    }

    fn user(fx: &Fixture, id: i64) -> UserRecord {
        fx.database
            .with_repositories(|repos| repos.users().get(id))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn authority_matrix_for_bans() {
        let fx = setup_service();

        // Elevated actor against an equal role.
        let err = fx
            .service
            .ban_user(fx.admin, ban(fx.other_admin, Some("1h"), Some("123456")))
            .unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::InsufficientRole));

        // Standard actor against anyone.
        let err = fx
            .service
            .ban_user(fx.bystander, ban(fx.user, Some("1h"), None))
            .unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::InsufficientRole));

        let err = fx
            .service
            .ban_user(fx.admin, ban(fx.user, Some("1h"), None))
            .unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::SecretRequired));

        let err = fx
            .service
            .ban_user(fx.admin, ban(fx.user, Some("1h"), Some("000000")))
            .unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::SecretMismatch));
    }

    #[test]
    fn owners_act_without_secret_and_admins_need_one() {
        let fx = setup_service();
        let admin = user(&fx, fx.admin);
        let owner = user(&fx, fx.user);
        let peer = user(&fx, fx.other_admin);

        assert!(check_authority(&owner, &owner, None).is_ok());
        assert_eq!(
            check_authority(&admin, &owner, None)
                .unwrap_err()
                .forbidden_kind(),
            Some(ForbiddenKind::SecretRequired)
        );
        assert!(check_authority(&admin, &owner, Some(" 123456 ")).is_ok());
        assert_eq!(
            check_authority(&owner, &admin, Some("123456"))
                .unwrap_err()
                .forbidden_kind(),
            Some(ForbiddenKind::InsufficientRole)
        );
        // An elevated actor with no stored code cannot confirm anything.
        assert_eq!(
            check_authority(&peer, &owner, Some("123456"))
                .unwrap_err()
                .forbidden_kind(),
            Some(ForbiddenKind::SecretRequired)
        );
    }

    #[test]
    fn ban_closes_live_session_and_blocks_requests() {
        let fx = setup_service();
        let (handle, mut rx) = connection_channel();
        fx.registry.register(fx.user, handle);

        let before = unix_now();
        let outcome = fx
            .service
            .ban_user(fx.admin, ban(fx.user, Some("1h"), Some("123456")))
            .unwrap();
        let BanOutcome::Banned {
            banned_until,
            duration_secs,
            session_closed,
            ..
        } = outcome
        else {
            panic!("expected a ban");
        };
        assert_eq!(duration_secs, 3_600);
        assert!(session_closed);
        assert!(banned_until >= before + 3_600 && banned_until <= unix_now() + 3_600);

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionCommand::Push(ServerMessage::Logout {
                reason: "spam".into()
            })
        );
        assert_eq!(rx.try_recv().unwrap(), SessionCommand::Close);
        assert!(rx.try_recv().is_err());
        assert!(fx.registry.get(fx.user).is_none());

        let audit = fx
            .database
            .with_repositories(|repos| repos.audit_log().list_for_subject(fx.user))
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].kind, AuditKind::Banned);
        assert_eq!(audit[0].duration_secs, Some(3_600));

        let resolver = IdentityResolver::new(
            fx.database.clone(),
            SessionSigner::new(&SessionConfig::new("secret")),
        );
        match resolver.resolve_user(fx.user, unix_now()) {
            Err(CoreError::Banned {
                reason,
                remaining_secs,
                ..
            }) => {
                assert_eq!(reason, "spam");
                assert!(remaining_secs > 3_500 && remaining_secs <= 3_600);
            }
            other => panic!("expected ban rejection, got {other:?}"),
        }
    }

    #[test]
    fn banning_a_banned_user_unbans() {
        let fx = setup_service();
        fx.service
            .ban_user(fx.admin, ban(fx.user, Some("1d"), Some("123456")))
            .unwrap();
        let outcome = fx
            .service
            .ban_user(fx.admin, ban(fx.user, Some("1d"), Some("123456")))
            .unwrap();
        assert!(matches!(outcome, BanOutcome::Unbanned { .. }));

        let stored = user(&fx, fx.user);
        assert!(stored.banned_until.is_none());
        let kinds: Vec<AuditKind> = fx
            .database
            .with_repositories(|repos| repos.audit_log().list_for_subject(fx.user))
            .unwrap()
            .into_iter()
            .map(|entry| entry.kind)
            .collect();
        assert_eq!(kinds, vec![AuditKind::Banned, AuditKind::Unbanned]);
    }

    #[test]
    fn ban_input_is_validated() {
        let fx = setup_service();
        let mut short = ban(fx.user, Some("1h"), Some("123456"));
        short.reason = " x ".into();
        assert!(matches!(
            fx.service.ban_user(fx.admin, short),
            Err(CoreError::Validation(_))
        ));
        for duration in [None, Some("0h"), Some("soon"), Some("99999999999999999y")] {
            assert!(matches!(
                fx.service.ban_user(fx.admin, ban(fx.user, duration, Some("123456"))),
                Err(CoreError::Validation(_))
            ));
        }
        assert!(user(&fx, fx.user).banned_until.is_none());
    }

    #[test]
    fn self_ban_is_forbidden() {
        let fx = setup_service();
        assert!(matches!(
            fx.service.ban_user(fx.admin, ban(fx.admin, Some("1h"), Some("123456"))),
            Err(CoreError::Forbidden {
                kind: ForbiddenKind::InsufficientRole,
                ..
            })
        ));
        assert!(user(&fx, fx.admin).banned_until.is_none());
    }

    #[test]
    fn long_reasons_are_truncated() {
        let fx = setup_service();
        let mut request = ban(fx.user, Some("2"), Some("123456"));
        request.reason = "r".repeat(80);
        fx.service.ban_user(fx.admin, request).unwrap();
        let stored = user(&fx, fx.user);
        assert_eq!(stored.ban_reason.unwrap().len(), MAX_REASON_CHARS);
    }

    #[test]
    fn reports_validate_target_and_reporter() {
        let fx = setup_service();
        let (post_id, comment_id) = fx
            .database
            .with_repositories(|repos| {
                let post_id = repos.posts().create(&NewPost {
                    owner_id: fx.user,
                    description: "buy now".into(),
                    attachment_ref: None,
                })?;
                let comment_id = repos.comments().create(&NewComment {
                    post_id,
                    author_id: fx.user,
                    parent_id: None,
                    body: "cheap".into(),
                })?;
                Ok::<_, anyhow::Error>((post_id, comment_id))
            })
            .unwrap();

        let report = |reporter, target, reason: &str| {
            fx.service.add_report(
                reporter,
                ReportRequest {
                    target,
                    reason: reason.into(),
                },
            )
        };

        report(
            fx.bystander,
            ReportTarget::Post {
                post_id,
                comment_id: Some(comment_id),
            },
            "spam",
        )
        .unwrap();
        report(fx.bystander, ReportTarget::User { user_id: fx.user }, "bot account").unwrap();

        assert!(matches!(
            report(fx.user, ReportTarget::User { user_id: fx.user }, "me"),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            report(fx.user, ReportTarget::User { user_id: fx.user }, "myself"),
            Err(CoreError::Forbidden { .. })
        ));
        assert!(matches!(
            report(fx.bystander, ReportTarget::User { user_id: 777 }, "ghost"),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            report(
                fx.bystander,
                ReportTarget::Post {
                    post_id: 404,
                    comment_id: None
                },
                "missing"
            ),
            Err(CoreError::NotFound(_))
        ));

        let listed = fx.service.list_reports(fx.admin, 50).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, AuditKind::UserReport);
        assert_eq!(listed[1].comment_id, Some(comment_id));
        assert_eq!(listed[1].reporter_handle, "bystander");
        assert!(matches!(
            fx.service.list_reports(fx.bystander, 50),
            Err(CoreError::Forbidden { .. })
        ));
    }

    #[test]
    fn security_code_is_set_once() {
        let fx = setup_service();
        assert!(matches!(
            fx.service.set_security_code(fx.user, "12ab56"),
            Err(CoreError::Validation(_))
        ));
        fx.service.set_security_code(fx.user, "654321").unwrap();
        assert!(matches!(
            fx.service.set_security_code(fx.user, "111111"),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn verification_requests_are_reviewed_once() {
        let fx = setup_service();
        let entry = fx.service.request_verification(fx.bystander).unwrap();
        assert!(matches!(
            fx.service.request_verification(fx.bystander),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            fx.service.review_verification(fx.user, entry, true),
            Err(CoreError::Forbidden { .. })
        ));
        fx.service.review_verification(fx.admin, entry, true).unwrap();
        assert!(user(&fx, fx.bystander).verified);
        assert!(matches!(
            fx.service.review_verification(fx.admin, entry, false),
            Err(CoreError::Conflict(_))
        ));
    }
}
