use crate::database::models::{NewNotification, NotificationKind};
use crate::database::repositories::{BlockRepository, FollowRepository, UserRepository};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::notifications::fan_out;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowOutcome {
    pub following: bool,
    /// Followers of the target after the toggle.
    pub follower_count: i64,
    /// Accounts the actor follows after the toggle.
    pub following_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockOutcome {
    pub blocked: bool,
}

/// Follow and block graphs. Every toggle is one immediate transaction, so the
/// existence check, the edge write and the counter update cannot interleave
/// with another toggle.
#[derive(Clone)]
pub struct RelationshipService {
    database: Database,
}

impl RelationshipService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn toggle_follow(&self, follower_id: i64, target_id: i64) -> CoreResult<FollowOutcome> {
        if follower_id == target_id {
            return Err(CoreError::validation("You can't follow yourself."));
        }
        let outcome = self.database.with_transaction(|repos| {
            let users = repos.users();
            if users.get(target_id)?.is_none() {
                return Err(CoreError::not_found("User not found."));
            }
            let follows = repos.follows();
            let following = if follows.exists(follower_id, target_id)? {
                follows.remove(follower_id, target_id)?;
                users.adjust_follow_counts(follower_id, target_id, -1)?;
                false
            } else {
                follows.add(follower_id, target_id)?;
                users.adjust_follow_counts(follower_id, target_id, 1)?;
                fan_out(
                    &repos,
                    NewNotification {
                        recipient_id: target_id,
                        sender_id: follower_id,
                        kind: NotificationKind::Followed,
                        post_id: None,
                        comment_id: None,
                    },
                )?;
                true
            };
            let follower_count = users.get(target_id)?.map(|u| u.followers).unwrap_or(0);
            let following_count = users.get(follower_id)?.map(|u| u.following).unwrap_or(0);
            Ok(FollowOutcome {
                following,
                follower_count,
                following_count,
            })
        })?;
        tracing::info!(
            follower_id,
            target_id,
            following = outcome.following,
            "follow toggled"
        );
        Ok(outcome)
    }

    pub fn toggle_block(&self, user_id: i64, target_id: i64) -> CoreResult<BlockOutcome> {
        if user_id == target_id {
            return Err(CoreError::validation("You can't block yourself."));
        }
        let blocked = self.database.with_transaction(|repos| {
            if repos.users().get(target_id)?.is_none() {
                return Err(CoreError::not_found("User not found."));
            }
            let blocks = repos.blocks();
            if blocks.exists(user_id, target_id)? {
                blocks.remove(user_id, target_id)?;
                Ok(false)
            } else {
                blocks.add(user_id, target_id)?;
                Ok(true)
            }
        })?;
        tracing::info!(user_id, target_id, blocked, "block toggled");
        Ok(BlockOutcome { blocked })
    }

    pub fn is_following(&self, viewer_id: i64, target_id: i64) -> CoreResult<bool> {
        Ok(self
            .database
            .with_repositories(|repos| repos.follows().exists(viewer_id, target_id))?)
    }

    pub fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> CoreResult<bool> {
        Ok(self
            .database
            .with_repositories(|repos| repos.blocks().exists(blocker_id, blocked_id))?)
    }
}
