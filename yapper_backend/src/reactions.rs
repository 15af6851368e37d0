use crate::database::models::{NewNotification, NotificationKind};
use crate::database::repositories::{CommentRepository, LikeRepository, PostRepository};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::notifications::fan_out;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LikeTarget {
    Post(i64),
    Comment(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub count: i64,
}

/// Like ledger for posts and comments. The membership edge and the
/// denormalized counter move together inside one transaction.
#[derive(Clone)]
pub struct ReactionService {
    database: Database,
}

impl ReactionService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn toggle_like(&self, actor_id: i64, target: LikeTarget) -> CoreResult<LikeOutcome> {
        let outcome = match target {
            LikeTarget::Post(post_id) => self.toggle_post_like(actor_id, post_id)?,
            LikeTarget::Comment(comment_id) => self.toggle_comment_like(actor_id, comment_id)?,
        };
        tracing::debug!(actor_id, ?target, liked = outcome.liked, count = outcome.count, "like toggled");
        Ok(outcome)
    }

    fn toggle_post_like(&self, actor_id: i64, post_id: i64) -> CoreResult<LikeOutcome> {
        self.database.with_transaction(|repos| {
            let posts = repos.posts();
            let post = posts
                .get(post_id)?
                .ok_or_else(|| CoreError::not_found("Post not found."))?;
            let likes = repos.likes();
            let liked = if likes.post_like_exists(post_id, actor_id)? {
                likes.remove_post_like(post_id, actor_id)?;
                posts.adjust_like_count(post_id, -1)?;
                false
            } else {
                likes.add_post_like(post_id, actor_id)?;
                posts.adjust_like_count(post_id, 1)?;
                fan_out(
                    &repos,
                    NewNotification {
                        recipient_id: post.owner_id,
                        sender_id: actor_id,
                        kind: NotificationKind::PostLiked,
                        post_id: Some(post_id),
                        comment_id: None,
                    },
                )?;
                true
            };
            let count = posts.get(post_id)?.map(|p| p.like_count).unwrap_or(0);
            Ok(LikeOutcome { liked, count })
        })
    }

    fn toggle_comment_like(&self, actor_id: i64, comment_id: i64) -> CoreResult<LikeOutcome> {
        self.database.with_transaction(|repos| {
            let comments = repos.comments();
            let comment = comments
                .get(comment_id)?
                .ok_or_else(|| CoreError::not_found("Comment not found."))?;
            let likes = repos.likes();
            let liked = if likes.comment_like_exists(comment_id, actor_id)? {
                likes.remove_comment_like(comment_id, actor_id)?;
                comments.adjust_like_count(comment_id, -1)?;
                false
            } else {
                likes.add_comment_like(comment_id, actor_id, comment.post_id)?;
                comments.adjust_like_count(comment_id, 1)?;
                fan_out(
                    &repos,
                    NewNotification {
                        recipient_id: comment.author_id,
                        sender_id: actor_id,
                        kind: NotificationKind::CommentLiked,
                        post_id: Some(comment.post_id),
                        comment_id: Some(comment_id),
                    },
                )?;
                true
            };
            let count = comments.get(comment_id)?.map(|c| c.like_count).unwrap_or(0);
            Ok(LikeOutcome { liked, count })
        })
    }
}
