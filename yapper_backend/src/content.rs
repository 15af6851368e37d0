use crate::database::models::{
    AuthorSummary, CommentRecord, FeedCommentRow, FeedQuery, NewComment, NewNotification, NewPost,
    NotificationKind, PostRecord,
};
use crate::database::repositories::{
    BlockRepository, CommentRepository, LikeRepository, NotificationRepository, PostRepository,
    UserRepository,
};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::files::is_image_ref;
use crate::moderation::check_authority;
use crate::notifications::fan_out;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_COMMENT_CHARS: usize = 500;
const DEFAULT_FEED_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCommentInput {
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: i64,
    pub owner: AuthorSummary,
    pub description: String,
    pub attachment_ref: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub created_at: String,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub post_id: i64,
    pub author: AuthorSummary,
    pub parent_id: Option<i64>,
    pub body: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub liked: bool,
    /// The viewer and the author are in a block relation; the client hides
    /// the body behind a reveal.
    pub blocked: bool,
    pub created_at: String,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    fn from_row(row: FeedCommentRow, liked: bool, blocked: bool) -> Self {
        let FeedCommentRow { comment, author } = row;
        Self {
            id: comment.id,
            post_id: comment.post_id,
            author,
            parent_id: comment.parent_id,
            body: comment.body,
            like_count: comment.like_count,
            reply_count: comment.reply_count,
            liked,
            blocked,
            created_at: comment.created_at,
            replies: Vec::new(),
        }
    }
}

/// Posts and the two-level comment tree. Every mutation keeps
/// `comment_count` and `reply_count` equal to the rows they summarize.
#[derive(Clone)]
pub struct ContentService {
    database: Database,
}

impl ContentService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn create_post(&self, owner_id: i64, input: CreatePostInput) -> CoreResult<PostRecord> {
        let description = input.description.trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(CoreError::validation(
                "Description must be 2000 characters or fewer.",
            ));
        }
        let attachment_ref = input
            .attachment_ref
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        if let Some(attachment) = attachment_ref.as_deref() {
            if !is_image_ref(attachment) {
                return Err(CoreError::validation("Attachment must be an image."));
            }
        }
        if description.is_empty() && attachment_ref.is_none() {
            return Err(CoreError::validation(
                "A post needs a description or an image.",
            ));
        }

        let post = self.database.with_transaction(|repos| {
            let posts = repos.posts();
            let id = posts.create(&NewPost {
                owner_id,
                description,
                attachment_ref,
            })?;
            posts
                .get(id)?
                .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("post {id} vanished after insert")))
        })?;
        tracing::info!(post_id = post.id, owner_id, "post created");
        Ok(post)
    }

    pub fn delete_post(
        &self,
        actor_id: i64,
        post_id: i64,
        security_code: Option<&str>,
    ) -> CoreResult<()> {
        self.database.with_transaction(|repos| {
            let posts = repos.posts();
            let post = posts
                .get(post_id)?
                .ok_or_else(|| CoreError::not_found("Post not found."))?;
            let users = repos.users();
            let actor = users
                .get(actor_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            let owner = users
                .get(post.owner_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            check_authority(&actor, &owner, security_code)?;

            let likes = repos.likes();
            likes.delete_comment_likes_for_post(post_id)?;
            repos.comments().delete_for_post(post_id)?;
            likes.delete_post_likes(post_id)?;
            repos.notifications().delete_for_post(post_id)?;
            posts.delete(post_id)?;
            Ok::<(), CoreError>(())
        })?;
        tracing::info!(post_id, actor_id, "post deleted");
        Ok(())
    }

    /// Adds a comment. A reply to a reply is attached to the top-level
    /// comment, so the tree never grows past two levels.
    pub fn add_comment(
        &self,
        author_id: i64,
        post_id: i64,
        input: AddCommentInput,
    ) -> CoreResult<CommentRecord> {
        let body = input.body.trim().to_string();
        let length = body.chars().count();
        if length == 0 || length > MAX_COMMENT_CHARS {
            return Err(CoreError::validation(
                "Comment must be between 1 and 500 characters.",
            ));
        }

        let comment = self.database.with_transaction(|repos| {
            let posts = repos.posts();
            let post = posts
                .get(post_id)?
                .ok_or_else(|| CoreError::not_found("Post not found."))?;
            let comments = repos.comments();

            let parent = match input.parent_id {
                Some(parent_id) => {
                    let target = comments
                        .get(parent_id)?
                        .filter(|comment| comment.post_id == post.id)
                        .ok_or_else(|| CoreError::not_found("Comment not found."))?;
                    let top_level = match target.parent_id {
                        Some(top_id) => comments
                            .get(top_id)?
                            .ok_or_else(|| CoreError::not_found("Comment not found."))?,
                        None => target,
                    };
                    Some(top_level)
                }
                None => None,
            };

            let id = comments.create(&NewComment {
                post_id: post.id,
                author_id,
                parent_id: parent.as_ref().map(|p| p.id),
                body,
            })?;
            posts.adjust_comment_count(post.id, 1)?;
            let notification = match &parent {
                Some(parent) => {
                    comments.adjust_reply_count(parent.id, 1)?;
                    NewNotification {
                        recipient_id: parent.author_id,
                        sender_id: author_id,
                        kind: NotificationKind::Replied,
                        post_id: Some(post.id),
                        comment_id: Some(id),
                    }
                }
                None => NewNotification {
                    recipient_id: post.owner_id,
                    sender_id: author_id,
                    kind: NotificationKind::Commented,
                    post_id: Some(post.id),
                    comment_id: Some(id),
                },
            };
            fan_out(&repos, notification)?;

            comments
                .get(id)?
                .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("comment {id} vanished after insert")))
        })?;
        tracing::debug!(
            comment_id = comment.id,
            post_id,
            parent_id = ?comment.parent_id,
            "comment added"
        );
        Ok(comment)
    }

    pub fn delete_comment(
        &self,
        actor_id: i64,
        post_id: i64,
        comment_id: i64,
        security_code: Option<&str>,
    ) -> CoreResult<()> {
        let removed = self.database.with_transaction(|repos| {
            let comments = repos.comments();
            let comment = comments
                .get(comment_id)?
                .filter(|comment| comment.post_id == post_id)
                .ok_or_else(|| CoreError::not_found("Comment not found."))?;
            let users = repos.users();
            let actor = users
                .get(actor_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            let author = users
                .get(comment.author_id)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            check_authority(&actor, &author, security_code)?;

            let removed = match comment.parent_id {
                Some(_) => 1,
                None => 1 + comments.count_replies(comment.id)?,
            };
            repos.likes().delete_comment_likes(comment.id)?;
            repos.notifications().delete_for_comment(comment.id)?;
            comments.delete(comment.id)?;
            if let Some(parent_id) = comment.parent_id {
                comments.adjust_reply_count(parent_id, -1)?;
            }
            repos.posts().adjust_comment_count(post_id, -removed)?;
            Ok::<i64, CoreError>(removed)
        })?;
        tracing::info!(comment_id, post_id, actor_id, removed, "comment deleted");
        Ok(())
    }

    /// Builds the viewer's feed. Block relations are read per call.
    pub fn get_feed(&self, viewer_id: i64, filter: FeedFilter) -> CoreResult<Vec<PostView>> {
        let query = FeedQuery {
            viewer_id: Some(viewer_id),
            search: filter.search,
            username: filter.username,
            limit: filter.limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, 200),
        };
        self.database.with_repositories(|repos| {
            let related = repos.blocks().related_to(viewer_id)?;
            let rows = repos.posts().list_feed(&query)?;
            let post_ids: Vec<i64> = rows.iter().map(|row| row.post.id).collect();

            let comment_rows = repos.comments().list_for_posts(&post_ids)?;
            let comment_ids: Vec<i64> = comment_rows.iter().map(|row| row.comment.id).collect();
            let likes = repos.likes();
            let liked_posts = likes.liked_posts(viewer_id, &post_ids)?;
            let liked_comments = likes.liked_comments(viewer_id, &comment_ids)?;

            // Rows arrive oldest first, so every parent precedes its replies.
            let mut top_level: HashMap<i64, Vec<CommentView>> = HashMap::new();
            let mut replies: HashMap<i64, Vec<CommentView>> = HashMap::new();
            for row in comment_rows {
                let liked = liked_comments.contains(&row.comment.id);
                let blocked = related.contains(&row.comment.author_id);
                let view = CommentView::from_row(row, liked, blocked);
                match view.parent_id {
                    Some(parent_id) => replies.entry(parent_id).or_default().push(view),
                    None => top_level.entry(view.post_id).or_default().push(view),
                }
            }

            let views: Vec<PostView> = rows
                .into_iter()
                .map(|row| {
                    let mut comments = top_level.remove(&row.post.id).unwrap_or_default();
                    for comment in &mut comments {
                        comment.replies = replies.remove(&comment.id).unwrap_or_default();
                    }
                    PostView {
                        id: row.post.id,
                        liked: liked_posts.contains(&row.post.id),
                        owner: row.owner,
                        description: row.post.description,
                        attachment_ref: row.post.attachment_ref,
                        like_count: row.post.like_count,
                        comment_count: row.post.comment_count,
                        created_at: row.post.created_at,
                        comments,
                    }
                })
                .collect();
            Ok(views)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewUser;
    use crate::error::ForbiddenKind;
    use crate::identity::Role;
    use crate::reactions::{LikeTarget, ReactionService};
    use crate::relationships::RelationshipService;

    struct Fixture {
        service: ContentService,
        database: Database,
        alice: i64,
        bob: i64,
        carol: i64,
        admin: i64,
    }

    fn setup_service() -> Fixture {
        let database = Database::open_in_memory().expect("db");
        let ids = database
            .with_repositories(|repos| {
                let users = repos.users();
                let mut ids = Vec::new();
                for (handle, role) in [
                    ("alice", Role::Standard),
                    ("bob", Role::Standard),
                    ("carol", Role::VerifiedTrack),
                    ("admin", Role::ADMIN),
                ] {
                    ids.push(users.create(&NewUser {
                        handle: handle.into(),
                        role,
                    })?);
                }
                users.set_security_code(ids[3], "246810")?;
                Ok::<_, anyhow::Error>(ids)
            })
            .expect("users");
        Fixture {
            service: ContentService::new(database.clone()),
            database,
            alice: ids[0],
            bob: ids[1],
            carol: ids[2],
            admin: ids[3],
        }
    }

    fn post(fx: &Fixture, owner: i64, description: &str) -> i64 {
        fx.service
            .create_post(
                owner,
                CreatePostInput {
                    description: description.into(),
                    attachment_ref: None,
                },
            )
            .expect("post")
            .id
    }

    fn comment(fx: &Fixture, author: i64, post_id: i64, parent_id: Option<i64>) -> i64 {
        fx.service
            .add_comment(
                author,
                post_id,
                AddCommentInput {
                    body: "nice".into(),
                    parent_id,
                },
            )
            .expect("comment")
            .id
    }

    fn stored_post(fx: &Fixture, post_id: i64) -> Option<PostRecord> {
        fx.database
            .with_repositories(|repos| repos.posts().get(post_id))
            .unwrap()
    }

    fn stored_comment(fx: &Fixture, comment_id: i64) -> Option<CommentRecord> {
        fx.database
            .with_repositories(|repos| repos.comments().get(comment_id))
            .unwrap()
    }

    #[test]
    fn post_input_is_validated() {
        let fx = setup_service();
        let empty = fx.service.create_post(fx.alice, CreatePostInput::default());
        assert!(matches!(empty, Err(CoreError::Validation(_))));

        let not_image = fx.service.create_post(
            fx.alice,
            CreatePostInput {
                description: "doc".into(),
                attachment_ref: Some("report.pdf".into()),
            },
        );
        assert!(matches!(not_image, Err(CoreError::Validation(_))));

        let image_only = fx
            .service
            .create_post(
                fx.alice,
                CreatePostInput {
                    description: "  ".into(),
                    attachment_ref: Some("0b7a.png".into()),
                },
            )
            .unwrap();
        assert_eq!(image_only.attachment_ref.as_deref(), Some("0b7a.png"));

        let too_long = fx.service.create_post(
            fx.alice,
            CreatePostInput {
                description: "x".repeat(MAX_DESCRIPTION_CHARS + 1),
                attachment_ref: None,
            },
        );
        assert!(matches!(too_long, Err(CoreError::Validation(_))));
    }

    #[test]
    fn replies_to_replies_flatten_to_top_level() {
        let fx = setup_service();
        let post_id = post(&fx, fx.alice, "hello");
        let top = comment(&fx, fx.bob, post_id, None);
        let reply = comment(&fx, fx.carol, post_id, Some(top));
        let nested = comment(&fx, fx.alice, post_id, Some(reply));

        assert_eq!(stored_comment(&fx, nested).unwrap().parent_id, Some(top));
        assert_eq!(stored_comment(&fx, top).unwrap().reply_count, 2);
        assert_eq!(stored_comment(&fx, reply).unwrap().reply_count, 0);
        assert_eq!(stored_post(&fx, post_id).unwrap().comment_count, 3);
    }

    #[test]
    fn comment_input_is_validated() {
        let fx = setup_service();
        let post_id = post(&fx, fx.alice, "hello");
        let other_post = post(&fx, fx.bob, "elsewhere");
        let foreign = comment(&fx, fx.bob, other_post, None);

        let blank = fx.service.add_comment(
            fx.bob,
            post_id,
            AddCommentInput {
                body: "   ".into(),
                parent_id: None,
            },
        );
        assert!(matches!(blank, Err(CoreError::Validation(_))));

        let cross_post = fx.service.add_comment(
            fx.bob,
            post_id,
            AddCommentInput {
                body: "hi".into(),
                parent_id: Some(foreign),
            },
        );
        assert!(matches!(cross_post, Err(CoreError::NotFound(_))));
        assert_eq!(stored_post(&fx, post_id).unwrap().comment_count, 0);
    }

    #[test]
    fn deleting_replies_keeps_counts_exact() {
        let fx = setup_service();
        let post_id = post(&fx, fx.alice, "thread");
        let top = comment(&fx, fx.alice, post_id, None);
        let replies: Vec<i64> = (0..5).map(|_| comment(&fx, fx.bob, post_id, Some(top))).collect();

        fx.service.delete_comment(fx.bob, post_id, replies[0], None).unwrap();
        fx.service.delete_comment(fx.bob, post_id, replies[3], None).unwrap();

        assert_eq!(stored_comment(&fx, top).unwrap().reply_count, 3);
        let count = fx
            .database
            .with_repositories(|repos| repos.comments().count_replies(top))
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(stored_post(&fx, post_id).unwrap().comment_count, 4);
    }

    #[test]
    fn deleting_a_top_level_comment_removes_its_replies() {
        let fx = setup_service();
        let post_id = post(&fx, fx.alice, "thread");
        let top = comment(&fx, fx.bob, post_id, None);
        let reply = comment(&fx, fx.carol, post_id, Some(top));
        ReactionService::new(fx.database.clone())
            .toggle_like(fx.alice, LikeTarget::Comment(reply))
            .unwrap();
        comment(&fx, fx.carol, post_id, None);

        fx.service.delete_comment(fx.bob, post_id, top, None).unwrap();
        assert!(stored_comment(&fx, reply).is_none());
        assert_eq!(stored_post(&fx, post_id).unwrap().comment_count, 1);
        let likes = fx
            .database
            .with_repositories(|repos| repos.likes().count_comment_likes(reply))
            .unwrap();
        assert_eq!(likes, 0);
    }

    #[test]
    fn delete_comment_checks_post_and_authority() {
        let fx = setup_service();
        let post_id = post(&fx, fx.alice, "thread");
        let other = post(&fx, fx.alice, "other");
        let top = comment(&fx, fx.bob, post_id, None);

        assert!(matches!(
            fx.service.delete_comment(fx.bob, other, top, None),
            Err(CoreError::NotFound(_))
        ));
        let err = fx.service.delete_comment(fx.carol, post_id, top, None).unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::InsufficientRole));
    }

    #[test]
    fn post_deletion_authority_matrix() {
        let fx = setup_service();

        // Owner deletes their own post without a secret.
        let own = post(&fx, fx.alice, "mine");
        fx.service.delete_post(fx.alice, own, None).unwrap();
        assert!(stored_post(&fx, own).is_none());

        // Elevated actor without the secret.
        let target = post(&fx, fx.bob, "questionable");
        let err = fx.service.delete_post(fx.admin, target, None).unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::SecretRequired));
        let err = fx
            .service
            .delete_post(fx.admin, target, Some("000000"))
            .unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::SecretMismatch));
        assert!(stored_post(&fx, target).is_some());

        // Elevated actor with the correct secret.
        fx.service
            .delete_post(fx.admin, target, Some("246810"))
            .unwrap();
        assert!(stored_post(&fx, target).is_none());

        // A standard user cannot delete someone else's post.
        let protected = post(&fx, fx.admin, "rules");
        let err = fx.service.delete_post(fx.bob, protected, None).unwrap_err();
        assert_eq!(err.forbidden_kind(), Some(ForbiddenKind::InsufficientRole));
    }

    #[test]
    fn post_deletion_cascades() {
        let fx = setup_service();
        let post_id = post(&fx, fx.alice, "busy");
        let top = comment(&fx, fx.bob, post_id, None);
        comment(&fx, fx.carol, post_id, Some(top));
        let reactions = ReactionService::new(fx.database.clone());
        reactions.toggle_like(fx.bob, LikeTarget::Post(post_id)).unwrap();
        reactions.toggle_like(fx.alice, LikeTarget::Comment(top)).unwrap();

        fx.service.delete_post(fx.alice, post_id, None).unwrap();
        let (comments, post_likes, notes) = fx
            .database
            .with_repositories(|repos| {
                Ok::<_, anyhow::Error>((
                    repos.comments().count_for_post(post_id)?,
                    repos.likes().count_post_likes(post_id)?,
                    repos.notifications().list_for_recipient(fx.alice, 50)?,
                ))
            })
            .unwrap();
        assert_eq!(comments, 0);
        assert_eq!(post_likes, 0);
        assert!(notes.iter().all(|note| note.post_id != Some(post_id)));
    }

    #[test]
    fn feed_annotates_likes_and_nests_replies() {
        let fx = setup_service();
        let older = post(&fx, fx.alice, "First post");
        let newer = post(&fx, fx.bob, "second POST");
        let top = comment(&fx, fx.bob, older, None);
        comment(&fx, fx.carol, older, Some(top));
        ReactionService::new(fx.database.clone())
            .toggle_like(fx.carol, LikeTarget::Post(older))
            .unwrap();

        let feed = fx.service.get_feed(fx.carol, FeedFilter::default()).unwrap();
        assert_eq!(feed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![newer, older]);
        assert!(feed[1].liked);
        assert!(!feed[0].liked);
        assert_eq!(feed[1].comments.len(), 1);
        assert_eq!(feed[1].comments[0].replies.len(), 1);
        assert_eq!(feed[1].comments[0].replies[0].author.handle, "carol");

        let searched = fx
            .service
            .get_feed(
                fx.carol,
                FeedFilter {
                    search: Some("post".into()),
                    username: Some("BOB".into()),
                    limit: None,
                },
            )
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].id, newer);
    }

    #[test]
    fn blocking_flags_comments_without_deleting_them() {
        let fx = setup_service();
        let post_id = post(&fx, fx.carol, "open thread");
        let bob_post = post(&fx, fx.bob, "bob's own");
        let bobs_comment = comment(&fx, fx.bob, post_id, None);
        RelationshipService::new(fx.database.clone())
            .toggle_block(fx.alice, fx.bob)
            .unwrap();

        let alice_view = fx.service.get_feed(fx.alice, FeedFilter::default()).unwrap();
        assert!(alice_view.iter().all(|p| p.id != bob_post));
        let thread = alice_view.iter().find(|p| p.id == post_id).unwrap();
        assert!(thread.comments[0].blocked);
        assert_eq!(thread.comments[0].id, bobs_comment);

        let carol_view = fx.service.get_feed(fx.carol, FeedFilter::default()).unwrap();
        let thread = carol_view.iter().find(|p| p.id == post_id).unwrap();
        assert!(!thread.comments[0].blocked);
        assert!(carol_view.iter().any(|p| p.id == bob_post));

        assert!(stored_comment(&fx, bobs_comment).is_some());
    }

    #[test]
    fn blocked_authors_do_not_consume_the_feed_limit() {
        let fx = setup_service();
        let carols = post(&fx, fx.carol, "still visible");
        post(&fx, fx.bob, "hidden one");
        post(&fx, fx.bob, "hidden two");
        let alices = post(&fx, fx.alice, "alice speaks");
        RelationshipService::new(fx.database.clone())
            .toggle_block(fx.alice, fx.bob)
            .unwrap();

        let limited = FeedFilter {
            limit: Some(2),
            ..FeedFilter::default()
        };
        let alice_view = fx.service.get_feed(fx.alice, limited.clone()).unwrap();
        assert_eq!(
            alice_view.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![alices, carols]
        );

        let bob_view = fx.service.get_feed(fx.bob, limited).unwrap();
        assert!(bob_view.iter().all(|p| p.owner.id != fx.alice));
        assert_eq!(bob_view.len(), 2);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let fx = setup_service();
        let sale = post(&fx, fx.alice, "50% off today");
        post(&fx, fx.bob, "500 reasons");
        post(&fx, fx.carol, "snake_case rules");
        let camel = post(&fx, fx.carol, "snakeXcase rules");

        let search = |text: &str| {
            fx.service
                .get_feed(
                    fx.admin,
                    FeedFilter {
                        search: Some(text.into()),
                        ..FeedFilter::default()
                    },
                )
                .unwrap()
                .into_iter()
                .map(|p| p.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(search("50%"), vec![sale]);
        assert_eq!(search("%"), vec![sale]);
        assert!(!search("snake_case").contains(&camel));
        assert_eq!(search("snake_case").len(), 1);
    }
}
