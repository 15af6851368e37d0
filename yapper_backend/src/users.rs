use crate::database::models::{NewUser, UserRecord};
use crate::database::repositories::{BlockRepository, FollowRepository, UserRepository};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::identity::Role;
use serde::Serialize;

const MIN_HANDLE_CHARS: usize = 3;
const MAX_HANDLE_CHARS: usize = 30;

fn validate_handle(raw: &str) -> CoreResult<String> {
    let handle = raw.trim();
    let length = handle.chars().count();
    if !(MIN_HANDLE_CHARS..=MAX_HANDLE_CHARS).contains(&length) {
        return Err(CoreError::validation(
            "Username must be between 3 and 30 characters.",
        ));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(CoreError::validation(
            "Username may only contain letters, digits, `_` and `.`.",
        ));
    }
    Ok(handle.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: i64,
    pub handle: String,
    pub role: Role,
    pub verified: bool,
    pub followers: i64,
    pub following: i64,
    pub created_at: String,
    /// Whether the viewer follows this account.
    pub followed: bool,
    /// Whether the viewer has blocked this account.
    pub blocked: bool,
}

/// Account provisioning and profile lookup. Credentials live elsewhere; a
/// user row is just a handle and a role tier.
#[derive(Clone)]
pub struct UserService {
    database: Database,
}

impl UserService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn create_user(&self, handle: &str, role: Role) -> CoreResult<UserRecord> {
        let handle = validate_handle(handle)?;
        let user = self.database.with_transaction(|repos| {
            let users = repos.users();
            if users.get_by_handle(&handle)?.is_some() {
                return Err(CoreError::Conflict("Username is already taken.".into()));
            }
            let id = users.create(&NewUser { handle, role })?;
            users
                .get(id)?
                .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("user {id} vanished after insert")))
        })?;
        tracing::info!(user_id = user.id, handle = %user.handle, role = user.role.level(), "user created");
        Ok(user)
    }

    pub fn get(&self, user_id: i64) -> CoreResult<UserRecord> {
        self.database
            .with_repositories(|repos| repos.users().get(user_id))?
            .ok_or_else(|| CoreError::not_found("User not found."))
    }

    pub fn get_by_handle(&self, handle: &str) -> CoreResult<UserRecord> {
        self.database
            .with_repositories(|repos| repos.users().get_by_handle(handle))?
            .ok_or_else(|| CoreError::not_found("User not found."))
    }

    pub fn profile(&self, viewer_id: i64, handle: &str) -> CoreResult<ProfileView> {
        self.database.with_repositories(|repos| {
            let user = repos
                .users()
                .get_by_handle(handle)?
                .ok_or_else(|| CoreError::not_found("User not found."))?;
            let followed = repos.follows().exists(viewer_id, user.id)?;
            let blocked = repos.blocks().exists(viewer_id, user.id)?;
            Ok(ProfileView {
                id: user.id,
                handle: user.handle,
                role: user.role,
                verified: user.verified,
                followers: user.followers,
                following: user.following,
                created_at: user.created_at,
                followed,
                blocked,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationshipService;

    fn setup_service() -> (UserService, Database) {
        let database = Database::open_in_memory().expect("db");
        (UserService::new(database.clone()), database)
    }

    #[test]
    fn handles_are_validated_and_unique() {
        let (service, _) = setup_service();
        let created = service.create_user("  Alice_1 ", Role::Standard).unwrap();
        assert_eq!(created.handle, "Alice_1");
        assert!(matches!(
            service.create_user("alice_1", Role::Standard),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            service.create_user("al", Role::Standard),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            service.create_user("bad handle", Role::Standard),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn profile_reports_viewer_relation() {
        let (service, database) = setup_service();
        let viewer = service.create_user("viewer", Role::Standard).unwrap();
        let star = service.create_user("star", Role::ADMIN).unwrap();
        RelationshipService::new(database)
            .toggle_follow(viewer.id, star.id)
            .unwrap();

        let profile = service.profile(viewer.id, "STAR").unwrap();
        assert!(profile.followed);
        assert!(!profile.blocked);
        assert_eq!(profile.followers, 1);
        assert_eq!(profile.role, Role::ADMIN);
        assert!(matches!(
            service.profile(viewer.id, "nobody"),
            Err(CoreError::NotFound(_))
        ));
    }
}
