//! Caller identity: role tiers, signed session credentials and the resolver
//! that turns a credential into an authenticated, un-banned [`Caller`].

use crate::config::SessionConfig;
use crate::database::models::UserRecord;
use crate::database::repositories::UserRepository;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::utils::{format_time_left, unix_now};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use serde::{Deserialize, Serialize};

const CREDENTIAL_KEY_CONTEXT: &str = "yapper_backend 2024 session credential mac";

/// Ordered trust tier. `Elevated` carries its numeric level (2 or more) so
/// that elevated users can still be ranked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Role {
    Standard,
    VerifiedTrack,
    Elevated(u8),
}

impl Role {
    pub const ADMIN: Role = Role::Elevated(2);

    pub fn level(&self) -> i64 {
        match self {
            Role::Standard => 0,
            Role::VerifiedTrack => 1,
            Role::Elevated(level) => i64::from(*level),
        }
    }

    /// Negative levels collapse to `Standard`, oversized ones saturate.
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => Role::Standard,
            1 => Role::VerifiedTrack,
            other => Role::Elevated(u8::try_from(other).unwrap_or(u8::MAX)),
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Elevated(_))
    }
}

impl From<i64> for Role {
    fn from(level: i64) -> Self {
        Role::from_level(level)
    }
}

impl From<Role> for i64 {
    fn from(role: Role) -> Self {
        role.level()
    }
}

/// Claims carried inside a session credential. Only `sub` and the validity
/// window are trusted; the role is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,
    pub role: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies `base64url(claims).base64url(mac)` credentials.
#[derive(Clone)]
pub struct SessionSigner {
    key: [u8; 32],
    ttl_secs: i64,
}

impl SessionSigner {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            key: blake3::derive_key(CREDENTIAL_KEY_CONTEXT, config.secret.as_bytes()),
            ttl_secs: config.ttl_secs.max(1),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn issue(&self, user: &UserRecord) -> CoreResult<String> {
        self.issue_at(user.id, user.role, unix_now())
    }

    pub fn issue_at(&self, user_id: i64, role: Role, issued_at: i64) -> CoreResult<String> {
        let claims = SessionClaims {
            sub: user_id,
            role: role.level(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.ttl_secs),
        };
        let payload = serde_json::to_vec(&claims).map_err(|err| CoreError::Internal(err.into()))?;
        let encoded = BASE64_URL.encode(payload);
        let mac = blake3::keyed_hash(&self.key, encoded.as_bytes());
        Ok(format!("{encoded}.{}", BASE64_URL.encode(mac.as_bytes())))
    }

    pub fn verify(&self, token: &str, now: i64) -> CoreResult<SessionClaims> {
        let (encoded, signature) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| CoreError::Unauthorized("Malformed session token.".into()))?;

        let provided: [u8; 32] = BASE64_URL
            .decode(signature)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| CoreError::Unauthorized("Malformed session token.".into()))?;
        let expected = blake3::keyed_hash(&self.key, encoded.as_bytes());
        // blake3::Hash equality is constant time.
        if expected != blake3::Hash::from(provided) {
            return Err(CoreError::Unauthorized("Invalid session token.".into()));
        }

        let claims: SessionClaims = BASE64_URL
            .decode(encoded)
            .ok()
            .and_then(|payload| serde_json::from_slice(&payload).ok())
            .ok_or_else(|| CoreError::Unauthorized("Malformed session token.".into()))?;
        if claims.exp <= now {
            return Err(CoreError::Unauthorized("Session expired, please log in again.".into()));
        }
        Ok(claims)
    }
}

/// An authenticated caller whose role and ban state were read from the store.
#[derive(Debug, Clone, Serialize)]
pub struct Caller {
    pub id: i64,
    pub handle: String,
    pub role: Role,
    pub verified: bool,
}

impl From<&UserRecord> for Caller {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            handle: user.handle.clone(),
            role: user.role,
            verified: user.verified,
        }
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    database: Database,
    signer: SessionSigner,
}

impl IdentityResolver {
    pub fn new(database: Database, signer: SessionSigner) -> Self {
        Self { database, signer }
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.signer
    }

    pub fn resolve(&self, token: &str) -> CoreResult<Caller> {
        let now = unix_now();
        let claims = self.signer.verify(token, now)?;
        self.resolve_user(claims.sub, now)
    }

    /// Loads the user and applies the ban gate. An expired ban is cleared on
    /// the way through.
    pub fn resolve_user(&self, user_id: i64, now: i64) -> CoreResult<Caller> {
        let user = self
            .database
            .with_repositories(|repos| repos.users().get(user_id))?
            .ok_or_else(|| CoreError::Unauthorized("Unknown session user.".into()))?;

        if let Some((until, reason)) = user.active_ban(now) {
            let remaining_secs = until - now;
            return Err(CoreError::Banned {
                remaining: format_time_left(remaining_secs),
                remaining_secs,
                reason: reason.to_string(),
            });
        }

        if user.has_expired_ban(now) {
            self.database
                .with_transaction(|repos| repos.users().clear_ban(user.id))?;
            tracing::info!(user_id = user.id, "expired ban cleared");
        }

        Ok(Caller::from(&user))
    }
}
