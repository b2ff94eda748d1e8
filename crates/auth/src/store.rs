//! Storage ports consumed by the authorization core.
//!
//! Implementations: `crate::memory::InMemoryStore` (dev/tests) and the
//! Postgres adapters in `warden-infra`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use warden_core::{PermissionId, PersonalTokenId, Role, RoleId, StoreResult, TokenId, User, UserId};

/// Which blacklist column a session token is looked up by.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlacklistColumn {
    AccessToken,
    RefreshToken,
}

/// A revoked session: the access/refresh jti pair issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationRecord {
    pub user_id: UserId,
    pub access_token_id: TokenId,
    pub refresh_token_id: TokenId,
    pub created_at: DateTime<Utc>,
}

/// Whitelist row that keeps a personal token alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalTokenRecord {
    pub id: PersonalTokenId,
    pub user_id: UserId,
    pub description: String,
    pub token_id: TokenId,
    pub created_at: DateTime<Utc>,
}

/// Whitelist row before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPersonalToken {
    pub user_id: UserId,
    pub description: String,
    pub token_id: TokenId,
    pub created_at: DateTime<Utc>,
}

/// User and role lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Roles assigned to the user (ids and names).
    async fn roles_of(&self, id: UserId) -> StoreResult<Vec<Role>>;
}

/// Role → permission grant lookups.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Whether any of `roles` has a direct grant of the exact `permission` name.
    async fn holds_permission(&self, roles: &[RoleId], permission: &str) -> StoreResult<bool>;
}

/// Blacklist of revoked session (access/refresh) tokens.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn is_blacklisted(&self, column: BlacklistColumn, jti: TokenId) -> StoreResult<bool>;

    /// Insert both jtis atomically.
    ///
    /// A jti already present in its column yields `StoreError::Conflict` and
    /// leaves the table unchanged.
    async fn blacklist(&self, record: RevocationRecord) -> StoreResult<()>;
}

/// Whitelist of live personal tokens.
#[async_trait]
pub trait PersonalTokenStore: Send + Sync {
    async fn is_whitelisted(&self, jti: TokenId) -> StoreResult<bool>;

    async fn insert(&self, token: NewPersonalToken) -> StoreResult<PersonalTokenRecord>;

    async fn list(&self, user_id: UserId) -> StoreResult<Vec<PersonalTokenRecord>>;

    /// Delete the owner's row. Returns `false` when no such row belongs to the user.
    async fn delete(&self, user_id: UserId, id: PersonalTokenId) -> StoreResult<bool>;
}

/// One-time seeding of the permission catalog and the root role/user.
#[async_trait]
pub trait BootstrapStore: Send + Sync {
    /// Insert any missing permissions; returns the ids of every permission row.
    async fn ensure_permissions(&self, names: &[String]) -> StoreResult<Vec<PermissionId>>;

    /// Ensure role 1 exists and holds every permission currently known.
    async fn ensure_root_role(&self) -> StoreResult<()>;

    /// Ensure user 1 exists and holds role 1. An existing root user keeps its
    /// password.
    async fn ensure_root_user(&self, password_hash: &str) -> StoreResult<()>;
}
