//! Subject resolution: verified `sub` claim → user (+ roles).

use std::sync::Arc;

use tokio::sync::OnceCell;

use warden_core::{Role, RoleId, StoreResult, User, UserId};

use crate::error::AuthError;
use crate::store::UserDirectory;

/// The user a token speaks for.
///
/// Roles are loaded lazily, at most once; a `Subject` lives for one request,
/// so the cache never outlives it.
#[derive(Debug)]
pub struct Subject {
    user: User,
    roles: OnceCell<Vec<Role>>,
}

impl Subject {
    pub fn new(user: User) -> Self {
        Self {
            user,
            roles: OnceCell::new(),
        }
    }

    /// A subject whose roles are already known (e.g. loaded at login).
    pub fn with_roles(user: User, roles: Vec<Role>) -> Self {
        Self {
            user,
            roles: OnceCell::new_with(Some(roles)),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn id(&self) -> UserId {
        self.user.id
    }

    /// Roles if they have been loaded already.
    pub fn loaded_roles(&self) -> Option<&[Role]> {
        self.roles.get().map(Vec::as_slice)
    }
}

/// Maps a verified subject claim to a live user record.
#[derive(Clone)]
pub struct SubjectResolver {
    directory: Arc<dyn UserDirectory>,
}

impl SubjectResolver {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve the subject claim.
    ///
    /// Every failure (missing/non-numeric subject, unknown or soft-deleted
    /// user, storage error) is `InvalidToken`; callers cannot tell which.
    pub async fn resolve(&self, subject: Option<&str>) -> Result<Subject, AuthError> {
        let Some(raw) = subject else {
            tracing::debug!("token carries no subject");
            return Err(AuthError::InvalidToken);
        };
        let id: UserId = raw.parse().map_err(|e| {
            tracing::debug!(error = %e, "subject is not a user id");
            AuthError::InvalidToken
        })?;

        match self.directory.find_user(id).await {
            Ok(Some(user)) if !user.is_deleted() => Ok(Subject::new(user)),
            Ok(Some(_)) => {
                tracing::debug!(user_id = %id, "subject is soft-deleted");
                Err(AuthError::InvalidToken)
            }
            Ok(None) => {
                tracing::debug!(user_id = %id, "subject not found");
                Err(AuthError::InvalidToken)
            }
            Err(e) => {
                tracing::warn!(user_id = %id, error = %e, "subject lookup failed");
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// The subject's roles, loading them on first use.
    pub async fn roles<'s>(&self, subject: &'s Subject) -> StoreResult<&'s [Role]> {
        let roles = subject
            .roles
            .get_or_try_init(|| self.directory.roles_of(subject.id()))
            .await?;
        Ok(roles.as_slice())
    }

    pub async fn role_ids(&self, subject: &Subject) -> StoreResult<Vec<RoleId>> {
        Ok(self.roles(subject).await?.iter().map(|r| r.id).collect())
    }
}
