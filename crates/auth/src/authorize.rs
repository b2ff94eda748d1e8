use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use warden_core::RoleId;

use crate::error::AuthError;
use crate::operation::{self, Operation};
use crate::store::GrantStore;

/// Operations that need no token at all.
///
/// Login and token refresh are always members, whatever the configuration
/// says, so a deployment can never lock itself out of re-authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicOperations(BTreeSet<Operation>);

impl PublicOperations {
    pub fn new(configured: impl IntoIterator<Item = Operation>) -> Self {
        let mut set: BTreeSet<Operation> = configured.into_iter().collect();
        set.insert(operation::LOGIN);
        set.insert(operation::REFRESH_ACCESS_TOKEN);
        Self(set)
    }

    /// Parse a comma-separated allowlist; entries are trimmed, empties ignored.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| Operation::new(name.to_string())),
        )
    }

    pub fn contains(&self, operation: &Operation) -> bool {
        self.0.contains(operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.0.iter()
    }
}

impl Default for PublicOperations {
    fn default() -> Self {
        Self::new([])
    }
}

/// Binary RBAC decision: does any of the roles hold `auth:<operation>`?
///
/// Nothing is cached between calls; a grant change is visible on the next
/// request.
#[derive(Clone)]
pub struct AuthorizationEvaluator {
    grants: Arc<dyn GrantStore>,
}

impl AuthorizationEvaluator {
    pub fn new(grants: Arc<dyn GrantStore>) -> Self {
        Self { grants }
    }

    /// Exact, case-sensitive match; no wildcards or hierarchy.
    pub async fn allowed(&self, roles: &[RoleId], operation: &Operation) -> Result<bool, AuthError> {
        if roles.is_empty() {
            return Ok(false);
        }
        let permission = operation.permission_name();
        self.grants
            .holds_permission(roles, &permission)
            .await
            .map_err(|e| {
                tracing::error!(%operation, error = %e, "grant lookup failed");
                AuthError::Storage(e)
            })
    }

    /// Like [`allowed`](Self::allowed), but a denial is `AccessDenied`.
    pub async fn authorize(&self, roles: &[RoleId], operation: &Operation) -> Result<(), AuthError> {
        if self.allowed(roles, operation).await? {
            Ok(())
        } else {
            tracing::debug!(%operation, ?roles, "access denied");
            Err(AuthError::AccessDenied(operation.to_string()))
        }
    }

    /// Decision plus the inputs it was made from, for "can I ...?" queries.
    pub async fn explain(&self, roles: &[RoleId], operation: &Operation) -> Result<AuthorizationExplanation, AuthError> {
        let granted = self.allowed(roles, operation).await?;
        let reason = match (granted, roles.is_empty()) {
            (true, _) => "a role holds the required permission".to_string(),
            (false, true) => "no roles assigned".to_string(),
            (false, false) => "no role holds the required permission".to_string(),
        };
        Ok(AuthorizationExplanation {
            operation: operation.clone(),
            required_permission: operation.permission_name(),
            granted,
            roles: roles.to_vec(),
            reason,
        })
    }
}

/// Why an authorization decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub operation: Operation,
    pub required_permission: String,
    pub granted: bool,
    pub roles: Vec<RoleId>,
    pub reason: String,
}
