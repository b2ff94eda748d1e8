//! Read-only rows the authorization core consumes.
//!
//! Users, roles and permissions are administered elsewhere; the core only
//! looks them up (and seeds the root rows once at startup).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{PermissionId, RoleId, UserId};

/// Free-form user attributes (department, clearance level, ...).
///
/// Values are kept as JSON so integer attributes survive a token round trip
/// without passing through floating point.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique and immutable.
    pub username: String,
    pub email: Option<String>,
    /// PHC-formatted password hash. Never serialized into responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A named bundle of permission grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
}

/// A namespaced permission (`auth:<Operation>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
}
