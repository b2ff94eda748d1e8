use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Prefix shared by every permission derived from an operation.
pub const PERMISSION_NAMESPACE: &str = "auth:";

/// A named protected action.
///
/// Operations map 1:1 onto permission names (`"auth:" + name`). Names are
/// opaque and case-sensitive; there is no wildcard or hierarchy matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(Cow<'static, str>);

impl Operation {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The permission a role must hold to perform this operation.
    pub fn permission_name(&self) -> String {
        format!("{PERMISSION_NAMESPACE}{}", self.0)
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Operation {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

pub const LOGIN: Operation = Operation::from_static("Login");
pub const REFRESH_ACCESS_TOKEN: Operation = Operation::from_static("RefreshAccessToken");
pub const LOGOUT: Operation = Operation::from_static("Logout");
pub const WHO_AM_I: Operation = Operation::from_static("WhoAmI");
pub const CHECK_PERMISSION: Operation = Operation::from_static("CheckPermission");

pub const CREATE_USER: Operation = Operation::from_static("CreateUser");
pub const READ_USER: Operation = Operation::from_static("ReadUser");
pub const LIST_USERS: Operation = Operation::from_static("ListUsers");
pub const UPDATE_USER: Operation = Operation::from_static("UpdateUser");
pub const DELETE_USER: Operation = Operation::from_static("DeleteUser");

pub const CREATE_ROLE: Operation = Operation::from_static("CreateRole");
pub const READ_ROLE: Operation = Operation::from_static("ReadRole");
pub const LIST_ROLES: Operation = Operation::from_static("ListRoles");
pub const UPDATE_ROLE: Operation = Operation::from_static("UpdateRole");
pub const DELETE_ROLE: Operation = Operation::from_static("DeleteRole");
pub const ASSIGN_ROLE: Operation = Operation::from_static("AssignRole");
pub const UNASSIGN_ROLE: Operation = Operation::from_static("UnassignRole");

pub const READ_PERMISSION: Operation = Operation::from_static("ReadPermission");
pub const LIST_PERMISSIONS: Operation = Operation::from_static("ListPermissions");
pub const GRANT_PERMISSION: Operation = Operation::from_static("GrantPermission");
pub const REVOKE_PERMISSION: Operation = Operation::from_static("RevokePermission");

pub const CREATE_PERSONAL_TOKEN: Operation = Operation::from_static("CreatePersonalToken");
pub const LIST_PERSONAL_TOKENS: Operation = Operation::from_static("ListPersonalTokens");
pub const DELETE_PERSONAL_TOKEN: Operation = Operation::from_static("DeletePersonalToken");

/// The fixed catalog seeded into the permission table at startup.
pub const CATALOG: &[Operation] = &[
    LOGIN,
    REFRESH_ACCESS_TOKEN,
    LOGOUT,
    WHO_AM_I,
    CHECK_PERMISSION,
    CREATE_USER,
    READ_USER,
    LIST_USERS,
    UPDATE_USER,
    DELETE_USER,
    CREATE_ROLE,
    READ_ROLE,
    LIST_ROLES,
    UPDATE_ROLE,
    DELETE_ROLE,
    ASSIGN_ROLE,
    UNASSIGN_ROLE,
    READ_PERMISSION,
    LIST_PERMISSIONS,
    GRANT_PERMISSION,
    REVOKE_PERMISSION,
    CREATE_PERSONAL_TOKEN,
    LIST_PERSONAL_TOKENS,
    DELETE_PERSONAL_TOKEN,
];
