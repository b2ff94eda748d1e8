//! `warden-core` — identifiers, read-only rows and shared errors.
//!
//! This crate contains no infrastructure concerns.

pub mod error;
pub mod id;
pub mod model;

pub use error::{DomainError, StoreError, StoreResult};
pub use id::{PermissionId, PersonalTokenId, RoleId, TokenId, UserId};
pub use model::{Attributes, Permission, Role, User};
