//! Startup seeding: permission catalog, root role, root user.

use tracing::instrument;

use crate::error::AuthError;
use crate::operation::Operation;
use crate::password::{Argon2Passwords, UNUSABLE_PASSWORD_HASH};
use crate::store::BootstrapStore;

/// Password hash for a newly created root user. Without a configured
/// password the root account cannot log in until an operator sets one.
pub fn root_password_hash(passwords: &Argon2Passwords, password: Option<&str>) -> Result<String, AuthError> {
    match password {
        Some(password) if !password.is_empty() => passwords.hash(password),
        _ => {
            tracing::warn!("no root password configured; root login disabled");
            Ok(UNUSABLE_PASSWORD_HASH.to_string())
        }
    }
}

/// Idempotent: rerunning creates nothing new and never touches an existing
/// root user's password.
#[instrument(skip_all, fields(operations = catalog.len()), err)]
pub async fn seed(store: &dyn BootstrapStore, catalog: &[Operation], root_password_hash: &str) -> Result<(), AuthError> {
    let names: Vec<String> = catalog.iter().map(Operation::permission_name).collect();
    let permissions = store.ensure_permissions(&names).await?;
    store.ensure_root_role().await?;
    store.ensure_root_user(root_password_hash).await?;
    tracing::info!(permissions = permissions.len(), "authorization catalog seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_core::{RoleId, UserId};

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::operation::CATALOG;
    use crate::password::PasswordVerifier;
    use crate::store::UserDirectory;

    #[tokio::test]
    async fn root_role_holds_the_whole_catalog() {
        let store = Arc::new(InMemoryStore::new());
        seed(store.as_ref(), CATALOG, UNUSABLE_PASSWORD_HASH).await.unwrap();

        let mut granted = store.permission_names_of(RoleId::ROOT).unwrap();
        granted.sort();
        let mut expected: Vec<String> = CATALOG.iter().map(Operation::permission_name).collect();
        expected.sort();
        assert_eq!(granted, expected);

        let root = store.find_user(UserId::ROOT).await.unwrap().unwrap();
        assert_eq!(root.username, "root");
        let roles = store.roles_of(UserId::ROOT).await.unwrap();
        assert_eq!(roles.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RoleId::ROOT]);
    }

    #[tokio::test]
    async fn reseeding_keeps_rows_and_password() {
        let store = Arc::new(InMemoryStore::new());
        let passwords = Argon2Passwords::new();
        let first = root_password_hash(&passwords, Some("s3cret")).unwrap();
        seed(store.as_ref(), CATALOG, &first).await.unwrap();

        let second = root_password_hash(&passwords, Some("other")).unwrap();
        seed(store.as_ref(), CATALOG, &second).await.unwrap();

        let root = store.find_user(UserId::ROOT).await.unwrap().unwrap();
        assert!(passwords.verify("s3cret", &root.password_hash));
        assert_eq!(store.permission_names_of(RoleId::ROOT).unwrap().len(), CATALOG.len());
    }

    #[test]
    fn missing_password_yields_an_unusable_hash() {
        let passwords = Argon2Passwords::new();
        assert_eq!(root_password_hash(&passwords, None).unwrap(), UNUSABLE_PASSWORD_HASH);
        assert_eq!(root_password_hash(&passwords, Some("")).unwrap(), UNUSABLE_PASSWORD_HASH);
    }
}
