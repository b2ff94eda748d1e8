//! In-memory implementation of every storage port, for tests/dev.
//!
//! All tables live behind one lock so multi-row writes (revocation pairs,
//! bootstrap) are atomic, mirroring a transaction in the Postgres adapter.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use warden_core::{
    Attributes, Permission, PermissionId, PersonalTokenId, Role, RoleId, StoreError, StoreResult,
    TokenId, User, UserId,
};

use crate::store::{
    BlacklistColumn, BootstrapStore, GrantStore, NewPersonalToken, PersonalTokenRecord,
    PersonalTokenStore, RevocationRecord, RevocationStore, UserDirectory,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    user_roles: BTreeSet<(UserId, RoleId)>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
    revocations: Vec<RevocationRecord>,
    revoked_access: HashSet<TokenId>,
    revoked_refresh: HashSet<TokenId>,
    personal_tokens: BTreeMap<PersonalTokenId, PersonalTokenRecord>,
    next_user: u64,
    next_role: u32,
    next_permission: u32,
    next_personal_token: u64,
}

impl Tables {
    fn permission_id(&self, name: &str) -> Option<PermissionId> {
        self.permissions
            .values()
            .find(|p| p.name == name)
            .map(|p| p.id)
    }
}

/// In-memory store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a storage outage: every port call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store is offline"));
        }
        self.tables
            .read()
            .map_err(|_| StoreError::unavailable("in-memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store is offline"));
        }
        self.tables
            .write()
            .map_err(|_| StoreError::unavailable("in-memory store lock poisoned"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration (user/role CRUD lives outside the core; these helpers
    // stand in for it in dev mode and tests)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        attributes: Attributes,
    ) -> StoreResult<User> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.username == username) {
            return Err(StoreError::conflict(format!("username '{username}' already exists")));
        }
        let id = loop {
            tables.next_user += 1;
            let candidate = UserId::new(tables.next_user);
            if !tables.users.contains_key(&candidate) {
                break candidate;
            }
        };
        let now = Utc::now();
        let user = User {
            id,
            username: username.to_string(),
            email: None,
            password_hash: password_hash.to_string(),
            attributes,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    pub fn soft_delete_user(&self, id: UserId) -> StoreResult<()> {
        let mut tables = self.write()?;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }

    pub fn create_role(&self, name: &str) -> StoreResult<Role> {
        let mut tables = self.write()?;
        if tables.roles.values().any(|r| r.name == name) {
            return Err(StoreError::conflict(format!("role '{name}' already exists")));
        }
        let id = loop {
            tables.next_role += 1;
            let candidate = RoleId::new(tables.next_role);
            if !tables.roles.contains_key(&candidate) {
                break candidate;
            }
        };
        let role = Role {
            id,
            name: name.to_string(),
            description: None,
        };
        tables.roles.insert(id, role.clone());
        Ok(role)
    }

    pub fn assign_role(&self, user: UserId, role: RoleId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user) || !tables.roles.contains_key(&role) {
            return Err(StoreError::NotFound);
        }
        tables.user_roles.insert((user, role));
        Ok(())
    }

    /// Grant a permission by name, creating the permission row if needed.
    pub fn grant(&self, role: RoleId, permission: &str) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.roles.contains_key(&role) {
            return Err(StoreError::NotFound);
        }
        let id = match tables.permission_id(permission) {
            Some(id) => id,
            None => insert_permission(&mut tables, permission),
        };
        tables.role_permissions.insert((role, id));
        Ok(())
    }

    pub fn permission_names_of(&self, role: RoleId) -> StoreResult<Vec<String>> {
        let tables = self.read()?;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == role)
            .filter_map(|(_, p)| tables.permissions.get(p).map(|p| p.name.clone()))
            .collect())
    }

    pub fn revocations(&self) -> StoreResult<Vec<RevocationRecord>> {
        Ok(self.read()?.revocations.clone())
    }
}

fn insert_permission(tables: &mut Tables, name: &str) -> PermissionId {
    let id = loop {
        tables.next_permission += 1;
        let candidate = PermissionId::new(tables.next_permission);
        if !tables.permissions.contains_key(&candidate) {
            break candidate;
        }
    };
    tables.permissions.insert(
        id,
        Permission {
            id,
            name: name.to_string(),
            description: None,
        },
    );
    id
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn roles_of(&self, id: UserId) -> StoreResult<Vec<Role>> {
        let tables = self.read()?;
        Ok(tables
            .user_roles
            .iter()
            .filter(|(u, _)| *u == id)
            .filter_map(|(_, r)| tables.roles.get(r).cloned())
            .collect())
    }
}

#[async_trait]
impl GrantStore for InMemoryStore {
    async fn holds_permission(&self, roles: &[RoleId], permission: &str) -> StoreResult<bool> {
        let tables = self.read()?;
        let Some(permission) = tables.permission_id(permission) else {
            return Ok(false);
        };
        Ok(roles
            .iter()
            .any(|role| tables.role_permissions.contains(&(*role, permission))))
    }
}

#[async_trait]
impl RevocationStore for InMemoryStore {
    async fn is_blacklisted(&self, column: BlacklistColumn, jti: TokenId) -> StoreResult<bool> {
        let tables = self.read()?;
        Ok(match column {
            BlacklistColumn::AccessToken => tables.revoked_access.contains(&jti),
            BlacklistColumn::RefreshToken => tables.revoked_refresh.contains(&jti),
        })
    }

    async fn blacklist(&self, record: RevocationRecord) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.revoked_access.contains(&record.access_token_id) {
            return Err(StoreError::conflict("access token already revoked"));
        }
        if tables.revoked_refresh.contains(&record.refresh_token_id) {
            return Err(StoreError::conflict("refresh token already revoked"));
        }
        tables.revoked_access.insert(record.access_token_id);
        tables.revoked_refresh.insert(record.refresh_token_id);
        tables.revocations.push(record);
        Ok(())
    }
}

#[async_trait]
impl PersonalTokenStore for InMemoryStore {
    async fn is_whitelisted(&self, jti: TokenId) -> StoreResult<bool> {
        Ok(self
            .read()?
            .personal_tokens
            .values()
            .any(|t| t.token_id == jti))
    }

    async fn insert(&self, token: NewPersonalToken) -> StoreResult<PersonalTokenRecord> {
        let mut tables = self.write()?;
        if tables.personal_tokens.values().any(|t| t.token_id == token.token_id) {
            return Err(StoreError::conflict("personal token id already recorded"));
        }
        tables.next_personal_token += 1;
        let record = PersonalTokenRecord {
            id: PersonalTokenId::new(tables.next_personal_token),
            user_id: token.user_id,
            description: token.description,
            token_id: token.token_id,
            created_at: token.created_at,
        };
        tables.personal_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list(&self, user_id: UserId) -> StoreResult<Vec<PersonalTokenRecord>> {
        Ok(self
            .read()?
            .personal_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, user_id: UserId, id: PersonalTokenId) -> StoreResult<bool> {
        let mut tables = self.write()?;
        match tables.personal_tokens.get(&id) {
            Some(record) if record.user_id == user_id => {
                tables.personal_tokens.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl BootstrapStore for InMemoryStore {
    async fn ensure_permissions(&self, names: &[String]) -> StoreResult<Vec<PermissionId>> {
        let mut tables = self.write()?;
        for name in names {
            if tables.permission_id(name).is_none() {
                insert_permission(&mut tables, name);
            }
        }
        Ok(tables.permissions.keys().copied().collect())
    }

    async fn ensure_root_role(&self) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables.roles.entry(RoleId::ROOT).or_insert_with(|| Role {
            id: RoleId::ROOT,
            name: "root".to_string(),
            description: Some("Holds every permission".to_string()),
        });
        tables.next_role = tables.next_role.max(RoleId::ROOT.get());
        let all: Vec<PermissionId> = tables.permissions.keys().copied().collect();
        for permission in all {
            tables.role_permissions.insert((RoleId::ROOT, permission));
        }
        Ok(())
    }

    async fn ensure_root_user(&self, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.write()?;
        let existing = tables.users.get(&UserId::ROOT).map(|u| u.username.clone());
        match existing.as_deref() {
            Some("root") => {}
            Some(_) => {
                return Err(StoreError::conflict("user 1 exists but is not the root user"));
            }
            None => {
                if tables.users.values().any(|u| u.username == "root") {
                    return Err(StoreError::conflict("username 'root' taken by a non-root user"));
                }
                let now = Utc::now();
                tables.users.insert(
                    UserId::ROOT,
                    User {
                        id: UserId::ROOT,
                        username: "root".to_string(),
                        email: None,
                        password_hash: password_hash.to_string(),
                        attributes: Attributes::new(),
                        deleted_at: None,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        tables.next_user = tables.next_user.max(UserId::ROOT.get());
        if !tables.roles.contains_key(&RoleId::ROOT) {
            return Err(StoreError::invalid_record("root role missing"));
        }
        tables.user_roles.insert((UserId::ROOT, RoleId::ROOT));
        Ok(())
    }
}
