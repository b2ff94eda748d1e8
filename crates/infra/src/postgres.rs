//! Postgres-backed storage ports.
//!
//! One `PgStore` implements every port over a shared connection pool. Jtis
//! are stored in `UUID` columns (16 bytes). Multi-row writes (revocation
//! pairs, bootstrap) run in a single transaction so a failure never leaves a
//! partial write behind.
//!
//! ## Thread Safety
//!
//! `PgStore` is `Send + Sync`; the SQLx pool handles connection sharing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use warden_auth::store::{
    BlacklistColumn, BootstrapStore, GrantStore, NewPersonalToken, PersonalTokenRecord,
    PersonalTokenStore, RevocationRecord, RevocationStore, UserDirectory,
};
use warden_core::{
    Attributes, PermissionId, PersonalTokenId, Role, RoleId, StoreError, StoreResult, TokenId,
    User, UserId,
};

use crate::error::{is_unique_violation, map_sqlx_error};

const SCHEMA: &str = include_str!("../migrations/0001_authorization.sql");

const ROOT_NAME: &str = "root";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect a pool of at most `max_connections`.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create any missing tables. Safe to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, password_hash, attributes, deleted_at, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(db_user_id(id)?)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, password_hash, attributes, deleted_at, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_username", e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn roles_of(&self, id: UserId) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name, r.description
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id ASC
            "#,
        )
        .bind(db_user_id(id)?)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("roles_of", e))?;

        rows.iter().map(role_from_row).collect()
    }
}

#[async_trait]
impl GrantStore for PgStore {
    #[instrument(skip(self), err)]
    async fn holds_permission(&self, roles: &[RoleId], permission: &str) -> StoreResult<bool> {
        let role_ids = roles
            .iter()
            .map(|r| db_role_id(*r))
            .collect::<StoreResult<Vec<i32>>>()?;

        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM role_permissions rp
                JOIN permissions p ON p.id = rp.permission_id
                WHERE rp.role_id = ANY($1) AND p.name = $2
            )
            "#,
        )
        .bind(role_ids)
        .bind(permission)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("holds_permission", e))
    }
}

#[async_trait]
impl RevocationStore for PgStore {
    #[instrument(skip(self), fields(jti = %jti), err)]
    async fn is_blacklisted(&self, column: BlacklistColumn, jti: TokenId) -> StoreResult<bool> {
        let sql = match column {
            BlacklistColumn::AccessToken => {
                "SELECT EXISTS (SELECT 1 FROM access_tokens WHERE access_token_id = $1)"
            }
            BlacklistColumn::RefreshToken => {
                "SELECT EXISTS (SELECT 1 FROM access_tokens WHERE refresh_token_id = $1)"
            }
        };
        sqlx::query_scalar::<_, bool>(sql)
            .bind(jti.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_blacklisted", e))
    }

    #[instrument(
        skip(self, record),
        fields(
            user_id = %record.user_id,
            access_jti = %record.access_token_id,
            refresh_jti = %record.refresh_token_id
        ),
        err
    )]
    async fn blacklist(&self, record: RevocationRecord) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Both UNIQUE constraints are checked by the single insert; a
        // violation rolls the whole pair back when `tx` drops.
        sqlx::query(
            r#"
            INSERT INTO access_tokens (user_id, access_token_id, refresh_token_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(db_user_id(record.user_id)?)
        .bind(record.access_token_id.as_uuid())
        .bind(record.refresh_token_id.as_uuid())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("blacklist", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

#[async_trait]
impl PersonalTokenStore for PgStore {
    #[instrument(skip(self), fields(jti = %jti), err)]
    async fn is_whitelisted(&self, jti: TokenId) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM personal_tokens WHERE token_id = $1)")
            .bind(jti.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_whitelisted", e))
    }

    #[instrument(skip(self, token), fields(user_id = %token.user_id, jti = %token.token_id), err)]
    async fn insert(&self, token: NewPersonalToken) -> StoreResult<PersonalTokenRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO personal_tokens (user_id, description, token_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, description, token_id, created_at
            "#,
        )
        .bind(db_user_id(token.user_id)?)
        .bind(&token.description)
        .bind(token.token_id.as_uuid())
        .bind(token.created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_personal_token", e))?;

        personal_token_from_row(&row)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list(&self, user_id: UserId) -> StoreResult<Vec<PersonalTokenRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, description, token_id, created_at
            FROM personal_tokens
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(db_user_id(user_id)?)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_personal_tokens", e))?;

        rows.iter().map(personal_token_from_row).collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id, id = %id), err)]
    async fn delete(&self, user_id: UserId, id: PersonalTokenId) -> StoreResult<bool> {
        let Ok(raw_id) = i64::try_from(id.get()) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM personal_tokens WHERE id = $1 AND user_id = $2")
            .bind(raw_id)
            .bind(db_user_id(user_id)?)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_personal_token", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BootstrapStore for PgStore {
    #[instrument(skip(self, names), fields(count = names.len()), err)]
    async fn ensure_permissions(&self, names: &[String]) -> StoreResult<Vec<PermissionId>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO permissions (name)
            SELECT unnest($1::text[])
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(names)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_permissions", e))?;

        let ids = sqlx::query_scalar::<_, i32>("SELECT id FROM permissions ORDER BY id ASC")
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ensure_permissions", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        ids.into_iter().map(permission_id).collect()
    }

    #[instrument(skip(self), err)]
    async fn ensure_root_role(&self) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description)
            VALUES ($1, $2, 'Holds every permission')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(db_role_id(RoleId::ROOT)?)
        .bind(ROOT_NAME)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_root_role", e))?;

        // The explicit id bypassed the sequence.
        sqlx::query("SELECT setval(pg_get_serial_sequence('roles', 'id'), GREATEST((SELECT MAX(id) FROM roles), 1))")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ensure_root_role", e))?;

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, id FROM permissions
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(db_role_id(RoleId::ROOT)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_root_role", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self, password_hash), err)]
    async fn ensure_root_user(&self, password_hash: &str) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let root_id = db_user_id(UserId::ROOT)?;

        let existing = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1 FOR UPDATE")
            .bind(root_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ensure_root_user", e))?;

        match existing.as_deref() {
            Some(ROOT_NAME) => {}
            Some(_) => return Err(StoreError::conflict("user 1 exists but is not the root user")),
            None => {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO users (id, username, password_hash)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(root_id)
                .bind(ROOT_NAME)
                .bind(password_hash)
                .execute(&mut *tx)
                .await;
                if let Err(e) = inserted {
                    if is_unique_violation(&e) {
                        return Err(StoreError::conflict("username 'root' taken by a non-root user"));
                    }
                    return Err(map_sqlx_error("ensure_root_user", e));
                }
                sqlx::query("SELECT setval(pg_get_serial_sequence('users', 'id'), GREATEST((SELECT MAX(id) FROM users), 1))")
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("ensure_root_user", e))?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(root_id)
        .bind(db_role_id(RoleId::ROOT)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_root_user", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let attributes: serde_json::Value = get(row, "attributes")?;
    let attributes: Attributes = serde_json::from_value(attributes)
        .map_err(|e| StoreError::invalid_record(format!("users.attributes is not an object: {e}")))?;
    let deleted_at: Option<DateTime<Utc>> = get(row, "deleted_at")?;

    Ok(User {
        id: user_id(get(row, "id")?)?,
        username: get(row, "username")?,
        email: get(row, "email")?,
        password_hash: get(row, "password_hash")?,
        attributes,
        deleted_at,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn role_from_row(row: &PgRow) -> StoreResult<Role> {
    let raw: i32 = get(row, "id")?;
    let id = u32::try_from(raw)
        .ok()
        .filter(|v| *v > 0)
        .map(RoleId::new)
        .ok_or_else(|| StoreError::invalid_record(format!("role id {raw} out of range")))?;
    Ok(Role {
        id,
        name: get(row, "name")?,
        description: get(row, "description")?,
    })
}

fn personal_token_from_row(row: &PgRow) -> StoreResult<PersonalTokenRecord> {
    let raw: i64 = get(row, "id")?;
    let id = u64::try_from(raw)
        .ok()
        .filter(|v| *v > 0)
        .map(PersonalTokenId::new)
        .ok_or_else(|| StoreError::invalid_record(format!("personal token id {raw} out of range")))?;
    let token_id: Uuid = get(row, "token_id")?;
    Ok(PersonalTokenRecord {
        id,
        user_id: user_id(get(row, "user_id")?)?,
        description: get(row, "description")?,
        token_id: TokenId::from_uuid(token_id),
        created_at: get(row, "created_at")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| map_sqlx_error(column, e))
}

fn db_user_id(id: UserId) -> StoreResult<i64> {
    i64::try_from(id.get()).map_err(|_| StoreError::invalid_record(format!("user id {id} out of range")))
}

fn user_id(raw: i64) -> StoreResult<UserId> {
    u64::try_from(raw)
        .ok()
        .filter(|v| *v > 0)
        .map(UserId::new)
        .ok_or_else(|| StoreError::invalid_record(format!("user id {raw} out of range")))
}

fn db_role_id(id: RoleId) -> StoreResult<i32> {
    i32::try_from(id.get()).map_err(|_| StoreError::invalid_record(format!("role id {id} out of range")))
}

fn permission_id(raw: i32) -> StoreResult<PermissionId> {
    u32::try_from(raw)
        .ok()
        .filter(|v| *v > 0)
        .map(PermissionId::new)
        .ok_or_else(|| StoreError::invalid_record(format!("permission id {raw} out of range")))
}
