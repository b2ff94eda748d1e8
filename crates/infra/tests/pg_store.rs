#![cfg(feature = "pg-tests")]

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;

use warden_auth::operation::CATALOG;
use warden_auth::store::{
    BlacklistColumn, BootstrapStore, GrantStore, NewPersonalToken, PersonalTokenStore,
    RevocationRecord, RevocationStore, UserDirectory,
};
use warden_core::{RoleId, TokenId, UserId};
use warden_infra::PgStore;

async fn reset_postgres(url: &str) -> Result<(), sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect(url)
        .await?;
    sqlx::raw_sql(
        "DROP TABLE IF EXISTS personal_tokens, access_tokens, role_permissions, user_roles, permissions, roles, users CASCADE",
    )
    .execute(&pool)
    .await
    .map(|_| ())
}

/// A migrated, seeded store, or `None` when no database is reachable.
async fn pg_store() -> Option<PgStore> {
    let url = match std::env::var("WARDEN_TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping pg-tests: set WARDEN_TEST_DATABASE_URL or DATABASE_URL");
            return None;
        }
    };
    if let Err(err) = reset_postgres(&url).await {
        eprintln!("skipping pg-tests: cannot connect to postgres: {err}");
        return None;
    }
    let store = PgStore::connect(&url, 5).await.ok()?;
    store.migrate().await.ok()?;
    warden_auth::bootstrap::seed(&store, CATALOG, "!").await.ok()?;
    Some(store)
}

// Tests share one database; run the scenarios sequentially from one test.
#[tokio::test]
async fn postgres_store_scenarios() {
    let Some(store) = pg_store().await else {
        return;
    };

    bootstrap_is_idempotent(&store).await;
    blacklist_is_atomic_and_unique(&store).await;
    whitelist_round_trip(&store).await;
    grants_match_exact_names(&store).await;
}

async fn bootstrap_is_idempotent(store: &PgStore) {
    warden_auth::bootstrap::seed(store, CATALOG, "other-hash").await.unwrap();

    let root = store.find_user(UserId::ROOT).await.unwrap().unwrap();
    assert_eq!(root.username, "root");
    assert_eq!(root.password_hash, "!");

    let roles = store.roles_of(UserId::ROOT).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].id, RoleId::ROOT);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permissions")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count as usize, CATALOG.len());

    // Sequences continue past the seeded ids.
    let next: i64 = sqlx::query_scalar("INSERT INTO users (username, password_hash) VALUES ('alice', '!') RETURNING id")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert!(next > 1);
}

async fn blacklist_is_atomic_and_unique(store: &PgStore) {
    let record = RevocationRecord {
        user_id: UserId::ROOT,
        access_token_id: TokenId::new(),
        refresh_token_id: TokenId::new(),
        created_at: Utc::now(),
    };
    store.blacklist(record.clone()).await.unwrap();
    assert!(store
        .is_blacklisted(BlacklistColumn::AccessToken, record.access_token_id)
        .await
        .unwrap());
    assert!(store
        .is_blacklisted(BlacklistColumn::RefreshToken, record.refresh_token_id)
        .await
        .unwrap());
    assert!(!store
        .is_blacklisted(BlacklistColumn::AccessToken, record.refresh_token_id)
        .await
        .unwrap());

    let fresh_refresh = TokenId::new();
    let err = store
        .blacklist(RevocationRecord {
            refresh_token_id: fresh_refresh,
            ..record
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(!store
        .is_blacklisted(BlacklistColumn::RefreshToken, fresh_refresh)
        .await
        .unwrap());
}

async fn whitelist_round_trip(store: &PgStore) {
    let jti = TokenId::new();
    let record = store
        .insert(NewPersonalToken {
            user_id: UserId::ROOT,
            description: "ci".into(),
            token_id: jti,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(record.token_id, jti);
    assert!(store.is_whitelisted(jti).await.unwrap());
    assert_eq!(store.list(UserId::ROOT).await.unwrap().len(), 1);

    assert!(!store.delete(UserId::new(999), record.id).await.unwrap());
    assert!(store.delete(UserId::ROOT, record.id).await.unwrap());
    assert!(!store.is_whitelisted(jti).await.unwrap());
}

async fn grants_match_exact_names(store: &PgStore) {
    assert!(store
        .holds_permission(&[RoleId::ROOT], "auth:ReadUser")
        .await
        .unwrap());
    assert!(!store
        .holds_permission(&[RoleId::ROOT], "auth:readuser")
        .await
        .unwrap());
    assert!(!store
        .holds_permission(&[RoleId::new(77)], "auth:ReadUser")
        .await
        .unwrap());
}
