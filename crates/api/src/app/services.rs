//! Storage and service wiring: Postgres when `DATABASE_URL` is set,
//! in-memory stores otherwise.

use std::sync::Arc;

use anyhow::{Context, Result};

use warden_auth::bootstrap;
use warden_auth::operation::CATALOG;
use warden_auth::{
    Argon2Passwords, AuthorizationEvaluator, BootstrapStore, GrantStore, InMemoryStore,
    PersonalTokenStore, RevocationGuard, RevocationStore, SessionService, SubjectResolver,
    TokenIssuer, TokenVerifier, UserDirectory,
};
use warden_infra::PgStore;

use crate::config::AppConfig;
use crate::middleware::Gate;

const PG_MAX_CONNECTIONS: u32 = 10;

/// Every storage port, possibly backed by one store.
#[derive(Clone)]
pub struct Ports {
    pub directory: Arc<dyn UserDirectory>,
    pub grants: Arc<dyn GrantStore>,
    pub revocations: Arc<dyn RevocationStore>,
    pub personal_tokens: Arc<dyn PersonalTokenStore>,
    pub bootstrap: Arc<dyn BootstrapStore>,
}

impl Ports {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserDirectory + GrantStore + RevocationStore + PersonalTokenStore + BootstrapStore + 'static,
    {
        Self {
            directory: store.clone(),
            grants: store.clone(),
            revocations: store.clone(),
            personal_tokens: store.clone(),
            bootstrap: store,
        }
    }
}

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub sessions: SessionService,
    pub evaluator: AuthorizationEvaluator,
    pub gate: Gate,
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices> {
    let ports = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, PG_MAX_CONNECTIONS)
                .await
                .with_context(|| "connect to postgres")?;
            store.migrate().await.with_context(|| "apply schema")?;
            tracing::info!("using postgres stores");
            Ports::from_store(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            Ports::from_store(Arc::new(InMemoryStore::new()))
        }
    };
    build_services_with(config, ports).await
}

/// Seed the catalog and wire the core over the given ports.
pub async fn build_services_with(config: &AppConfig, ports: Ports) -> Result<AppServices> {
    let passwords = Argon2Passwords::new();
    let root_hash = bootstrap::root_password_hash(&passwords, config.root_password.as_deref())
        .with_context(|| "hash root password")?;
    bootstrap::seed(ports.bootstrap.as_ref(), CATALOG, &root_hash)
        .await
        .with_context(|| "seed authorization catalog")?;

    let tokens = config.token_config()?;
    let verifier = TokenVerifier::new(
        tokens.clone(),
        RevocationGuard::new(ports.revocations.clone(), ports.personal_tokens.clone()),
        SubjectResolver::new(ports.directory.clone()),
    );
    let evaluator = AuthorizationEvaluator::new(ports.grants.clone());
    let sessions = SessionService::new(
        TokenIssuer::new(tokens),
        verifier.clone(),
        ports.directory.clone(),
        Arc::new(passwords),
    );
    let gate = Gate::new(config.public_operations.clone(), verifier, evaluator.clone());

    Ok(AppServices {
        sessions,
        evaluator,
        gate,
    })
}
