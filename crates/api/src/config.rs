//! Service configuration sourced from environment variables.

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Duration;

use warden_auth::{PublicOperations, TokenConfig};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
/// Longest token lifetime accepted from configuration (ten years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Issuer and audience of every token.
    pub base_url: String,
    pub secret: Vec<u8>,
    pub public_operations: PublicOperations,
    /// Postgres when set, in-memory stores otherwise.
    pub database_url: Option<String>,
    /// Used only when the root user is first created.
    pub root_password: Option<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub personal_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = match var("WARDEN_SECRET") {
            Some(raw) => STANDARD
                .decode(raw.trim())
                .with_context(|| "decode WARDEN_SECRET (base64)")?,
            None => bail!("WARDEN_SECRET must be set"),
        };
        if secret.is_empty() {
            bail!("WARDEN_SECRET decodes to an empty key");
        }

        let bind_addr = var("WARDEN_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse WARDEN_BIND")?;
        let base_url = var("WARDEN_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let public_operations = PublicOperations::parse(&var("WARDEN_PUBLIC_OPERATIONS").unwrap_or_default());

        let ttl = |key: &str, default: i64| -> Result<Duration> {
            let secs = match var(key) {
                Some(raw) => raw.trim().parse::<i64>().with_context(|| format!("parse {key}"))?,
                None => default,
            };
            if secs <= 0 {
                bail!("{key} must be positive");
            }
            if secs > MAX_TTL_SECS {
                bail!("{key} must be at most {MAX_TTL_SECS} seconds");
            }
            Duration::try_seconds(secs).with_context(|| format!("{key} out of range"))
        };

        Ok(Self {
            bind_addr,
            base_url,
            secret,
            public_operations,
            database_url: var("DATABASE_URL"),
            root_password: var("WARDEN_ROOT_PASSWORD"),
            access_ttl: ttl("WARDEN_ACCESS_TTL_SECS", TokenConfig::DEFAULT_ACCESS_TTL_SECS)?,
            refresh_ttl: ttl("WARDEN_REFRESH_TTL_SECS", TokenConfig::DEFAULT_REFRESH_TTL_SECS)?,
            personal_ttl: ttl("WARDEN_PERSONAL_TTL_SECS", TokenConfig::DEFAULT_PERSONAL_TTL_SECS)?,
        })
    }

    /// Minimal in-memory configuration (tests, local runs).
    pub fn in_memory(secret: &[u8]) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            base_url: DEFAULT_BASE_URL.to_string(),
            secret: secret.to_vec(),
            public_operations: PublicOperations::default(),
            database_url: None,
            root_password: None,
            access_ttl: Duration::seconds(TokenConfig::DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(TokenConfig::DEFAULT_REFRESH_TTL_SECS),
            personal_ttl: Duration::seconds(TokenConfig::DEFAULT_PERSONAL_TTL_SECS),
        }
    }

    pub fn token_config(&self) -> Result<TokenConfig> {
        Ok(TokenConfig::new(self.base_url.clone(), &self.secret)
            .with_context(|| "build token configuration")?
            .with_ttls(self.access_ttl, self.refresh_ttl, self.personal_ttl))
    }
}

// Keep the secret and root password out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("base_url", &self.base_url)
            .field("public_operations", &self.public_operations)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("personal_ttl", &self.personal_ttl)
            .finish_non_exhaustive()
    }
}
