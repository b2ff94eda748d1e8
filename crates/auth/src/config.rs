use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::claims::TokenKind;
use crate::error::AuthError;

/// The single signing algorithm accepted by this service.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Immutable token settings shared by the issuer and the verifier.
///
/// Built once at startup and passed by value; the core keeps no other
/// process-wide state.
#[derive(Clone)]
pub struct TokenConfig {
    domain: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    personal_ttl: Duration,
}

impl TokenConfig {
    pub const DEFAULT_ACCESS_TTL_SECS: i64 = 60 * 60;
    pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
    pub const DEFAULT_PERSONAL_TTL_SECS: i64 = 365 * 24 * 60 * 60;

    /// `domain` is used as both issuer and audience.
    pub fn new(domain: impl Into<String>, secret: &[u8]) -> Result<Self, AuthError> {
        let domain = domain.into();
        if domain.trim().is_empty() {
            return Err(AuthError::invalid_argument("service domain must not be empty"));
        }
        if secret.is_empty() {
            return Err(AuthError::invalid_argument("signing secret must not be empty"));
        }
        Ok(Self {
            domain,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(Self::DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(Self::DEFAULT_REFRESH_TTL_SECS),
            personal_ttl: Duration::seconds(Self::DEFAULT_PERSONAL_TTL_SECS),
        })
    }

    pub fn with_ttls(mut self, access: Duration, refresh: Duration, personal: Duration) -> Self {
        self.access_ttl = access;
        self.refresh_ttl = refresh;
        self.personal_ttl = personal;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::Personal => self.personal_ttl,
        }
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl core::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("domain", &self.domain)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("personal_ttl", &self.personal_ttl)
            .finish_non_exhaustive()
    }
}
