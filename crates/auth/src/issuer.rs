use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::Header;
use tracing::instrument;

use warden_core::{TokenId, User};

use crate::claims::{self, Claims, TokenBody};
use crate::config::{SIGNING_ALGORITHM, TokenConfig};
use crate::error::AuthError;

/// A freshly signed token and the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub fn jti(&self) -> TokenId {
        self.claims.jti
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .expires_at
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Builds claims and signs them. Performs no I/O.
///
/// Role names and attributes for access tokens are supplied by the caller from
/// the user's already-loaded roles; the issuer never queries storage.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    config: TokenConfig,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a token of the body's kind with the configured ttl for that kind.
    pub fn issue_default(&self, user: &User, body: TokenBody, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let ttl = self.config.ttl(body.kind());
        self.issue(user, ttl, body, now)
    }

    /// Issue a token for `user`, valid from `now` for `ttl`.
    ///
    /// For personal tokens the caller must persist the whitelist row (same
    /// jti) before the token becomes usable.
    #[instrument(skip(self, user, body), fields(user_id = %user.id, kind = %body.kind()), err)]
    pub fn issue(
        &self,
        user: &User,
        ttl: Duration,
        body: TokenBody,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        if user.id.get() == 0 {
            return Err(AuthError::invalid_argument("cannot issue a token for an unpersisted user"));
        }
        if ttl <= Duration::zero() {
            return Err(AuthError::invalid_argument("token ttl must be positive"));
        }

        let issued_at = now.timestamp();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::invalid_argument("token ttl out of range"))?
            .timestamp();

        let claims = Claims {
            jti: TokenId::new(),
            issuer: Some(self.config.domain().to_string()),
            audience: Some(self.config.domain().to_string()),
            subject: Some(user.id.to_string()),
            issued_at: Some(issued_at),
            expires_at: Some(expires_at),
            body,
        };

        let token = jsonwebtoken::encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims::encode(&claims),
            self.config.encoding_key(),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))?;

        tracing::debug!(jti = %claims.jti, "token issued");
        Ok(IssuedToken { token, claims })
    }
}
