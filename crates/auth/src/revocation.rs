//! Revocation state per token kind.
//!
//! Session tokens (access/refresh) are valid unless their jti is blacklisted.
//! Personal tokens are valid only while their jti is whitelisted. Each kind
//! owns exactly one of these policies.

use std::sync::Arc;

use warden_core::TokenId;

use crate::claims::TokenKind;
use crate::error::AuthError;
use crate::store::{BlacklistColumn, PersonalTokenStore, RevocationStore};

/// Revocation strategy owned by a token kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RevocationPolicy {
    /// Presence in the blacklist column revokes.
    Blacklist(BlacklistColumn),
    /// Absence from the whitelist revokes.
    Whitelist,
}

impl TokenKind {
    pub fn revocation_policy(self) -> RevocationPolicy {
        match self {
            TokenKind::Access => RevocationPolicy::Blacklist(BlacklistColumn::AccessToken),
            TokenKind::Refresh => RevocationPolicy::Blacklist(BlacklistColumn::RefreshToken),
            TokenKind::Personal => RevocationPolicy::Whitelist,
        }
    }
}

/// Answers "is this token still usable for its kind?".
#[derive(Clone)]
pub struct RevocationGuard {
    blacklist: Arc<dyn RevocationStore>,
    whitelist: Arc<dyn PersonalTokenStore>,
}

impl RevocationGuard {
    pub fn new(blacklist: Arc<dyn RevocationStore>, whitelist: Arc<dyn PersonalTokenStore>) -> Self {
        Self { blacklist, whitelist }
    }

    /// `Ok(())` when the token is not revoked.
    ///
    /// Storage failures reject the token: an unanswerable lookup never
    /// counts as "not revoked".
    pub async fn ensure_usable(&self, kind: TokenKind, jti: TokenId) -> Result<(), AuthError> {
        let usable = match kind.revocation_policy() {
            RevocationPolicy::Blacklist(column) => {
                self.blacklist.is_blacklisted(column, jti).await.map(|hit| !hit)
            }
            RevocationPolicy::Whitelist => self.whitelist.is_whitelisted(jti).await,
        };

        match usable {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!(%jti, %kind, "token revoked");
                Err(AuthError::InvalidToken)
            }
            Err(e) => {
                tracing::warn!(%jti, %kind, error = %e, "revocation lookup failed; rejecting token");
                Err(AuthError::InvalidToken)
            }
        }
    }

    pub(crate) fn blacklist_store(&self) -> &Arc<dyn RevocationStore> {
        &self.blacklist
    }

    pub(crate) fn whitelist_store(&self) -> &Arc<dyn PersonalTokenStore> {
        &self.whitelist
    }
}
