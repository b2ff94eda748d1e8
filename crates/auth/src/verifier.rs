//! Token verification pipeline.
//!
//! ```text
//! Received → Parsed → StructurallyValid → Unexpired → NotRevoked → SubjectResolved → Usable
//!     \________\____________\_______________\____________\______________\______→ Rejected
//! ```
//!
//! Checks run in this order and stop at the first failure. The precise reason
//! is logged; callers should only surface the failure class.

use chrono::{DateTime, Utc};
use jsonwebtoken::Validation;
use serde_json::Value as JsonValue;
use tracing::instrument;

use warden_core::{TokenId, UserId};

use crate::claims::{self, Claims, TokenKind};
use crate::config::{SIGNING_ALGORITHM, TokenConfig};
use crate::error::AuthError;
use crate::revocation::RevocationGuard;
use crate::subject::{Subject, SubjectResolver};

/// Position reached in the pipeline (used for diagnostics).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Parsed,
    StructurallyValid,
    Unexpired,
    NotRevoked,
    SubjectResolved,
    Usable,
}

/// Outcome of a successful verification, threaded explicitly through the
/// rest of the request.
#[derive(Debug)]
pub struct Authenticated {
    claims: Claims,
    subject: Subject,
}

impl Authenticated {
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn user_id(&self) -> UserId {
        self.subject.id()
    }

    pub fn kind(&self) -> TokenKind {
        self.claims.kind()
    }

    pub fn jti(&self) -> TokenId {
        self.claims.jti
    }
}

/// Verifies tokens issued by this service.
#[derive(Clone)]
pub struct TokenVerifier {
    config: TokenConfig,
    validation: Validation,
    revocation: RevocationGuard,
    subjects: SubjectResolver,
}

impl TokenVerifier {
    pub fn new(config: TokenConfig, revocation: RevocationGuard, subjects: SubjectResolver) -> Self {
        // Signature only: registered claims are checked below, in order,
        // against an explicit clock.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            config,
            validation,
            revocation,
            subjects,
        }
    }

    pub fn subjects(&self) -> &SubjectResolver {
        &self.subjects
    }

    pub fn revocation(&self) -> &RevocationGuard {
        &self.revocation
    }

    /// Full pipeline: signature, claims, expiry, revocation, subject.
    #[instrument(skip_all, fields(kind = %expected))]
    pub async fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, AuthError> {
        let claims = self.inspect(token, expected, now)?;

        self.revocation
            .ensure_usable(claims.kind(), claims.jti)
            .await
            .map_err(|e| rejected(Stage::Unexpired, e))?;

        let subject = self
            .subjects
            .resolve(claims.subject.as_deref())
            .await
            .map_err(|e| rejected(Stage::NotRevoked, e))?;
        tracing::trace!(stage = ?Stage::SubjectResolved, user_id = %subject.id(), "subject resolved");

        tracing::trace!(stage = ?Stage::Usable, jti = %claims.jti, user_id = %subject.id(), "token usable");
        Ok(Authenticated { claims, subject })
    }

    /// Stateless part of the pipeline (no storage access): signature,
    /// required claims, kind, expiry.
    pub fn inspect(&self, token: &str, expected: TokenKind, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(rejected(Stage::Received, AuthError::EmptyToken));
        }

        let claims = self.parse(token).map_err(|e| rejected(Stage::Received, e))?;
        self.check_required(&claims, expected)
            .map_err(|e| rejected(Stage::Parsed, e))?;
        check_expiry(&claims, now).map_err(|e| rejected(Stage::StructurallyValid, e))?;
        Ok(claims)
    }

    fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "token header does not parse");
            AuthError::MalformedToken
        })?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(AuthError::AlgorithmMismatch(format!("{:?}", header.alg)));
        }

        let data = jsonwebtoken::decode::<JsonValue>(token, self.config.decoding_key(), &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token signature or payload invalid");
                AuthError::MalformedToken
            })?;

        claims::decode(data.claims)
    }

    fn check_required(&self, claims: &Claims, expected: TokenKind) -> Result<(), AuthError> {
        let domain = self.config.domain();
        if claims.expires_at.is_none() {
            tracing::debug!("token has no expiry");
            return Err(AuthError::InvalidToken);
        }
        if claims.issued_at.is_none() {
            tracing::debug!("token has no issued-at");
            return Err(AuthError::InvalidToken);
        }
        if claims.issuer.as_deref() != Some(domain) {
            tracing::debug!(issuer = ?claims.issuer, "issuer mismatch");
            return Err(AuthError::InvalidToken);
        }
        if claims.audience.as_deref() != Some(domain) {
            tracing::debug!(audience = ?claims.audience, "audience mismatch");
            return Err(AuthError::InvalidToken);
        }
        if claims.kind() != expected {
            tracing::debug!(actual = %claims.kind(), "token kind does not match credential channel");
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }
}

/// `exp` must be strictly in the future; zero or missing counts as expired.
fn check_expiry(claims: &Claims, now: DateTime<Utc>) -> Result<(), AuthError> {
    let exp = claims.expires_at.unwrap_or(0);
    if exp <= 0 || exp <= now.timestamp() {
        return Err(AuthError::TokenExpired);
    }
    if let Some(iat) = claims.issued_at {
        if exp <= iat {
            tracing::debug!(iat, exp, "token expires before it was issued");
            return Err(AuthError::InvalidToken);
        }
    }
    Ok(())
}

fn rejected(reached: Stage, err: AuthError) -> AuthError {
    tracing::debug!(stage = ?reached, error = %err, "token rejected");
    err
}
