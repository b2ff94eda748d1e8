//! Request admission: credential channel → verified subject → RBAC decision.
//!
//! The outcome is returned to the handler as an explicit [`Admission`]
//! value; nothing is stored in request extensions.

use axum::http::{HeaderMap, header};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use warden_auth::{
    AuthError, Authenticated, AuthorizationEvaluator, Credential, Operation, PublicOperations,
    TokenKind, TokenVerifier,
};

use crate::app::cookies::ACCESS_COOKIE;
use crate::app::errors::ApiError;

/// How a request was let through.
#[derive(Debug)]
pub enum Admission {
    /// Public operation; no credential was examined.
    Public,
    /// Verified token whose subject holds the operation's permission.
    Authenticated(Authenticated),
}

impl Admission {
    /// The authenticated caller; a public admission has none.
    pub fn caller(&self) -> Result<&Authenticated, ApiError> {
        match self {
            Admission::Authenticated(auth) => Ok(auth),
            Admission::Public => Err(AuthError::EmptyToken.into()),
        }
    }
}

#[derive(Clone)]
pub struct Gate {
    public: PublicOperations,
    verifier: TokenVerifier,
    evaluator: AuthorizationEvaluator,
}

impl Gate {
    pub fn new(public: PublicOperations, verifier: TokenVerifier, evaluator: AuthorizationEvaluator) -> Self {
        Self {
            public,
            verifier,
            evaluator,
        }
    }

    /// Admit a request for `operation`.
    ///
    /// Public operations bypass verification entirely. Everything else needs
    /// a usable token whose subject's roles grant the operation.
    pub async fn admit(&self, headers: &HeaderMap, jar: &CookieJar, operation: &Operation) -> Result<Admission, ApiError> {
        if self.public.contains(operation) {
            return Ok(Admission::Public);
        }

        let credential = presented_credential(headers, jar)?;
        let auth = self
            .verifier
            .verify(&credential.token, credential.kind, Utc::now())
            .await?;
        let roles = self
            .verifier
            .subjects()
            .role_ids(auth.subject())
            .await
            .map_err(AuthError::from)?;
        self.evaluator.authorize(&roles, operation).await?;

        tracing::debug!(%operation, user_id = %auth.user_id(), kind = %auth.kind(), "request admitted");
        Ok(Admission::Authenticated(auth))
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}

/// Read exactly one credential channel: the `Authorization` header when
/// present, otherwise the access-token cookie.
pub fn presented_credential(headers: &HeaderMap, jar: &CookieJar) -> Result<Credential, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::MalformedToken)?;
        return Credential::from_authorization(value);
    }

    match jar.get(ACCESS_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => Ok(Credential::new(TokenKind::Access, cookie.value())),
        _ => Err(AuthError::EmptyToken),
    }
}
