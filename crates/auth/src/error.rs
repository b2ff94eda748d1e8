use thiserror::Error;

use warden_core::StoreError;

/// Failure taxonomy of the token lifecycle and authorization engine.
///
/// The variants are precise for diagnostics. At the transport boundary every
/// authentication failure collapses to one uniform "unauthorized" outcome
/// (see [`AuthError::class`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credential presented")]
    EmptyToken,

    /// Parse or signature failure.
    #[error("malformed token")]
    MalformedToken,

    #[error("unexpected signing algorithm: {0}")]
    AlgorithmMismatch(String),

    /// Missing/mismatched claims, revoked, subject not found, whitelist absent.
    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid username or password")]
    InvalidCredentials,

    /// Programmer error on the issuing side.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("forbidden: missing permission '{0}'")]
    AccessDenied(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// How a failure should be presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// No usable credential (401).
    Unauthenticated,
    /// Identity proven, operation not granted (403).
    Forbidden,
    /// The request itself was unusable (400).
    BadRequest,
    /// Signing or storage failure (500).
    Internal,
}

impl AuthError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn class(&self) -> FailureClass {
        match self {
            AuthError::EmptyToken
            | AuthError::MalformedToken
            | AuthError::AlgorithmMismatch(_)
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::InvalidCredentials => FailureClass::Unauthenticated,
            AuthError::AccessDenied(_) => FailureClass::Forbidden,
            AuthError::InvalidArgument(_) => FailureClass::BadRequest,
            AuthError::Signing(_) | AuthError::Storage(_) => FailureClass::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_share_one_class() {
        let errors = [
            AuthError::EmptyToken,
            AuthError::MalformedToken,
            AuthError::AlgorithmMismatch("HS512".to_string()),
            AuthError::InvalidToken,
            AuthError::TokenExpired,
            AuthError::InvalidCredentials,
        ];
        for error in errors {
            assert_eq!(error.class(), FailureClass::Unauthenticated, "{error}");
        }
    }

    #[test]
    fn denial_and_internal_failures_are_distinct() {
        assert_eq!(
            AuthError::AccessDenied("auth:ReadUser".into()).class(),
            FailureClass::Forbidden
        );
        assert_eq!(
            AuthError::from(StoreError::unavailable("down")).class(),
            FailureClass::Internal
        );
        assert_eq!(AuthError::Signing("bad key".into()).class(), FailureClass::Internal);
        assert_eq!(AuthError::invalid_argument("x").class(), FailureClass::BadRequest);
    }
}
