//! Credential channel parsing (header value → token + expected kind).

use crate::claims::TokenKind;
use crate::error::AuthError;

/// A presented token and the kind its channel implies.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub kind: TokenKind,
    pub token: String,
}

impl Credential {
    pub fn new(kind: TokenKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
        }
    }

    /// Parse an `Authorization` header value.
    ///
    /// Exactly two whitespace-separated parts: `Bearer <access>` or
    /// `Token <personal>`. Anything else is rejected before the token is
    /// looked at.
    pub fn from_authorization(value: &str) -> Result<Self, AuthError> {
        let mut parts = value.split_whitespace();
        let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(if value.trim().is_empty() {
                AuthError::EmptyToken
            } else {
                AuthError::MalformedToken
            });
        };

        let kind = match scheme {
            "Bearer" => TokenKind::Access,
            "Token" => TokenKind::Personal,
            _ => return Err(AuthError::MalformedToken),
        };
        Ok(Self::new(kind, token))
    }
}

// Never print the token itself.
impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
