//! Claim codec: the signed token's claim set as a strongly typed value.
//!
//! The wire form is a flat JSON object. It is decoded exactly once into
//! [`Claims`]; nothing downstream re-reads raw maps. Registered time/issuer
//! claims stay optional here so the verifier can tell a *missing* claim
//! (invalid token) from a *misshapen* one (malformed token).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use warden_core::{Attributes, TokenId};

use crate::error::AuthError;

/// Token kind. Each kind owns its revocation polarity (see `revocation`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Personal,
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
            TokenKind::Personal => f.write_str("personal"),
        }
    }
}

/// Kind-specific claim payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenBody {
    /// Role names and an attribute snapshot taken at issuance.
    Access { roles: Vec<String>, attributes: Attributes },
    Refresh,
    /// Scopes requested when the personal token was created.
    Personal { scopes: Vec<String> },
}

impl TokenBody {
    pub fn kind(&self) -> TokenKind {
        match self {
            TokenBody::Access { .. } => TokenKind::Access,
            TokenBody::Refresh => TokenKind::Refresh,
            TokenBody::Personal { .. } => TokenKind::Personal,
        }
    }
}

/// Decoded claim set.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub jti: TokenId,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// User identifier as a decimal string.
    pub subject: Option<String>,
    /// Seconds since the Unix epoch.
    pub issued_at: Option<i64>,
    /// Seconds since the Unix epoch.
    pub expires_at: Option<i64>,
    pub body: TokenBody,
}

impl Claims {
    pub fn kind(&self) -> TokenKind {
        self.body.kind()
    }

    pub fn roles(&self) -> &[String] {
        match &self.body {
            TokenBody::Access { roles, .. } => roles,
            _ => &[],
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match &self.body {
            TokenBody::Access { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn scopes(&self) -> &[String] {
        match &self.body {
            TokenBody::Personal { scopes } => scopes,
            _ => &[],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    jti: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    typ: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attrs: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scopes: Option<Vec<String>>,
}

/// Encode claims into the JSON payload that gets signed.
pub fn encode(claims: &Claims) -> JsonValue {
    let (roles, attrs, scopes) = match &claims.body {
        TokenBody::Access { roles, attributes } => {
            (Some(roles.clone()), Some(attributes.clone()), None)
        }
        TokenBody::Refresh => (None, None, None),
        TokenBody::Personal { scopes } => (None, None, Some(scopes.clone())),
    };

    let wire = WireClaims {
        jti: claims.jti,
        iss: claims.issuer.clone(),
        aud: claims.audience.clone(),
        sub: claims.subject.clone(),
        iat: claims.issued_at,
        exp: claims.expires_at,
        typ: claims.kind(),
        roles,
        attrs,
        scopes,
    };

    // A struct of strings, integers and JSON values always serializes.
    serde_json::to_value(wire).unwrap_or(JsonValue::Null)
}

/// Decode a verified payload into typed claims.
///
/// Fails with `MalformedToken` when the payload is not an object of the
/// expected shape, or when a kind carries claims that belong to another kind.
pub fn decode(payload: JsonValue) -> Result<Claims, AuthError> {
    let wire: WireClaims = serde_json::from_value(payload).map_err(|e| {
        tracing::debug!(error = %e, "claim payload does not match the expected shape");
        AuthError::MalformedToken
    })?;

    let body = match wire.typ {
        TokenKind::Access => {
            if wire.scopes.is_some() {
                return Err(AuthError::MalformedToken);
            }
            TokenBody::Access {
                roles: wire.roles.unwrap_or_default(),
                attributes: wire.attrs.unwrap_or_default(),
            }
        }
        TokenKind::Refresh => {
            if wire.roles.is_some() || wire.attrs.is_some() || wire.scopes.is_some() {
                return Err(AuthError::MalformedToken);
            }
            TokenBody::Refresh
        }
        TokenKind::Personal => {
            if wire.roles.is_some() || wire.attrs.is_some() {
                return Err(AuthError::MalformedToken);
            }
            TokenBody::Personal {
                scopes: wire.scopes.unwrap_or_default(),
            }
        }
    };

    Ok(Claims {
        jti: wire.jti,
        issuer: wire.iss,
        audience: wire.aud,
        subject: wire.sub,
        issued_at: wire.iat,
        expires_at: wire.exp,
        body,
    })
}
