//! Request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::{PersonalToken, PersonalTokenRecord, TokenKind, TokenPair};
use warden_core::{Attributes, PersonalTokenId, UserId};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Body alternative to the refresh-token cookie.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenBody {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub token_type: &'static str,
    pub access_token: String,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: String,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl From<&TokenPair> for TokenPairResponse {
    fn from(pair: &TokenPair) -> Self {
        Self {
            token_type: "Bearer",
            access_token: pair.access.token.clone(),
            access_expires_at: pair.access.expires_at(),
            refresh_token: pair.refresh.token.clone(),
            refresh_expires_at: pair.refresh.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub attributes: Attributes,
    pub token_kind: TokenKind,
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePersonalTokenRequest {
    pub description: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonalTokenResponse {
    pub id: PersonalTokenId,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Shown once, at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl From<&PersonalTokenRecord> for PersonalTokenResponse {
    fn from(record: &PersonalTokenRecord) -> Self {
        Self {
            id: record.id,
            description: record.description.clone(),
            created_at: record.created_at,
            expires_at: None,
            token: None,
        }
    }
}

impl From<&PersonalToken> for PersonalTokenResponse {
    fn from(created: &PersonalToken) -> Self {
        Self {
            expires_at: created.token.expires_at(),
            token: Some(created.token.token.clone()),
            ..Self::from(&created.record)
        }
    }
}
