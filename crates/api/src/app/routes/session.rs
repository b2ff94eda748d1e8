use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use warden_auth::operation::{LOGIN, REFRESH_ACCESS_TOKEN};
use warden_auth::{AuthError, RevokeOutcome, TokenKind};

use crate::app::cookies;
use crate::app::dto::{LoginRequest, RefreshTokenBody, TokenPairResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::middleware::presented_credential;

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenPairResponse>), ApiError> {
    services.gate.admit(&headers, &jar, &LOGIN).await?;

    let pair = services
        .sessions
        .login(&body.username, &body.password, Utc::now())
        .await?;
    let response = TokenPairResponse::from(&pair);
    Ok((cookies::with_session(jar, &pair), Json(response)))
}

/// Trade a refresh token (body first, then cookie) for a fresh pair.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Option<Json<RefreshTokenBody>>,
) -> Result<(CookieJar, Json<TokenPairResponse>), ApiError> {
    services.gate.admit(&headers, &jar, &REFRESH_ACCESS_TOKEN).await?;

    let token = refresh_token_from(body, &jar)?;
    let pair = services.sessions.refresh(&token, Utc::now()).await?;
    let response = TokenPairResponse::from(&pair);
    Ok((cookies::with_session(jar, &pair), Json(response)))
}

/// Blacklist the presented access token together with its refresh token.
///
/// Works from the tokens alone, so a session whose access token has
/// already been revoked can still be logged out again.
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Option<Json<RefreshTokenBody>>,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let access = presented_credential(&headers, &jar)?;
    if access.kind != TokenKind::Access {
        return Err(AuthError::InvalidToken.into());
    }
    let refresh = refresh_token_from(body, &jar)?;

    let outcome = services
        .sessions
        .revoke(&access.token, &refresh, Utc::now())
        .await?;
    if outcome == RevokeOutcome::AlreadyRevoked {
        tracing::debug!("logout of an already revoked session");
    }
    Ok((cookies::without_session(jar), StatusCode::NO_CONTENT))
}

fn refresh_token_from(body: Option<Json<RefreshTokenBody>>, jar: &CookieJar) -> Result<String, AuthError> {
    body.and_then(|Json(body)| body.refresh_token)
        .filter(|token| !token.is_empty())
        .or_else(|| cookies::refresh_token(jar))
        .ok_or(AuthError::EmptyToken)
}
