use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use warden_auth::operation::{CREATE_PERSONAL_TOKEN, DELETE_PERSONAL_TOKEN, LIST_PERSONAL_TOKENS};
use warden_core::PersonalTokenId;

use crate::app::dto::{CreatePersonalTokenRequest, PersonalTokenResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<CreatePersonalTokenRequest>,
) -> Result<(StatusCode, Json<PersonalTokenResponse>), ApiError> {
    let admission = services.gate.admit(&headers, &jar, &CREATE_PERSONAL_TOKEN).await?;
    let caller = admission.caller()?;

    let created = services
        .sessions
        .create_personal_token(caller.subject(), &body.description, body.scopes, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(PersonalTokenResponse::from(&created))))
}

/// The caller's whitelisted tokens. Token strings are never listed.
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<Vec<PersonalTokenResponse>>, ApiError> {
    let admission = services.gate.admit(&headers, &jar, &LIST_PERSONAL_TOKENS).await?;
    let caller = admission.caller()?;

    let records = services.sessions.list_personal_tokens(caller.user_id()).await?;
    Ok(Json(records.iter().map(PersonalTokenResponse::from).collect()))
}

pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let admission = services.gate.admit(&headers, &jar, &DELETE_PERSONAL_TOKEN).await?;
    let caller = admission.caller()?;

    let id: PersonalTokenId = id
        .parse()
        .map_err(|e: warden_core::DomainError| ApiError::bad_request(e.to_string()))?;
    if services.sessions.delete_personal_token(caller.user_id(), id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
