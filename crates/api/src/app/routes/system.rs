use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::HeaderMap,
};
use axum_extra::extract::CookieJar;
use serde_json::{Value, json};

use warden_auth::operation::{CHECK_PERMISSION, WHO_AM_I};
use warden_auth::{AuthError, AuthorizationExplanation, Operation};

use crate::app::dto::WhoAmIResponse;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<WhoAmIResponse>, ApiError> {
    let admission = services.gate.admit(&headers, &jar, &WHO_AM_I).await?;
    let caller = admission.caller()?;

    let roles = services
        .gate
        .verifier()
        .subjects()
        .roles(caller.subject())
        .await
        .map_err(AuthError::from)?;
    let user = caller.subject().user();

    Ok(Json(WhoAmIResponse {
        user_id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        roles: roles.iter().map(|r| r.name.clone()).collect(),
        attributes: user.attributes.clone(),
        token_kind: caller.kind(),
        scopes: caller.claims().scopes().to_vec(),
    }))
}

/// Would the caller's current roles allow `operation`?
pub async fn check_permission(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(operation): Path<String>,
) -> Result<Json<AuthorizationExplanation>, ApiError> {
    let admission = services.gate.admit(&headers, &jar, &CHECK_PERMISSION).await?;
    let caller = admission.caller()?;

    let roles = services
        .gate
        .verifier()
        .subjects()
        .role_ids(caller.subject())
        .await
        .map_err(AuthError::from)?;
    let explanation = services.evaluator.explain(&roles, &Operation::new(operation)).await?;
    Ok(Json(explanation))
}
