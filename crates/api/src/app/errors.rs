use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use warden_auth::{AuthError, FailureClass};

/// Message shared by every authentication failure; which check failed is
/// only ever logged.
pub const UNAUTHORIZED_MESSAGE: &str = "authentication required";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => auth_error_to_response(&err),
            ApiError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
        }
    }
}

fn auth_error_to_response(err: &AuthError) -> Response {
    match err.class() {
        // Login failures already carry one uniform message.
        FailureClass::Unauthenticated if matches!(err, AuthError::InvalidCredentials) => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", err.to_string())
        }
        FailureClass::Unauthenticated => {
            tracing::debug!(error = %err, "request not authenticated");
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", UNAUTHORIZED_MESSAGE)
        }
        FailureClass::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
        FailureClass::BadRequest => json_error(StatusCode::BAD_REQUEST, "bad_request", err.to_string()),
        FailureClass::Internal => {
            tracing::error!(error = %err, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
