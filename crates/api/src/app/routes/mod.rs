use axum::{
    Router,
    routing::{delete, get, post},
};

pub mod personal_tokens;
pub mod session;
pub mod system;

/// Router for every endpoint. Each handler runs the admission gate for its
/// own operation.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(session::login))
        .route("/auth/token", post(session::refresh).delete(session::logout))
        .route("/auth/whoami", get(system::whoami))
        .route("/auth/permissions/:operation", get(system::check_permission))
        .route(
            "/auth/personal-tokens",
            post(personal_tokens::create).get(personal_tokens::list),
        )
        .route("/auth/personal-tokens/:id", delete(personal_tokens::remove))
}
