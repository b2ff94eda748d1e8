//! HTTP application wiring.
//!
//! - `services.rs`: storage selection and core wiring
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response bodies
//! - `cookies.rs`: session cookie handling
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Result;
use axum::{Extension, Router};

use warden_auth::InMemoryStore;

use crate::config::AppConfig;

pub mod cookies;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router> {
    let services = services::build_services(config).await?;
    Ok(router(services))
}

/// Build the router over a caller-supplied in-memory store, so users, roles
/// and grants can be arranged before serving.
pub async fn build_app_with_store(config: &AppConfig, store: Arc<InMemoryStore>) -> Result<Router> {
    let services = services::build_services_with(config, services::Ports::from_store(store)).await?;
    Ok(router(services))
}

pub fn router(services: services::AppServices) -> Router {
    routes::router().layer(Extension(Arc::new(services)))
}
