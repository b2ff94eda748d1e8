//! HTTP surface for the authorization service.

pub mod app;
pub mod config;
pub mod middleware;
