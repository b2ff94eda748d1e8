use anyhow::Context;

use warden_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "configuration loaded");

    let app = warden_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, base_url = %config.base_url, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
