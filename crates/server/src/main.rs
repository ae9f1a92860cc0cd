use std::sync::Arc;

use anyhow::Context;
use server::{AppState, router};
use services::services::{
    api::BackOfficeApi, config::Config, memory_api::InMemoryBackOfficeApi,
    rest_api::RestBackOfficeApi,
};
use utils::log::init_tracing;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _sentry = init_tracing();

    let mut config = Config::from_env()?;
    let api: Arc<dyn BackOfficeApi> = match config.api_url.clone() {
        Some(url) => {
            tracing::info!(%url, "Using remote back office");
            Arc::new(RestBackOfficeApi::new(
                url,
                config.api_token.take(),
                config.request_timeout,
            )?)
        }
        None => {
            tracing::warn!("BACKOFFICE_API_URL not set, serving in-memory demo data");
            Arc::new(InMemoryBackOfficeApi::seeded())
        }
    };

    let state = AppState::new(api, &config);
    let sync = state.sync.clone().spawn();
    let app = router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = match std::env::var("PORT") {
        Ok(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid PORT {raw:?}"))?,
        Err(_) => DEFAULT_PORT,
    };

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!("Back office listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sync.abort();
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
