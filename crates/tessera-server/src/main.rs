use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tessera_client::Providers;
use tessera_core::config::TesseraConfig;
use tessera_server::{auth, routes};
use tessera_server::state::AppState;

/// Job bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tessera=info".parse()?))
        .with_target(false)
        .init();

    let api_key =
        std::env::var("TESSERA_SERVER_API_KEY").context("TESSERA_SERVER_API_KEY must be set")?;
    auth::validate_api_key(&api_key)?;
    let port = std::env::var("TESSERA_SERVER_PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = TesseraConfig::from_env()?;
    let providers = Providers::from_config(&config, false)?;
    let (dispatcher, stats_consumer) = providers.into_dispatcher(&config);

    let state = Arc::new(AppState {
        dispatcher,
        api_key,
        job_timeout: config.job_timeout,
    });

    let app = routes::router(Arc::clone(&state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Last handle gone: the consumer drains its queue and exits.
    drop(state);
    if let Err(e) = stats_consumer.await {
        tracing::warn!(error = %e, "Stats consumer did not shut down cleanly");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
