// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{routing::{delete, get, post}, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::view_registry::WaveformViews;
use crate::infrastructure::config::load_service_config;
use crate::infrastructure::fdsn_client::FdsnDataselectClient;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    abort_view, decode_upload, fetch_waveform, health_check, list_sources, view_state,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_service_config()?;

    // Create fetch client (infrastructure layer)
    let client = Arc::new(FdsnDataselectClient::new(
        config.fetch.sources.clone(),
        config.fetch.timeout(),
    )?);

    // Create view registry (application layer)
    let views = WaveformViews::new(client.clone(), config.pipeline);

    // Create application state
    let state = Arc::new(AppState {
        views,
        sources: client.sources().to_vec(),
    });

    // Build router (presentation layer)
    // Note: We handle compression manually in our response builders,
    // so we don't use CompressionLayer to avoid double compression
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/sources", get(list_sources))
        .route("/views/:view", delete(abort_view))
        .route("/views/:view/state", get(view_state))
        .route("/views/:view/waveform", get(fetch_waveform))
        .route("/decode", post(decode_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind_address))?;
    tracing::info!("Starting seismic-waveform service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
