//! # Vertex Headquarters Server
//!
//! Runs the store-to-headquarters sync hub behind one listener:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Headquarters Server                                │
//! │                                                                         │
//! │  Stores ───► /ws (WebSocket) ───┐                                       │
//! │                                 ├──► SyncHub ──► applier channel        │
//! │  HQ ops ───► /api/* (HTTP) ─────┘                  (persistence         │
//! │                                                     layer, external)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `hq-server [config.toml]`

mod api;
mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vertex_hub::{HubSettings, InboundSync, SyncHub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Vertex headquarters server...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = HubSettings::load_or_default(config_path);
    settings.validate()?;
    info!(addr = %settings.bind_address(), "Configuration loaded");

    let bind_address = settings.bind_address();
    let (hub, applier_rx) = SyncHub::new(settings);

    // The persistence layer attaches to the applier channel; until one is
    // wired in, accepted store events are logged and dropped.
    tokio::spawn(drain_applier_events(applier_rx));

    let app = vertex_hub::server::router(Arc::clone(&hub)).merge(api::router(hub));

    let listener = TcpListener::bind(&bind_address).await?;
    info!(addr = %listener.local_addr()?, "Headquarters server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Headquarters server stopped");
    Ok(())
}

/// Consumes accepted store events on behalf of the (external) applier.
async fn drain_applier_events(mut applier_rx: mpsc::Receiver<InboundSync>) {
    while let Some(event) = applier_rx.recv().await {
        info!(
            store_id = event.store_id,
            firm_id = event.firm_id,
            data_type = %event.data_type,
            "Store event accepted (no applier attached)"
        );
    }
    warn!("Applier channel closed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
