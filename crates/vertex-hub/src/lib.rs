//! # vertex-hub: Store-to-Headquarters Sync Hub
//!
//! This crate provides the synchronization hub for the Vertex ERP backend:
//! a registry of live store connections and the fan-out protocol that
//! pushes data to stores and pulls data from them.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Hub Architecture                            │
//! │                                                                         │
//! │  Store #1 ──┐                                                           │
//! │  Store #2 ──┼── WebSocket ──► ┌──────────┐      ┌─────────────────┐    │
//! │  Store #3 ──┘    (/ws)        │ HqServer │ ───► │    Registry     │    │
//! │                               └──────────┘      │   + Topology    │    │
//! │                                                 └────────┬────────┘    │
//! │                                                          │             │
//! │   HQ control surface                    ┌────────────────┼──────────┐  │
//! │   ──────────────────                    ▼                ▼          │  │
//! │   dispatch_push ─────────────►  ┌────────────┐   ┌────────────┐     │  │
//! │   dispatch_request ──────────►  │ Dispatcher │   │ SyncIntake │     │  │
//! │   is_store_online / online ──►  └────────────┘   └─────┬──────┘     │  │
//! │                                       │                │            │  │
//! │                                       ▼                ▼            │  │
//! │                                  SyncReport      applier channel    │  │
//! │                                 (per dispatch)  (external layer)    │  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Hub configuration (TOML + env + defaults)
//! - [`dispatcher`] - Fan-out of one sync operation, report aggregation
//! - [`error`] - Hub error types
//! - [`hub`] - `SyncHub` façade owning registry, dispatcher, intake
//! - [`intake`] - Store-originated event validation and applier hand-off
//! - [`protocol`] - JSON wire messages
//! - [`registry`] - Live connection table + firm topology
//! - [`server`] - Axum WebSocket listener for store connections
//! - [`topology`] - Firm → declared-store index
//! - [`transport`] - Per-connection outbound channel handle
//! - [`types`] - Shared identifiers and the inbound event type
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vertex_hub::{HubSettings, HqServer, SyncHub};
//!
//! let (hub, mut applier_rx) = SyncHub::new(HubSettings::load_or_default(None));
//! let handle = HqServer::new(hub.clone()).start().await?;
//!
//! // Headquarters pushes a price list to every reachable store of firm 10.
//! let report = hub
//!     .dispatch_push(10, None, "price_list", serde_json::json!({"rev": 42}))
//!     .await;
//! println!("delivered to {}/{}", report.success_count, report.total_targets);
//!
//! // The persistence layer drains store-originated events.
//! while let Some(event) = applier_rx.recv().await {
//!     println!("{} from store {}", event.data_type, event.store_id);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod intake;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod topology;
pub mod transport;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{HubSettings, ServerSettings, SyncSettings, DEFAULT_PORT};
pub use dispatcher::{
    DeliveryFailure, EnvelopeTemplate, SyncDispatcher, SyncReport, SyncTargetResult,
};
pub use error::{HubError, HubResult};
pub use hub::SyncHub;
pub use intake::SyncIntake;
pub use protocol::{
    ErrorFrame, InboundFrame, OutboundFrame, SyncEnvelope, SyncKind, WelcomeFrame,
    ACTION_MERKEZ_TO_SUBE,
};
pub use registry::{ConnectionInfo, ConnectionRegistry, ConnectionStatus};
pub use server::{HqServer, HqServerHandle};
pub use transport::StoreTransport;
pub use types::{FirmId, InboundSync, StoreId};
