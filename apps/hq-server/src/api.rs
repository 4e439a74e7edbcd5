//! # Headquarters Control Surface
//!
//! HTTP JSON routes the headquarters side uses to drive the hub:
//!
//! ```text
//! POST /api/sync/push              push data to a firm's stores
//! POST /api/sync/request           ask a firm's stores to send data back
//! GET  /api/stores/{id}/online     liveness of one store
//! GET  /api/firms/{id}/stores      online + declared stores of a firm
//! ```
//!
//! Dispatch endpoints always answer with a full report, even when every
//! target was unreachable; partial delivery is data, not an error.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use vertex_hub::{FirmId, StoreId, SyncHub, SyncReport};

use crate::error::ApiError;

// =============================================================================
// Request / Response Bodies
// =============================================================================

/// Body of a push dispatch.
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub firm_id: FirmId,
    /// Explicit targets; omit to reach every currently online store of the
    /// firm. Targets may be offline, which shows up in the report.
    #[serde(default)]
    pub store_ids: Option<BTreeSet<StoreId>>,
    pub data_type: String,
    pub data: serde_json::Value,
}

/// Body of a request dispatch.
#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub firm_id: FirmId,
    #[serde(default)]
    pub store_ids: Option<BTreeSet<StoreId>>,
    pub data_type: String,
}

#[derive(Debug, Serialize)]
pub struct StoreOnlineResponse {
    pub store_id: StoreId,
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct FirmStoresResponse {
    pub firm_id: FirmId,
    pub online: Vec<StoreId>,
    pub declared: Vec<StoreId>,
}

// =============================================================================
// Router
// =============================================================================

/// Builds the control-surface router.
pub fn router(hub: Arc<SyncHub>) -> Router {
    Router::new()
        .route("/api/sync/push", post(dispatch_push))
        .route("/api/sync/request", post(dispatch_request))
        .route("/api/stores/{store_id}/online", get(store_online))
        .route("/api/firms/{firm_id}/stores", get(firm_stores))
        .with_state(hub)
}

// =============================================================================
// Handlers
// =============================================================================

async fn dispatch_push(
    State(hub): State<Arc<SyncHub>>,
    Json(body): Json<PushRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    if body.data_type.is_empty() {
        return Err(ApiError::InvalidRequest("data_type is required".into()));
    }

    info!(firm_id = body.firm_id, data_type = %body.data_type, "Push dispatch requested");
    let report = hub
        .dispatch_push(body.firm_id, body.store_ids, &body.data_type, body.data)
        .await;
    Ok(Json(report))
}

async fn dispatch_request(
    State(hub): State<Arc<SyncHub>>,
    Json(body): Json<PullRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    if body.data_type.is_empty() {
        return Err(ApiError::InvalidRequest("data_type is required".into()));
    }

    info!(firm_id = body.firm_id, data_type = %body.data_type, "Data request dispatch requested");
    let report = hub
        .dispatch_request(body.firm_id, body.store_ids, &body.data_type)
        .await;
    Ok(Json(report))
}

async fn store_online(
    State(hub): State<Arc<SyncHub>>,
    Path(store_id): Path<StoreId>,
) -> Json<StoreOnlineResponse> {
    Json(StoreOnlineResponse {
        store_id,
        online: hub.is_store_online(store_id).await,
    })
}

async fn firm_stores(
    State(hub): State<Arc<SyncHub>>,
    Path(firm_id): Path<FirmId>,
) -> Json<FirmStoresResponse> {
    Json(FirmStoresResponse {
        firm_id,
        online: hub.online_stores(firm_id).await,
        declared: hub.declared_stores(firm_id).await,
    })
}
