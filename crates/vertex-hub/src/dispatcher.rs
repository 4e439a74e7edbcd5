//! # Sync Dispatcher
//!
//! Orchestrates one logical sync operation across one or more target
//! stores and aggregates the per-target outcomes into a single report.
//!
//! ## Fan-out Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Dispatcher                                 │
//! │                                                                         │
//! │  dispatch(firm, targets?, template)                                     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  resolve targets ──── explicit set (verbatim, may be offline)           │
//! │        │         └─── or declared ∩ online for the firm                 │
//! │        ▼                                                                │
//! │  ┌───────────┐   one stamped envelope per target                        │
//! │  │ Store #1  │◄──┐                                                      │
//! │  │ Store #2  │◄──┼── concurrent sends, bounded, independent             │
//! │  │ Store #3  │◄──┘   (one failure never aborts the others)              │
//! │  └───────────┘                                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  SyncReport { success_count, total_targets, per_target }                │
//! │                                                                         │
//! │  A dispatch always returns a report. Zero targets is a valid,           │
//! │  successful no-op. No ordering is guaranteed between targets.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::HubError;
use crate::protocol::{SyncEnvelope, SyncKind};
use crate::registry::ConnectionRegistry;
use crate::types::{FirmId, StoreId};

// =============================================================================
// Envelope Template
// =============================================================================

/// Blueprint for the envelopes of one sync operation.
///
/// The dispatcher stamps one fresh envelope per target from the template,
/// so each target gets the construction-time timestamp of its own send.
#[derive(Debug, Clone)]
pub struct EnvelopeTemplate {
    kind: SyncKind,
    data_type: String,
    payload: Option<serde_json::Value>,
}

impl EnvelopeTemplate {
    /// Template for a data push; headquarters supplies the payload.
    pub fn push(data_type: &str, data: serde_json::Value) -> Self {
        EnvelopeTemplate {
            kind: SyncKind::DataPush,
            data_type: data_type.to_string(),
            payload: Some(data),
        }
    }

    /// Template for a data request; the store answers asynchronously over
    /// its own inbound channel.
    pub fn request(data_type: &str) -> Self {
        EnvelopeTemplate {
            kind: SyncKind::DataRequest,
            data_type: data_type.to_string(),
            payload: None,
        }
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Returns the business payload schema identifier.
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Constructs one immutable envelope stamped with the current time.
    pub fn stamp(&self) -> SyncEnvelope {
        match self.kind {
            SyncKind::DataPush => SyncEnvelope::push(
                &self.data_type,
                self.payload.clone().unwrap_or(serde_json::Value::Null),
            ),
            SyncKind::DataRequest => SyncEnvelope::request(&self.data_type),
        }
    }
}

// =============================================================================
// Report Types
// =============================================================================

/// Why a per-target delivery failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// The target store had no live connection.
    NotConnected,
    /// The send did not complete within the bound; the connection was
    /// evicted.
    Timeout { timeout_ms: u64 },
    /// Channel-level failure; the connection was evicted.
    Transport { reason: String },
}

impl From<HubError> for DeliveryFailure {
    fn from(err: HubError) -> Self {
        match err {
            HubError::NotConnected { .. } => DeliveryFailure::NotConnected,
            HubError::SendTimeout { timeout_ms, .. } => DeliveryFailure::Timeout { timeout_ms },
            other => DeliveryFailure::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// Delivery outcome for a single target store.
#[derive(Debug, Clone, Serialize)]
pub struct SyncTargetResult {
    pub store_id: StoreId,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryFailure>,
}

impl SyncTargetResult {
    fn delivered(store_id: StoreId) -> Self {
        SyncTargetResult {
            store_id,
            delivered: true,
            error: None,
        }
    }

    fn failed(store_id: StoreId, failure: DeliveryFailure) -> Self {
        SyncTargetResult {
            store_id,
            delivered: false,
            error: Some(failure),
        }
    }
}

/// Aggregate outcome of one dispatch. Created fresh per invocation and
/// owned by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Targets with `delivered = true`.
    pub success_count: usize,
    /// Size of the resolved target set; every target was attempted exactly
    /// once.
    pub total_targets: usize,
    /// One entry per target, sorted by store ID.
    pub per_target: Vec<SyncTargetResult>,
}

impl SyncReport {
    fn from_results(mut per_target: Vec<SyncTargetResult>) -> Self {
        per_target.sort_by_key(|result| result.store_id);
        SyncReport {
            success_count: per_target.iter().filter(|r| r.delivered).count(),
            total_targets: per_target.len(),
            per_target,
        }
    }

    /// True when every resolved target was delivered (vacuously true for
    /// an empty target set).
    pub fn all_delivered(&self) -> bool {
        self.success_count == self.total_targets
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Fans one sync operation out to its resolved targets.
#[derive(Debug, Clone)]
pub struct SyncDispatcher {
    registry: Arc<ConnectionRegistry>,
    /// Upper bound on concurrent in-flight sends within one dispatch.
    fanout_limit: usize,
}

impl SyncDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, fanout_limit: usize) -> Self {
        SyncDispatcher {
            registry,
            fanout_limit: fanout_limit.max(1),
        }
    }

    /// Runs one sync operation against a firm.
    ///
    /// With `explicit_targets` the set is used verbatim; callers may
    /// intentionally target an offline store, which simply yields a
    /// `delivered = false` entry. Without it, targets resolve to the firm's
    /// currently reachable stores.
    ///
    /// Sends to distinct targets are independent and concurrently bounded
    /// by the fan-out limit. Every outcome is recorded; nothing is dropped
    /// and no per-target failure aborts the operation.
    pub async fn dispatch(
        &self,
        firm_id: FirmId,
        explicit_targets: Option<BTreeSet<StoreId>>,
        template: &EnvelopeTemplate,
    ) -> SyncReport {
        let targets = match explicit_targets {
            Some(targets) => targets,
            None => self.registry.online_stores_for_firm(firm_id).await,
        };

        debug!(
            firm_id,
            targets = targets.len(),
            kind = ?template.kind(),
            data_type = template.data_type(),
            "Dispatching sync operation"
        );

        let results: Vec<SyncTargetResult> = stream::iter(targets.into_iter().map(|store_id| {
            let registry = Arc::clone(&self.registry);
            let envelope = template.stamp();
            async move {
                match registry.send(store_id, &envelope).await {
                    Ok(()) => SyncTargetResult::delivered(store_id),
                    Err(err) => SyncTargetResult::failed(store_id, err.into()),
                }
            }
        }))
        .buffer_unordered(self.fanout_limit)
        .collect()
        .await;

        let report = SyncReport::from_results(results);
        info!(
            firm_id,
            success = report.success_count,
            total = report.total_targets,
            data_type = template.data_type(),
            "Sync dispatch complete"
        );
        report
    }
}
