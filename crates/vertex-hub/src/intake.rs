//! # Inbound Sync Intake
//!
//! Receives store-originated sync events arriving over established
//! connections and hands them to the applier.
//!
//! The applier is the persistence/business-logic layer and lives outside
//! this crate; it drains the bounded channel returned at hub construction.
//! Acceptance here means "accepted for processing" only: no retries, no
//! acknowledgement protocol.
//!
//! A store must not inject events under a connection it does not own, so
//! the intake validates that the sending store is currently registered and
//! drops anything else before it can reach the applier.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{HubError, HubResult};
use crate::registry::ConnectionRegistry;
use crate::types::{FirmId, InboundSync, StoreId};

/// Routes validated store events onto the applier channel.
#[derive(Debug, Clone)]
pub struct SyncIntake {
    registry: Arc<ConnectionRegistry>,
    applier_tx: mpsc::Sender<InboundSync>,
}

impl SyncIntake {
    /// Creates an intake and the receiving half of the applier channel.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        capacity: usize,
    ) -> (SyncIntake, mpsc::Receiver<InboundSync>) {
        let (applier_tx, applier_rx) = mpsc::channel(capacity);
        (
            SyncIntake {
                registry,
                applier_tx,
            },
            applier_rx,
        )
    }

    /// Accepts one store-originated sync event.
    ///
    /// Rejects events from stores with no active registry entry; a
    /// rejected event is reported to the caller and never forwarded. An
    /// accepted event refreshes the store's activity timestamp and passes
    /// through to the applier unchanged.
    pub async fn ingest(
        &self,
        store_id: StoreId,
        firm_id: FirmId,
        data_type: String,
        payload: serde_json::Value,
    ) -> HubResult<()> {
        if !self.registry.is_online(store_id).await {
            warn!(store_id, data_type = %data_type, "Rejected sync event from unregistered store");
            return Err(HubError::UnauthorizedIngest { store_id });
        }

        self.registry.touch(store_id).await;

        let event = InboundSync {
            store_id,
            firm_id,
            data_type,
            payload,
            received_at: Utc::now(),
        };
        debug!(store_id, firm_id, data_type = %event.data_type, "Accepted sync event");

        self.applier_tx
            .send(event)
            .await
            .map_err(|_| HubError::ChannelClosed("applier"))
    }
}
