//! # Sync Hub Façade
//!
//! Single entry point owning the registry, dispatcher, and intake.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            SyncHub                                      │
//! │                                                                         │
//! │   HQ control surface              store listener                        │
//! │   ───────────────────             ──────────────                        │
//! │   dispatch_push ────┐             admit / remove / ingest               │
//! │   dispatch_request ─┤                    │                              │
//! │   is_store_online ──┤                    │                              │
//! │   online_stores ────┤                    │                              │
//! │                     ▼                    ▼                              │
//! │              ┌────────────┐      ┌──────────────┐                       │
//! │              │ Dispatcher │ ───► │   Registry   │ ◄── SyncIntake        │
//! │              └────────────┘      │  + Topology  │          │            │
//! │                                  └──────────────┘          ▼            │
//! │                                                     applier channel     │
//! │                                                     (external layer)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hub is a single owned instance handed by reference to everything
//! that needs it. There is no ambient singleton; construct it once in the
//! composition root and share the `Arc`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::HubSettings;
use crate::dispatcher::{EnvelopeTemplate, SyncDispatcher, SyncReport};
use crate::error::HubResult;
use crate::intake::SyncIntake;
use crate::registry::{ConnectionInfo, ConnectionRegistry};
use crate::transport::StoreTransport;
use crate::types::{FirmId, InboundSync, StoreId};

/// The store-to-headquarters synchronization hub.
pub struct SyncHub {
    settings: HubSettings,
    registry: Arc<ConnectionRegistry>,
    dispatcher: SyncDispatcher,
    intake: SyncIntake,
}

impl SyncHub {
    /// Builds a hub from settings.
    ///
    /// Returns the hub and the receiving half of the applier channel; the
    /// embedder hands the receiver to the persistence layer, which drains
    /// store-originated events from it.
    pub fn new(settings: HubSettings) -> (Arc<SyncHub>, mpsc::Receiver<InboundSync>) {
        let registry = Arc::new(ConnectionRegistry::new(settings.send_timeout()));
        let dispatcher = SyncDispatcher::new(Arc::clone(&registry), settings.sync.fanout_limit);
        let (intake, applier_rx) = SyncIntake::new(Arc::clone(&registry), settings.sync.applier_capacity);

        let hub = Arc::new(SyncHub {
            settings,
            registry,
            dispatcher,
            intake,
        });
        (hub, applier_rx)
    }

    /// Hub settings, as constructed.
    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// The shared connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    // =========================================================================
    // Control Surface (headquarters-facing)
    // =========================================================================

    /// Pushes data to a firm's stores. With `stores`, the explicit target
    /// set is used verbatim; otherwise every currently reachable store of
    /// the firm is targeted.
    pub async fn dispatch_push(
        &self,
        firm_id: FirmId,
        stores: Option<BTreeSet<StoreId>>,
        data_type: &str,
        data: serde_json::Value,
    ) -> SyncReport {
        let template = EnvelopeTemplate::push(data_type, data);
        self.dispatcher.dispatch(firm_id, stores, &template).await
    }

    /// Asks a firm's stores to send data back. The report covers delivery
    /// of the request only; replies arrive later as store-originated
    /// events on the applier channel.
    pub async fn dispatch_request(
        &self,
        firm_id: FirmId,
        stores: Option<BTreeSet<StoreId>>,
        data_type: &str,
    ) -> SyncReport {
        let template = EnvelopeTemplate::request(data_type);
        self.dispatcher.dispatch(firm_id, stores, &template).await
    }

    /// Returns true if the store is connected right now.
    pub async fn is_store_online(&self, store_id: StoreId) -> bool {
        self.registry.is_online(store_id).await
    }

    /// Returns the firm's currently reachable stores.
    pub async fn online_stores(&self, firm_id: FirmId) -> Vec<StoreId> {
        self.registry
            .online_stores_for_firm(firm_id)
            .await
            .into_iter()
            .collect()
    }

    /// Returns the firm's declared stores, online or not.
    pub async fn declared_stores(&self, firm_id: FirmId) -> Vec<StoreId> {
        self.registry
            .declared_stores(firm_id)
            .await
            .into_iter()
            .collect()
    }

    /// Snapshot of one store's connection, if present.
    pub async fn connection_info(&self, store_id: StoreId) -> Option<ConnectionInfo> {
        self.registry.connection_info(store_id).await
    }

    /// Number of live store connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    // =========================================================================
    // Listener-facing pass-throughs
    // =========================================================================

    /// Registers a store connection. See [`ConnectionRegistry::admit`].
    pub async fn admit(
        &self,
        store_id: StoreId,
        firm_id: FirmId,
        transport: StoreTransport,
    ) -> HubResult<Uuid> {
        self.registry.admit(store_id, firm_id, transport).await
    }

    /// Removes a store connection. Idempotent.
    pub async fn remove(&self, store_id: StoreId) {
        self.registry.remove(store_id).await;
    }

    /// Accepts one store-originated sync event. See [`SyncIntake::ingest`].
    pub async fn ingest(
        &self,
        store_id: StoreId,
        firm_id: FirmId,
        data_type: String,
        payload: serde_json::Value,
    ) -> HubResult<()> {
        self.intake.ingest(store_id, firm_id, data_type, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_hub() -> (Arc<SyncHub>, mpsc::Receiver<InboundSync>) {
        SyncHub::new(HubSettings::default())
    }

    #[tokio::test]
    async fn test_push_reaches_admitted_store() {
        let (hub, _applier_rx) = test_hub();
        let (transport, mut rx) = StoreTransport::channel(4);
        hub.admit(1, 10, transport).await.expect("admit");

        let report = hub
            .dispatch_push(10, None, "price_list", json!({"rev": 3}))
            .await;
        assert_eq!(report.success_count, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_online_listing_tracks_liveness() {
        let (hub, _applier_rx) = test_hub();
        let (t1, _rx1) = StoreTransport::channel(4);
        let (t2, _rx2) = StoreTransport::channel(4);
        hub.admit(1, 10, t1).await.expect("admit 1");
        hub.admit(2, 10, t2).await.expect("admit 2");
        hub.remove(2).await;

        assert!(hub.is_store_online(1).await);
        assert!(!hub.is_store_online(2).await);
        assert_eq!(hub.online_stores(10).await, vec![1]);
        assert_eq!(hub.declared_stores(10).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_ingest_flows_to_applier_channel() {
        let (hub, mut applier_rx) = test_hub();
        let (transport, _rx) = StoreTransport::channel(4);
        hub.admit(7, 10, transport).await.expect("admit");

        hub.ingest(7, 10, "stock_levels".into(), json!({"qty": 2}))
            .await
            .expect("accepted");

        let event = applier_rx.recv().await.expect("forwarded");
        assert_eq!(event.store_id, 7);
        assert_eq!(event.payload["qty"], 2);
    }
}
