//! # Connection Registry
//!
//! The live connection table: every store currently connected to
//! headquarters, keyed by store ID, plus the firm topology it keeps in
//! lockstep.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Connection Registry                                │
//! │                                                                         │
//! │   admit/remove ──┐                                                      │
//! │   (listener)     │        ┌──────────────────────────────┐              │
//! │                  ├──────► │  RwLock<RegistryState>       │              │
//! │   send ──────────┤        │                              │              │
//! │   (dispatcher)   │        │  connections: store → Conn   │              │
//! │                  │        │  topology:    firm  → stores │              │
//! │   is_online ─────┘        └──────────────────────────────┘              │
//! │   (control surface)                                                     │
//! │                                                                         │
//! │  RULES                                                                  │
//! │  ─────                                                                  │
//! │  • at most one live connection per store; re-admission replaces         │
//! │    and closes the previous one                                          │
//! │  • the registry is the single owner of every transport handle and       │
//! │    closes each exactly once, on removal                                 │
//! │  • admission and topology declaration share one critical section        │
//! │  • a failed or timed-out send evicts the connection on the spot         │
//! │  • the lock is never held across a transport await                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HubError, HubResult};
use crate::protocol::{OutboundFrame, SyncEnvelope};
use crate::topology::TopologyIndex;
use crate::transport::{StoreTransport, TransportSendError};
use crate::types::{FirmId, StoreId};

// =============================================================================
// Connection
// =============================================================================

/// Lifecycle status of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connected and accepting sends.
    Active,
    /// Teardown in progress; no new sends are accepted.
    Closing,
}

/// A live store connection. Mutated only by the registry.
#[derive(Debug)]
struct Connection {
    /// Instance identity. A re-admitted store gets a fresh ID; eviction and
    /// teardown paths compare against it so they never tear down a
    /// replacement connection by mistake.
    conn_id: Uuid,
    store_id: StoreId,
    firm_id: FirmId,
    transport: StoreTransport,
    connected_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    status: ConnectionStatus,
}

/// Read-only snapshot of a connection, for the control surface.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub conn_id: Uuid,
    pub store_id: StoreId,
    pub firm_id: FirmId,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: ConnectionStatus,
}

// =============================================================================
// Registry
// =============================================================================

/// Connection table plus topology, guarded by a single lock.
#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<StoreId, Connection>,
    topology: TopologyIndex,
}

/// The registry of live store connections.
///
/// Shared by handle (`Arc`) between the listener, the dispatcher, and the
/// intake. Internally synchronized; readers observe consistent snapshots,
/// never a connection mid-construction or mid-teardown.
#[derive(Debug)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    /// Bound on a single envelope send; a breach evicts the connection.
    send_timeout: Duration,
}

impl ConnectionRegistry {
    /// Creates an empty registry with the given per-send timeout.
    pub fn new(send_timeout: Duration) -> Self {
        ConnectionRegistry {
            state: RwLock::new(RegistryState::default()),
            send_timeout,
        }
    }

    // =========================================================================
    // Admission & Removal
    // =========================================================================

    /// Registers a connection for `store_id`, replacing and closing any
    /// prior connection for the same store, and declares the store under
    /// `firm_id` in the same critical section.
    ///
    /// Replacement is defined behavior, never an error. The only failure is
    /// a transport that is already closed at admission time, which is not
    /// retried; the caller must re-admit with a fresh transport.
    ///
    /// Returns the instance ID of the new connection.
    pub async fn admit(
        &self,
        store_id: StoreId,
        firm_id: FirmId,
        transport: StoreTransport,
    ) -> HubResult<Uuid> {
        if transport.is_closed() {
            return Err(HubError::TransportClosed { store_id });
        }

        let conn_id = Uuid::new_v4();
        let now = Utc::now();
        let replaced = {
            let mut state = self.state.write().await;
            state.topology.declare(firm_id, store_id);
            state.connections.insert(
                store_id,
                Connection {
                    conn_id,
                    store_id,
                    firm_id,
                    transport,
                    connected_at: now,
                    last_activity: now,
                    status: ConnectionStatus::Active,
                },
            )
        };

        // Close the superseded transport outside the lock. Dropping it is
        // the close signal its writer task watches for.
        if let Some(mut old) = replaced {
            old.status = ConnectionStatus::Closing;
            info!(store_id, old_conn_id = %old.conn_id, "Replacing existing store connection");
            drop(old);
        }

        info!(store_id, firm_id, conn_id = %conn_id, "Store connection admitted");
        Ok(conn_id)
    }

    /// Removes the connection for `store_id`, closing its transport.
    /// Idempotent: removing an unknown store is a no-op. The topology is
    /// deliberately untouched; organizational membership survives
    /// disconnects.
    pub async fn remove(&self, store_id: StoreId) {
        let removed = {
            let mut state = self.state.write().await;
            if let Some(conn) = state.connections.get_mut(&store_id) {
                conn.status = ConnectionStatus::Closing;
            }
            state.connections.remove(&store_id)
        };

        if let Some(conn) = removed {
            info!(store_id, conn_id = %conn.conn_id, "Store connection removed");
            drop(conn);
        } else {
            debug!(store_id, "Remove for store with no live connection (no-op)");
        }
    }

    /// Removes the connection for `store_id` only if it is still the given
    /// instance. Used by teardown paths racing against replacement: the
    /// socket cleanup of a superseded connection must not remove the
    /// connection that superseded it.
    pub async fn remove_instance(&self, store_id: StoreId, conn_id: Uuid) {
        let removed = {
            let mut state = self.state.write().await;
            match state.connections.get_mut(&store_id) {
                Some(conn) if conn.conn_id == conn_id => {
                    conn.status = ConnectionStatus::Closing;
                }
                _ => return,
            }
            state.connections.remove(&store_id)
        };

        if let Some(conn) = removed {
            info!(store_id, conn_id = %conn.conn_id, "Store connection removed");
            drop(conn);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns true if the store has an active connection.
    pub async fn is_online(&self, store_id: StoreId) -> bool {
        let state = self.state.read().await;
        matches!(
            state.connections.get(&store_id),
            Some(conn) if conn.status == ConnectionStatus::Active
        )
    }

    /// Returns the stores of `firm_id` that are connected right now:
    /// declared membership intersected with the live connection table,
    /// computed at call time. Never includes a store that is not presently
    /// connected.
    pub async fn online_stores_for_firm(&self, firm_id: FirmId) -> BTreeSet<StoreId> {
        let state = self.state.read().await;
        state
            .topology
            .declared_stores(firm_id)
            .into_iter()
            .filter(|store_id| {
                matches!(
                    state.connections.get(store_id),
                    Some(conn) if conn.status == ConnectionStatus::Active
                )
            })
            .collect()
    }

    /// Returns the declared (organizational) store set for a firm,
    /// regardless of liveness.
    pub async fn declared_stores(&self, firm_id: FirmId) -> BTreeSet<StoreId> {
        self.state.read().await.topology.declared_stores(firm_id)
    }

    /// Declares a store under a firm without a connection. Idempotent.
    pub async fn declare(&self, firm_id: FirmId, store_id: StoreId) {
        self.state.write().await.topology.declare(firm_id, store_id);
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Snapshot of one connection, if present.
    pub async fn connection_info(&self, store_id: StoreId) -> Option<ConnectionInfo> {
        let state = self.state.read().await;
        state.connections.get(&store_id).map(|conn| ConnectionInfo {
            conn_id: conn.conn_id,
            store_id: conn.store_id,
            firm_id: conn.firm_id,
            connected_at: conn.connected_at,
            last_activity: conn.last_activity,
            status: conn.status,
        })
    }

    /// Refreshes the activity timestamp for a store, if connected.
    pub async fn touch(&self, store_id: StoreId) {
        let mut state = self.state.write().await;
        if let Some(conn) = state.connections.get_mut(&store_id) {
            conn.last_activity = Utc::now();
        }
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Sends one envelope to a store.
    ///
    /// Returns `NotConnected` if the store has no active connection. A
    /// transport failure or timeout evicts the connection (a dead channel
    /// is a disconnect signal) and returns the underlying error. No retry
    /// happens here; retry policy belongs to the caller.
    pub async fn send(&self, store_id: StoreId, envelope: &SyncEnvelope) -> HubResult<()> {
        // Grab the transport under the read lock, then release before the
        // await so a slow store cannot stall the registry.
        let (transport, conn_id) = {
            let state = self.state.read().await;
            match state.connections.get(&store_id) {
                Some(conn) if conn.status == ConnectionStatus::Active => {
                    (conn.transport.clone(), conn.conn_id)
                }
                _ => return Err(HubError::NotConnected { store_id }),
            }
        };

        let frame = OutboundFrame::Sync(envelope.clone());
        match transport.send(frame, self.send_timeout).await {
            Ok(()) => {
                self.touch(store_id).await;
                debug!(store_id, envelope = envelope.type_name(), "Envelope delivered to transport");
                Ok(())
            }
            Err(TransportSendError::Timeout) => {
                warn!(store_id, conn_id = %conn_id, "Send timed out; evicting connection");
                self.remove_instance(store_id, conn_id).await;
                Err(HubError::SendTimeout {
                    store_id,
                    timeout_ms: self.send_timeout.as_millis() as u64,
                })
            }
            Err(TransportSendError::Closed) => {
                warn!(store_id, conn_id = %conn_id, "Transport closed mid-send; evicting connection");
                self.remove_instance(store_id, conn_id).await;
                Err(HubError::TransportFailure {
                    store_id,
                    reason: "transport closed".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_admit_then_online() {
        let registry = test_registry();
        let (transport, _rx) = StoreTransport::channel(4);

        registry.admit(1, 10, transport).await.expect("admit");
        assert!(registry.is_online(1).await);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_admit_rejects_closed_transport() {
        let registry = test_registry();
        let (transport, rx) = StoreTransport::channel(4);
        drop(rx);

        let result = registry.admit(1, 10, transport).await;
        assert!(matches!(result, Err(HubError::TransportClosed { store_id: 1 })));
        assert!(!registry.is_online(1).await);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_and_keeps_topology() {
        let registry = test_registry();
        let (transport, _rx) = StoreTransport::channel(4);
        registry.admit(1, 10, transport).await.expect("admit");

        registry.remove(1).await;
        assert!(!registry.is_online(1).await);
        assert!(registry.online_stores_for_firm(10).await.is_empty());
        // Organizational membership survives the disconnect.
        assert_eq!(registry.declared_stores(10).await, BTreeSet::from([1]));

        // Second remove is a no-op.
        registry.remove(1).await;
        assert!(!registry.is_online(1).await);
    }

    #[tokio::test]
    async fn test_replacement_closes_prior_transport() {
        let registry = test_registry();
        let (transport_a, mut rx_a) = StoreTransport::channel(4);
        let (transport_b, mut rx_b) = StoreTransport::channel(4);

        registry.admit(1, 10, transport_a).await.expect("admit a");
        registry.admit(1, 10, transport_b).await.expect("admit b");

        // Exactly one live connection, bound to the new transport.
        assert_eq!(registry.connection_count().await, 1);
        assert!(rx_a.recv().await.is_none(), "old transport must be closed");

        let env = SyncEnvelope::push("price_list", json!({"v": 1}));
        registry.send(1, &env).await.expect("send to replacement");
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_send_to_unknown_store() {
        let registry = test_registry();
        let env = SyncEnvelope::request("stock_levels");
        let result = registry.send(99, &env).await;
        assert!(matches!(result, Err(HubError::NotConnected { store_id: 99 })));
    }

    #[tokio::test]
    async fn test_send_failure_evicts() {
        let registry = test_registry();
        let (transport, rx) = StoreTransport::channel(4);
        registry.admit(3, 10, transport).await.expect("admit");
        drop(rx); // simulate a dead socket

        let env = SyncEnvelope::push("price_list", json!({}));
        let result = registry.send(3, &env).await;
        assert!(matches!(result, Err(HubError::TransportFailure { store_id: 3, .. })));
        assert!(!registry.is_online(3).await);
    }

    #[tokio::test]
    async fn test_send_timeout_evicts() {
        let registry = test_registry();
        let (transport, _rx) = StoreTransport::channel(1);
        registry.admit(4, 10, transport).await.expect("admit");

        // First envelope fills the buffer; the second cannot be enqueued
        // because nothing drains the channel.
        let env = SyncEnvelope::push("price_list", json!({}));
        registry.send(4, &env).await.expect("first send buffers");
        let result = registry.send(4, &env).await;

        assert!(matches!(result, Err(HubError::SendTimeout { store_id: 4, .. })));
        assert!(!registry.is_online(4).await);
    }

    #[tokio::test]
    async fn test_online_stores_for_firm_is_an_intersection() {
        let registry = test_registry();
        let (t1, _rx1) = StoreTransport::channel(4);
        let (t2, _rx2) = StoreTransport::channel(4);
        let (t3, _rx3) = StoreTransport::channel(4);

        registry.admit(1, 10, t1).await.expect("admit 1");
        registry.admit(2, 10, t2).await.expect("admit 2");
        registry.admit(3, 10, t3).await.expect("admit 3");
        registry.remove(2).await;

        assert_eq!(
            registry.online_stores_for_firm(10).await,
            BTreeSet::from([1, 3])
        );
        assert_eq!(
            registry.declared_stores(10).await,
            BTreeSet::from([1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_send_refreshes_activity() {
        let registry = test_registry();
        let (transport, _rx) = StoreTransport::channel(4);
        registry.admit(5, 10, transport).await.expect("admit");

        let before = registry
            .connection_info(5)
            .await
            .expect("connected")
            .last_activity;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let env = SyncEnvelope::push("price_list", json!({}));
        registry.send(5, &env).await.expect("send");

        let after = registry
            .connection_info(5)
            .await
            .expect("connected")
            .last_activity;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_remove_instance_spares_replacement() {
        let registry = test_registry();
        let (transport_a, _rx_a) = StoreTransport::channel(4);
        let (transport_b, _rx_b) = StoreTransport::channel(4);

        let old_id = registry.admit(6, 10, transport_a).await.expect("admit a");
        registry.admit(6, 10, transport_b).await.expect("admit b");

        // Teardown of the superseded instance must not touch the new one.
        registry.remove_instance(6, old_id).await;
        assert!(registry.is_online(6).await);
    }
}
