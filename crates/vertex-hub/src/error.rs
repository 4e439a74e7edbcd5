//! # Hub Error Types
//!
//! Error types for the sync hub.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hub Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Delivery     │  │    Intake       │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotConnected   │  │  Unauthorized   │  │  InvalidMessage         │ │
//! │  │  Transport      │  │  Ingest         │  │  Serialization          │ │
//! │  │  SendTimeout    │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Configuration  │  │  Internal                                   │  │
//! │  │                 │  │                                             │  │
//! │  │  InvalidConfig  │  │  ChannelClosed, Bind                        │  │
//! │  │  ConfigLoad     │  │                                             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::StoreId;

/// Result type alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Hub error type covering all sync-hub failures.
///
/// ## Design Principles
/// - Delivery errors are per-target facts, captured in a `SyncReport`
///   rather than aborting a fan-out
/// - Transport-level failures evict the offending connection
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum HubError {
    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// Target store has no live connection.
    #[error("Store {store_id} is not connected")]
    NotConnected { store_id: StoreId },

    /// Send or receive failed at the channel level. The offending
    /// connection is evicted before this error is returned.
    #[error("Transport failure for store {store_id}: {reason}")]
    TransportFailure { store_id: StoreId, reason: String },

    /// Send did not complete within the configured bound. Treated the same
    /// as a transport failure: the connection is evicted.
    #[error("Send to store {store_id} timed out after {timeout_ms}ms")]
    SendTimeout { store_id: StoreId, timeout_ms: u64 },

    /// The transport handed to `admit` was already closed.
    #[error("Transport for store {store_id} is already closed")]
    TransportClosed { store_id: StoreId },

    // =========================================================================
    // Intake Errors
    // =========================================================================
    /// Inbound sync event from a store with no active registry entry.
    /// The event is dropped, never forwarded to the applier.
    #[error("Rejected sync event from unregistered store {store_id}")]
    UnauthorizedIngest { store_id: StoreId },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Invalid wire message received.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A new connection failed to complete the hello handshake.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Failed to serialize or deserialize a wire message.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid hub configuration.
    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoad(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// An internal channel was closed.
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Failed to bind the listener.
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for HubError {
    fn from(err: toml::de::Error) -> Self {
        HubError::ConfigLoad(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl HubError {
    /// Returns true if this error signals that the connection is gone and
    /// must be evicted from the registry.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            HubError::TransportFailure { .. }
                | HubError::SendTimeout { .. }
                | HubError::TransportClosed { .. }
        )
    }

    /// Returns true if this is a per-target delivery failure that belongs
    /// in a report rather than aborting the operation.
    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self,
            HubError::NotConnected { .. }
                | HubError::TransportFailure { .. }
                | HubError::SendTimeout { .. }
                | HubError::TransportClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_errors() {
        assert!(HubError::TransportFailure {
            store_id: 1,
            reason: "channel closed".into()
        }
        .is_disconnect());
        assert!(HubError::SendTimeout {
            store_id: 1,
            timeout_ms: 5000
        }
        .is_disconnect());

        assert!(!HubError::NotConnected { store_id: 1 }.is_disconnect());
        assert!(!HubError::UnauthorizedIngest { store_id: 7 }.is_disconnect());
    }

    #[test]
    fn test_delivery_errors() {
        assert!(HubError::NotConnected { store_id: 99 }.is_delivery_error());
        assert!(!HubError::InvalidConfig("bad".into()).is_delivery_error());
    }

    #[test]
    fn test_error_display() {
        let err = HubError::SendTimeout {
            store_id: 12,
            timeout_ms: 5000,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("5000"));
    }
}
