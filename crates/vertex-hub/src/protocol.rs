//! # Sync Wire Protocol
//!
//! JSON message types exchanged between headquarters and stores.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Protocol Messages                             │
//! │                                                                         │
//! │  HANDSHAKE FLOW                                                        │
//! │  ──────────────                                                        │
//! │  STORE ───► { type: "hello", store_id, firm_id }                       │
//! │  HQ    ◄─── { type: "welcome", server_time }                           │
//! │                                                                         │
//! │  DATA PUSH (HQ → STORE)                                                │
//! │  ──────────────────────                                                │
//! │  HQ    ───► { type: "data_sync", action: "merkez_to_sube",             │
//! │              data_type, data, timestamp }                               │
//! │                                                                         │
//! │  DATA REQUEST (HQ → STORE)                                             │
//! │  ─────────────────────────                                             │
//! │  HQ    ───► { type: "data_request", data_type, timestamp }             │
//! │  (the store answers later over its own inbound channel)                │
//! │                                                                         │
//! │  STORE-ORIGINATED SYNC (STORE → HQ)                                    │
//! │  ──────────────────────────────────                                    │
//! │  STORE ───► { type: "data_sync", data_type, data, timestamp }          │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  HQ    ───► { type: "error", code, message }                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Messages are internally tagged JSON objects discriminated by `type`.
//! Envelopes are immutable once constructed; the timestamp is stamped at
//! construction time and never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FirmId, StoreId};

/// Direction tag carried by push envelopes: headquarters to store.
pub const ACTION_MERKEZ_TO_SUBE: &str = "merkez_to_sube";

// =============================================================================
// Sync Envelope
// =============================================================================

/// The kind of a sync envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Headquarters pushes data to stores.
    DataPush,
    /// Headquarters asks stores to send data back.
    DataRequest,
}

/// A sync envelope sent from headquarters to a store.
///
/// One envelope is sent per target per operation. Push envelopes carry a
/// payload; request envelopes do not (the store responds asynchronously
/// over its own inbound channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEnvelope {
    /// Data push: headquarters supplies the payload.
    DataSync {
        /// Direction tag, always [`ACTION_MERKEZ_TO_SUBE`] for store-bound
        /// envelopes.
        action: String,
        /// Business payload schema identifier.
        data_type: String,
        /// Opaque business payload.
        data: serde_json::Value,
        /// When the envelope was constructed.
        timestamp: DateTime<Utc>,
    },

    /// Data request: the store is expected to respond with its own
    /// store-originated sync event.
    DataRequest {
        /// Business payload schema identifier being requested.
        data_type: String,
        /// When the envelope was constructed.
        timestamp: DateTime<Utc>,
    },
}

impl SyncEnvelope {
    /// Creates a push envelope stamped with the current time.
    pub fn push(data_type: &str, data: serde_json::Value) -> Self {
        SyncEnvelope::DataSync {
            action: ACTION_MERKEZ_TO_SUBE.to_string(),
            data_type: data_type.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Creates a request envelope stamped with the current time.
    pub fn request(data_type: &str) -> Self {
        SyncEnvelope::DataRequest {
            data_type: data_type.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Returns the envelope kind.
    pub fn kind(&self) -> SyncKind {
        match self {
            SyncEnvelope::DataSync { .. } => SyncKind::DataPush,
            SyncEnvelope::DataRequest { .. } => SyncKind::DataRequest,
        }
    }

    /// Returns the business payload schema identifier.
    pub fn data_type(&self) -> &str {
        match self {
            SyncEnvelope::DataSync { data_type, .. } => data_type,
            SyncEnvelope::DataRequest { data_type, .. } => data_type,
        }
    }

    /// Returns the construction timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SyncEnvelope::DataSync { timestamp, .. } => *timestamp,
            SyncEnvelope::DataRequest { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the message type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncEnvelope::DataSync { .. } => "data_sync",
            SyncEnvelope::DataRequest { .. } => "data_request",
        }
    }

    /// Serializes to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Control Frames (HQ → store)
// =============================================================================

/// Sent after a store's hello has been accepted and the connection is
/// registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "welcome")]
pub struct WelcomeFrame {
    /// Server time for clock reference.
    pub server_time: DateTime<Utc>,
}

impl WelcomeFrame {
    pub fn now() -> Self {
        WelcomeFrame {
            server_time: Utc::now(),
        }
    }
}

/// Error frame sent to a store before closing or rejecting a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "error")]
pub struct ErrorFrame {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorFrame {
    pub fn new(code: &str, message: &str) -> Self {
        ErrorFrame {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Any frame the hub writes to a store connection.
///
/// Serializes transparently to the inner frame; the writer task turns these
/// into WebSocket text messages.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Sync(SyncEnvelope),
    Welcome(WelcomeFrame),
    Error(ErrorFrame),
}

impl OutboundFrame {
    /// Serializes to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<SyncEnvelope> for OutboundFrame {
    fn from(env: SyncEnvelope) -> Self {
        OutboundFrame::Sync(env)
    }
}

// =============================================================================
// Inbound Frames (store → HQ)
// =============================================================================

/// Frames a store may send to headquarters over an established connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// First frame on a new connection; identifies the store.
    Hello { store_id: StoreId, firm_id: FirmId },

    /// Store-originated sync event, routed to the intake.
    DataSync {
        data_type: String,
        data: serde_json::Value,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl InboundFrame {
    /// Deserializes from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
