//! Shared identifier and event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a retail store (branch).
pub type StoreId = i64;

/// Identifier of a firm (tenant/company) owning a set of stores.
pub type FirmId = i64;

/// A store-originated sync event accepted by the intake and handed to the
/// applier. Fields pass through unchanged from the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSync {
    /// Store the event arrived from.
    pub store_id: StoreId,

    /// Firm the store belongs to.
    pub firm_id: FirmId,

    /// Business payload schema identifier, e.g. "price_list" or
    /// "stock_levels".
    pub data_type: String,

    /// Opaque business payload.
    pub payload: serde_json::Value,

    /// When the hub accepted the event.
    pub received_at: DateTime<Utc>,
}
