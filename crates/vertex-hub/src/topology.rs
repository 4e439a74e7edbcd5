//! # Topology Index
//!
//! Organizational mapping from firm to its declared member stores.
//!
//! Membership is established the first time a store registers under a firm
//! and survives disconnects: the index answers "which stores belong to this
//! firm", never "which stores are reachable". Reachability is always
//! computed at read time by intersecting declared membership with the live
//! connection table, so a stale cached online list can never leak out.
//!
//! The index lives inside the registry's critical section so that admission
//! and declaration happen atomically. It exposes no removal operation.

use std::collections::{BTreeSet, HashMap};

use crate::types::{FirmId, StoreId};

/// Firm → declared stores. Plain bookkeeping; synchronization is provided
/// by the owning registry.
#[derive(Debug, Default)]
pub struct TopologyIndex {
    firms: HashMap<FirmId, BTreeSet<StoreId>>,
}

impl TopologyIndex {
    pub fn new() -> Self {
        TopologyIndex::default()
    }

    /// Declares `store_id` as a member of `firm_id`. Idempotent.
    pub fn declare(&mut self, firm_id: FirmId, store_id: StoreId) {
        self.firms.entry(firm_id).or_default().insert(store_id);
    }

    /// Returns the declared store set for a firm. A superset of whatever is
    /// currently online; empty for an unknown firm.
    pub fn declared_stores(&self, firm_id: FirmId) -> BTreeSet<StoreId> {
        self.firms.get(&firm_id).cloned().unwrap_or_default()
    }

    /// Number of firms with at least one declared store.
    pub fn firm_count(&self) -> usize {
        self.firms.len()
    }
}
