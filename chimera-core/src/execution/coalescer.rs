//! Cancel/Replace Coalescer: per-engine, per-symbol pending-order
//! deduplication.
//!
//! The router consults this before inserting a new order. If the same engine
//! already has a pending order on the same symbol at a different price, the
//! router cancels the prior and installs the new one - cancel-replace
//! semantics without relying on exchange-native modify.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Pending order as the coalescer tracks it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub engine_id: String,
    pub symbol: String,
    pub price: f64,
    /// Signed: sign encodes side.
    pub qty: f64,
}

#[derive(Default)]
pub struct CancelReplaceCoalescer {
    pending: Mutex<HashMap<String, PendingOrder>>,
}

impl CancelReplaceCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, client_id: &str, order: PendingOrder) {
        self.pending.lock().insert(client_id.to_string(), order);
    }

    pub fn get(&self, client_id: &str) -> Option<PendingOrder> {
        self.pending.lock().get(client_id).cloned()
    }

    pub fn clear(&self, client_id: &str) {
        self.pending.lock().remove(client_id);
    }

    pub fn clear_all(&self) {
        self.pending.lock().clear();
    }

    /// The single existing pending entry for `(engine, symbol)`, if any.
    pub fn find_by_engine_symbol(
        &self,
        engine_id: &str,
        symbol: &str,
    ) -> Option<(String, PendingOrder)> {
        self.pending
            .lock()
            .iter()
            .find(|(_, o)| o.engine_id == engine_id && o.symbol == symbol)
            .map(|(id, o)| (id.clone(), o.clone()))
    }

    /// Snapshot of pending client ids - the router's shadow-fill poll
    /// iterates these.
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
