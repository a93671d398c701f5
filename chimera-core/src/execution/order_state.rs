//! Order State Machine: the canonical authority on per-order status.
//!
//! Primary storage maps `client_id → OrderRecord`. A secondary index maps
//! `exchange_id → client_id` so fill and cancel events (which arrive keyed by
//! exchange id) resolve in O(1) instead of a linear scan - the scan was the
//! original hot-path bottleneck. Both maps are updated in lockstep under one
//! mutex.
//!
//! Records never move backward through the state graph:
//! `New → Acked → PartiallyFilled* → Filled`, any non-terminal → `Canceled`,
//! `New → Rejected`. The secondary index holds an entry exactly while the
//! order is `Acked`/`PartiallyFilled`; terminal transitions remove it.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::errors::OrderError;
use crate::core::types::{now_ns, OrderRecord, OrderStatus};

/// Quantity below which a remaining balance counts as fully filled.
const QTY_EPS: f64 = 1e-12;

#[derive(Default)]
struct OsmInner {
    orders: HashMap<String, OrderRecord>,
    exch_to_client: HashMap<String, String>,
}

#[derive(Default)]
pub struct OrderStateMachine {
    inner: Mutex<OsmInner>,
}

impl OrderStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record in `New`. No exchange id yet.
    pub fn on_new(&self, rec: OrderRecord) -> Result<(), OrderError> {
        let mut inner = self.inner.lock();
        if inner.orders.contains_key(&rec.client_id) {
            return Err(OrderError::DuplicateClientId(rec.client_id));
        }
        let mut rec = rec;
        rec.status = OrderStatus::New;
        rec.exchange_id = None;
        rec.last_update_ns = now_ns();
        inner.orders.insert(rec.client_id.clone(), rec);
        Ok(())
    }

    /// `New → Acked`. Assigns the exchange id (exactly once) and populates
    /// the secondary index.
    pub fn on_ack(&self, client_id: &str, exchange_id: &str) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(rec) = inner.orders.get_mut(client_id) else {
            return;
        };
        if rec.status != OrderStatus::New {
            return;
        }
        rec.exchange_id = Some(exchange_id.to_string());
        rec.status = OrderStatus::Acked;
        rec.last_update_ns = now_ns();
        inner
            .exch_to_client
            .insert(exchange_id.to_string(), client_id.to_string());
    }

    /// Apply a fill keyed by exchange id. Transitions to `PartiallyFilled`
    /// or `Filled`; removes the index entry once filled.
    pub fn on_fill(&self, exchange_id: &str, filled_qty: f64) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(client_id) = inner.exch_to_client.get(exchange_id).cloned() else {
            return;
        };
        let Some(rec) = inner.orders.get_mut(&client_id) else {
            return;
        };
        if !rec.status.is_open() {
            return;
        }

        rec.remaining_qty = (rec.remaining_qty - filled_qty.abs()).max(0.0);
        rec.status = if rec.remaining_qty <= QTY_EPS {
            rec.remaining_qty = 0.0;
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        rec.last_update_ns = now_ns();

        if rec.status == OrderStatus::Filled {
            inner.exch_to_client.remove(exchange_id);
        }
    }

    /// Cancel keyed by exchange id (post-ACK path).
    pub fn on_cancel(&self, exchange_id: &str) {
        let mut inner = self.inner.lock();
        let Some(client_id) = inner.exch_to_client.get(exchange_id).cloned() else {
            return;
        };
        if let Some(rec) = inner.orders.get_mut(&client_id) {
            if rec.status.is_open() {
                rec.status = OrderStatus::Canceled;
                rec.last_update_ns = now_ns();
            }
        }
        inner.exch_to_client.remove(exchange_id);
    }

    /// Cancel keyed by client id - the pre-ACK path used by the router's
    /// cancel-replace dedup, where no exchange id exists yet. If the order
    /// had been ACKed after all, the secondary index is cleaned too.
    pub fn on_cancel_by_client_id(&self, client_id: &str) {
        let mut inner = self.inner.lock();
        let Some(rec) = inner.orders.get_mut(client_id) else {
            return;
        };
        if !rec.status.is_open() {
            return;
        }
        let exch = rec.exchange_id.clone();
        rec.status = OrderStatus::Canceled;
        rec.last_update_ns = now_ns();
        if let Some(exch_id) = exch {
            inner.exch_to_client.remove(&exch_id);
        }
    }

    /// `New → Rejected`. No exchange id on reject, nothing to clean.
    pub fn on_reject(&self, client_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.orders.get_mut(client_id) {
            if rec.status == OrderStatus::New {
                rec.status = OrderStatus::Rejected;
                rec.last_update_ns = now_ns();
            }
        }
    }

    pub fn is_open(&self, client_id: &str) -> bool {
        self.inner
            .lock()
            .orders
            .get(client_id)
            .map(|r| r.status.is_open())
            .unwrap_or(false)
    }

    pub fn get(&self, client_id: &str) -> Result<OrderRecord, OrderError> {
        self.inner
            .lock()
            .orders
            .get(client_id)
            .cloned()
            .ok_or_else(|| OrderError::NotFound(client_id.to_string()))
    }

    /// O(1) fetch via the secondary index. `None` if the exchange id is
    /// unknown or its order already left the index.
    pub fn get_by_exchange_id(&self, exchange_id: &str) -> Option<OrderRecord> {
        let inner = self.inner.lock();
        let client_id = inner.exch_to_client.get(exchange_id)?;
        inner.orders.get(client_id).cloned()
    }

    /// Client ids of all open orders.
    pub fn open_client_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .orders
            .values()
            .filter(|r| r.status.is_open())
            .map(|r| r.client_id.clone())
            .collect()
    }

    /// Snapshot hook: copy of every record.
    pub fn dump_orders(&self) -> Vec<OrderRecord> {
        self.inner.lock().orders.values().cloned().collect()
    }

    /// Boot hook: reinsert a record, rebuilding both indices.
    pub fn restore_order(&self, rec: OrderRecord) {
        let mut inner = self.inner.lock();
        if let Some(exch_id) = &rec.exchange_id {
            if rec.status.is_open() {
                inner
                    .exch_to_client
                    .insert(exch_id.clone(), rec.client_id.clone());
            }
        }
        inner.orders.insert(rec.client_id.clone(), rec);
    }

    /// Remove all terminal records. Returns the number removed. Called
    /// periodically from the router poll to bound memory.
    pub fn purge_terminal(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.orders.len();
        inner.orders.retain(|_, r| !r.status.is_terminal());
        before - inner.orders.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().orders.is_empty()
    }

    #[cfg(test)]
    fn index_contains(&self, exchange_id: &str) -> bool {
        self.inner.lock().exch_to_client.contains_key(exchange_id)
    }
}
