//! Queue position model: per-symbol top-of-book plus fill-probability
//! estimates for prospective orders.
//!
//! Single writer (the market feed), many readers (engines and the router).
//! One mutex over the whole map; every operation is O(1) and never does I/O
//! inside the critical section.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::types::TopOfBook;

/// Persisted per-symbol book state (also the snapshot section layout).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueState {
    pub bid_price: f64,
    pub bid_depth: f64,
    pub ask_price: f64,
    pub ask_depth: f64,
    pub last_update_ns: u64,
}

/// Queue-position estimate for a prospective order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueEstimate {
    /// Visible quantity ahead of the order at its price level.
    pub ahead_qty: f64,
    /// The order's own quantity, queued behind the visible depth.
    pub behind_qty: f64,
    /// Expected fill probability, capped at 0.85: no passive order is ever
    /// treated as certain to fill.
    pub expected_fill_prob: f64,
}

/// Passive-fill probability ceiling.
pub const FILL_PROB_CEILING: f64 = 0.85;

pub struct QueueModel {
    books: Mutex<HashMap<String, QueueState>>,
}

impl Default for QueueModel {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueModel {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrite the symbol's book entry with a fresh top-of-book.
    pub fn on_book_update(
        &self,
        symbol: &str,
        bid_price: f64,
        bid_depth: f64,
        ask_price: f64,
        ask_depth: f64,
        ts_ns: u64,
    ) {
        let mut books = self.books.lock();
        let b = books.entry(symbol.to_string()).or_default();
        b.bid_price = bid_price;
        b.bid_depth = bid_depth;
        b.ask_price = ask_price;
        b.ask_depth = ask_depth;
        b.last_update_ns = ts_ns;
    }

    /// Snapshot read of the symbol's top-of-book. `valid` is false if no
    /// update has ever arrived.
    pub fn top(&self, symbol: &str) -> TopOfBook {
        let books = self.books.lock();
        match books.get(symbol) {
            None => TopOfBook::default(),
            Some(b) => TopOfBook {
                bid: b.bid_price,
                ask: b.ask_price,
                bid_size: b.bid_depth,
                ask_size: b.ask_depth,
                ts_ns: b.last_update_ns,
                valid: b.last_update_ns != 0,
            },
        }
    }

    /// Estimate queue position and fill probability for an order at `price`.
    ///
    /// An order that betters the opposite touch is marketable: nothing ahead,
    /// probability at the ceiling. A passive order joining at or behind its
    /// own touch queues behind the displayed depth there; an order pricing
    /// inside the spread opens a fresh level with nothing ahead.
    pub fn estimate(&self, symbol: &str, price: f64, qty: f64, is_buy: bool) -> QueueEstimate {
        let books = self.books.lock();
        let mut est = QueueEstimate {
            behind_qty: qty,
            ..Default::default()
        };

        let Some(b) = books.get(symbol) else {
            return est;
        };

        est.ahead_qty = if is_buy {
            if price >= b.ask_price {
                0.0 // marketable
            } else if price <= b.bid_price {
                b.bid_depth
            } else {
                0.0 // inside the spread: new level
            }
        } else if price <= b.bid_price {
            0.0
        } else if price >= b.ask_price {
            b.ask_depth
        } else {
            0.0
        };

        est.expected_fill_prob = (FILL_PROB_CEILING / (1.0 + est.ahead_qty)).min(1.0);
        est
    }

    /// Snapshot hook: copy of all book states.
    pub fn dump(&self) -> HashMap<String, QueueState> {
        self.books.lock().clone()
    }

    /// Boot hook: restore one symbol's state.
    pub fn restore(&self, symbol: &str, state: QueueState) {
        self.books.lock().insert(symbol.to_string(), state);
    }

    pub fn clear(&self) {
        self.books.lock().clear();
    }
}
