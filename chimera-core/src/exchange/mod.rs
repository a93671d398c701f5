//! Exchange adapter interface.
//!
//! The core never parses wire formats: adapters deliver already-parsed book
//! updates and lifecycle events (via injected feed closures) and expose the
//! non-blocking order path plus the truth queries consumed by the truth loop
//! and the cold-start reconciler.

use crate::core::errors::AdapterError;
use crate::core::types::OrderSubmit;

/// Exchange-reported position.
#[derive(Debug, Clone, PartialEq)]
pub struct VenuePosition {
    pub symbol: String,
    pub qty: f64,
}

/// Exchange-reported open order.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOpenOrder {
    pub client_id: String,
    pub symbol: String,
    pub price: f64,
    pub qty: f64,
}

/// Per-venue order path + truth queries.
///
/// `send_order`/`cancel_order` are non-blocking: they queue the frame and
/// return whether it was accepted into the adapter's pipeline. Delivery
/// outcomes arrive as lifecycle events on the user feed.
///
/// Implementations must be `Send + Sync`; the router and the truth loop call
/// in from different threads (each with its own underlying transport handle,
/// since REST handles are typically not thread-safe).
pub trait ExchangeAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn send_order(&self, order: &OrderSubmit) -> bool;

    fn cancel_order(&self, client_id: &str) -> bool;

    fn get_all_positions(&self) -> Result<Vec<VenuePosition>, AdapterError>;

    fn get_all_open_orders(&self) -> Result<Vec<VenueOpenOrder>, AdapterError>;
}
