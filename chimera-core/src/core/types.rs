//! Domain types for the execution and safety spine.
//!
//! Prices and quantities are `f64` end to end. Signed quantities encode side
//! (positive = buy, negative = sell) at the intent boundary; inside the order
//! state machine side and magnitude are carried separately so that remaining
//! quantity is structurally non-negative.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock nanoseconds since the epoch.
#[inline]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Order side (Buy or Sell)
///
/// Single byte enum for minimal size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Side implied by a signed quantity. Zero is treated as a buy; callers
    /// reject zero quantities before this matters.
    #[inline]
    pub fn from_signed_qty(qty: f64) -> Self {
        if qty < 0.0 {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    #[inline]
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order lifecycle status.
///
/// Transitions only move forward:
/// `New → Acked → PartiallyFilled* → Filled`, any non-terminal → `Canceled`,
/// and `New → Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    New = 0,
    Acked = 1,
    PartiallyFilled = 2,
    Filled = 3,
    Canceled = 4,
    Rejected = 5,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Acked | OrderStatus::PartiallyFilled
        )
    }
}

/// Static per-symbol exchange metadata. Process-immutable once the
/// [`SymbolTable`] is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Minimum quantity increment. Submitted sizes are floored to a multiple.
    pub lot_size: f64,
    /// Minimum order notional (price * qty) accepted by the venue.
    pub min_notional: f64,
    /// Price decimal precision for wire formatting.
    pub price_decimals: u32,
    /// Quantity decimal precision for wire formatting.
    pub qty_decimals: u32,
    /// Maximum absolute position the risk governor permits.
    pub max_position: f64,
}

/// Immutable registry of tradable symbols and their metadata.
///
/// Built once at startup; every component holds a shared reference. There is
/// no mutation path after construction.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, SymbolMeta>,
}

impl SymbolTable {
    pub fn new(metas: Vec<SymbolMeta>) -> Self {
        let symbols = metas.into_iter().map(|m| (m.symbol.clone(), m)).collect();
        Self { symbols }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolMeta> {
        self.symbols.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolMeta> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Default shadow-validation universe. Metadata mirrors Binance spot
    /// filters for the three majors.
    pub fn default_universe() -> Self {
        Self::new(vec![
            SymbolMeta {
                symbol: "BTCUSDT".to_string(),
                tick_size: 0.01,
                lot_size: 0.00001,
                min_notional: 1.0,
                price_decimals: 2,
                qty_decimals: 5,
                max_position: 0.05,
            },
            SymbolMeta {
                symbol: "ETHUSDT".to_string(),
                tick_size: 0.01,
                lot_size: 0.0001,
                min_notional: 1.0,
                price_decimals: 2,
                qty_decimals: 4,
                max_position: 0.5,
            },
            SymbolMeta {
                symbol: "SOLUSDT".to_string(),
                tick_size: 0.01,
                lot_size: 0.001,
                min_notional: 1.0,
                price_decimals: 2,
                qty_decimals: 3,
                max_position: 5.0,
            },
        ])
    }
}

/// An engine's order proposal. Ephemeral: consumed by the router and either
/// materialized into an [`OrderRecord`] or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub engine_id: String,
    pub symbol: String,
    /// Signed: positive = buy, negative = sell.
    pub signed_qty: f64,
    pub limit_price: f64,
}

/// Outbound order frame handed to the exchange adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSubmit {
    pub client_id: String,
    pub symbol: String,
    pub price: f64,
    /// Signed: sign encodes side.
    pub qty: f64,
}

/// The authoritative per-order record held by the order state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Process-unique, engine-namespaced (`<engine_id>_<seq>`).
    pub client_id: String,
    /// Assigned exactly once, on `New → Acked`. Never mutated after.
    pub exchange_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    /// Magnitude originally submitted.
    pub original_qty: f64,
    /// Magnitude still unfilled. `>= 0` always; `0` iff `Filled`.
    pub remaining_qty: f64,
    pub engine_id: String,
    pub status: OrderStatus,
    pub created_ns: u64,
    pub last_update_ns: u64,
}

impl OrderRecord {
    pub fn new(
        client_id: String,
        symbol: String,
        side: Side,
        price: f64,
        qty: f64,
        engine_id: String,
    ) -> Self {
        let ts = now_ns();
        Self {
            client_id,
            exchange_id: None,
            symbol,
            side,
            price,
            original_qty: qty,
            remaining_qty: qty,
            engine_id,
            status: OrderStatus::New,
            created_ns: ts,
            last_update_ns: ts,
        }
    }

    /// Signed remaining quantity (positive = buy side).
    #[inline]
    pub fn signed_remaining(&self) -> f64 {
        self.side.sign() * self.remaining_qty
    }

    #[inline]
    pub fn filled_qty(&self) -> f64 {
        self.original_qty - self.remaining_qty
    }
}

/// Per-symbol top-of-book snapshot. `valid` is false until the first book
/// update arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopOfBook {
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub ts_ns: u64,
    pub valid: bool,
}

impl TopOfBook {
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }

    #[inline]
    pub fn spread_bps(&self) -> f64 {
        let mid = self.mid();
        if mid <= 0.0 {
            return 0.0;
        }
        (self.ask - self.bid) / mid * 10_000.0
    }
}

/// Lifecycle events delivered by the user feed. All events for a single
/// order arrive on one connection and are applied on the execution thread,
/// so per-order ordering is inherited from arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Ack {
        client_id: String,
        exchange_id: String,
    },
    Fill {
        exchange_id: String,
        qty: f64,
        price: f64,
    },
    Cancel {
        exchange_id: String,
    },
    /// Venue-side time-in-force expiry. The state graph has no expired
    /// state; it resolves as a cancel.
    Expire {
        exchange_id: String,
    },
    Reject {
        client_id: String,
    },
}
