//! Quasi-passive queue joiner: maker-only quoting around an EMA of mid,
//! with inventory skew and a book-imbalance filter. Only quotes when the
//! spread is workable and the market is range-bound.

use std::collections::HashMap;

use chimera_core::core::types::OrderIntent;
use chimera_core::strategy::{Engine, MarketTick};

const EMA_ALPHA: f64 = 0.1;
const EDGE_BPS: f64 = 1.0;
/// Inventory skew coefficient: each unit of position shifts the effective
/// edge against adding to it.
const INV_K: f64 = 2.0;
const MAX_POS: f64 = 0.05;
const BASE_QTY: f64 = 0.005;

/// Workable spread band: tighter than 0.5 bps there is no edge to capture,
/// wider than 3 bps the market is dislocated and passive quoting is picking
/// up pennies in front of a move.
const MIN_SPREAD_BPS: f64 = 0.5;
const MAX_SPREAD_BPS: f64 = 3.0;

/// Trend filter: EMA-slope magnitude above which the market is trending and
/// market making bleeds (selling into uptrends, buying into downtrends).
const TREND_ALPHA: f64 = 0.2;
const TREND_THRESHOLD_BPS: f64 = 5.0;

#[derive(Default)]
struct SymbolState {
    ema_mid: f64,
    trend_ema: f64,
    initialized: bool,
}

pub struct QueueJoiner {
    engine_id: String,
    symbol: String,
    state: HashMap<String, SymbolState>,
}

impl QueueJoiner {
    pub fn new(symbol: &str) -> Self {
        Self {
            engine_id: "QJOIN".to_string(),
            symbol: symbol.to_string(),
            state: HashMap::new(),
        }
    }

    fn is_trending(st: &mut SymbolState, mid: f64) -> bool {
        if st.trend_ema == 0.0 {
            st.trend_ema = mid;
            return false;
        }
        let prev = st.trend_ema;
        st.trend_ema = TREND_ALPHA * mid + (1.0 - TREND_ALPHA) * prev;
        let slope_bps = (st.trend_ema - prev) / prev * 10_000.0;
        slope_bps.abs() > TREND_THRESHOLD_BPS
    }
}

impl Engine for QueueJoiner {
    fn id(&self) -> &str {
        &self.engine_id
    }

    fn on_tick(&mut self, tick: &MarketTick, intents: &mut Vec<OrderIntent>) {
        if tick.symbol != self.symbol {
            return;
        }
        if tick.position.abs() >= MAX_POS {
            return;
        }

        let mid = tick.mid();
        if mid <= 0.0 {
            return;
        }
        let spread_bps = (tick.ask - tick.bid) / mid * 10_000.0;
        if !(MIN_SPREAD_BPS..=MAX_SPREAD_BPS).contains(&spread_bps) {
            return;
        }

        let st = self.state.entry(tick.symbol.clone()).or_default();
        if Self::is_trending(st, mid) {
            return;
        }

        if !st.initialized {
            st.ema_mid = mid;
            st.initialized = true;
            return;
        }
        st.ema_mid = EMA_ALPHA * mid + (1.0 - EMA_ALPHA) * st.ema_mid;

        let dev_bps = (mid - st.ema_mid) / st.ema_mid * 10_000.0;
        let inv_skew_bps = tick.position * INV_K * 10.0;
        let eff_edge_bps = EDGE_BPS + dev_bps - inv_skew_bps;

        // Book imbalance as a queue-position proxy.
        let depth_ratio = tick.bid_size / (tick.ask_size + 1e-6);
        let queue_signal = if depth_ratio > 1.5 {
            1.0
        } else if depth_ratio < 0.67 {
            -1.0
        } else {
            0.0
        };

        if eff_edge_bps > EDGE_BPS && queue_signal <= 0.0 {
            // Price above EMA and the bid is not stacked: join the bid to sell.
            intents.push(OrderIntent {
                engine_id: self.engine_id.clone(),
                symbol: tick.symbol.clone(),
                signed_qty: -BASE_QTY,
                limit_price: tick.bid,
            });
        } else if eff_edge_bps < -EDGE_BPS && queue_signal >= 0.0 {
            intents.push(OrderIntent {
                engine_id: self.engine_id.clone(),
                symbol: tick.symbol.clone(),
                signed_qty: BASE_QTY,
                limit_price: tick.ask,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(mid: f64, spread_bps: f64, bid_size: f64, ask_size: f64) -> MarketTick {
        let half = mid * spread_bps / 10_000.0 / 2.0;
        MarketTick {
            symbol: "BTCUSDT".to_string(),
            bid: mid - half,
            ask: mid + half,
            bid_size,
            ask_size,
            ts_ns: 0,
            position: 0.0,
        }
    }

    #[test]
    fn test_quiet_outside_spread_band() {
        let mut e = QueueJoiner::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 0.1, 1.0, 1.0), &mut out); // too tight
        e.on_tick(&tick(100.0, 10.0, 1.0, 1.0), &mut out); // too wide
        assert!(out.is_empty());
    }

    #[test]
    fn test_sells_above_ema_when_bid_not_stacked() {
        let mut e = QueueJoiner::new("BTCUSDT");
        let mut out = Vec::new();
        // Seed trend + EMA state on a flat tape.
        for _ in 0..5 {
            e.on_tick(&tick(100.0, 1.0, 1.0, 1.0), &mut out);
        }
        assert!(out.is_empty());
        // Small pop above the EMA, balanced book.
        e.on_tick(&tick(100.02, 1.0, 1.0, 1.0), &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].signed_qty < 0.0);
    }

    #[test]
    fn test_position_cap_suppresses() {
        let mut e = QueueJoiner::new("BTCUSDT");
        let mut out = Vec::new();
        for _ in 0..5 {
            e.on_tick(&tick(100.0, 1.0, 1.0, 1.0), &mut out);
        }
        let mut t = tick(100.02, 1.0, 1.0, 1.0);
        t.position = MAX_POS;
        e.on_tick(&t, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_trend_filter_suppresses() {
        let mut e = QueueJoiner::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 1.0, 1.0, 1.0), &mut out);
        // A violent jump: the trend EMA slope breaches the threshold and
        // the joiner stands down.
        e.on_tick(&tick(101.0, 1.0, 1.0, 1.0), &mut out);
        assert!(out.is_empty());
    }
}
