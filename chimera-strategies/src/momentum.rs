//! Momentum burst engine: chases real directional moves on one symbol.

use chimera_core::core::types::OrderIntent;
use chimera_core::strategy::{Engine, MarketTick};

/// Relative momentum threshold. An absolute dollar threshold on BTC is tick
/// noise; 15 bps only fires on real momentum moves.
const BURST_THRESHOLD_BPS: f64 = 15.0;

/// Engine-local position cap per direction. The risk governor enforces the
/// hard ceiling; this keeps the engine from even proposing runaway
/// accumulation.
const MAX_POS: f64 = 0.05;

const ORDER_QTY: f64 = 0.01;

pub struct MomentumBurst {
    engine_id: String,
    symbol: String,
    last_mid: f64,
}

impl MomentumBurst {
    pub fn new(symbol: &str) -> Self {
        Self {
            engine_id: format!("{}_BURST", &symbol[..3.min(symbol.len())]),
            symbol: symbol.to_string(),
            last_mid: 0.0,
        }
    }
}

impl Engine for MomentumBurst {
    fn id(&self) -> &str {
        &self.engine_id
    }

    fn on_tick(&mut self, tick: &MarketTick, intents: &mut Vec<OrderIntent>) {
        if tick.symbol != self.symbol {
            return;
        }

        let mid = tick.mid();
        if self.last_mid == 0.0 {
            self.last_mid = mid;
            return;
        }

        let delta_bps = (mid - self.last_mid) / self.last_mid * 10_000.0;
        self.last_mid = mid;

        if tick.position.abs() >= MAX_POS {
            return;
        }

        if delta_bps > BURST_THRESHOLD_BPS {
            intents.push(OrderIntent {
                engine_id: self.engine_id.clone(),
                symbol: tick.symbol.clone(),
                signed_qty: ORDER_QTY,
                limit_price: tick.ask,
            });
        } else if delta_bps < -BURST_THRESHOLD_BPS {
            intents.push(OrderIntent {
                engine_id: self.engine_id.clone(),
                symbol: tick.symbol.clone(),
                signed_qty: -ORDER_QTY,
                limit_price: tick.bid,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(mid: f64, position: f64) -> MarketTick {
        MarketTick {
            symbol: "BTCUSDT".to_string(),
            bid: mid - 0.005,
            ask: mid + 0.005,
            bid_size: 1.0,
            ask_size: 1.0,
            ts_ns: 0,
            position,
        }
    }

    #[test]
    fn test_first_tick_only_seeds() {
        let mut e = MomentumBurst::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 0.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_upward_burst_buys_at_ask() {
        let mut e = MomentumBurst::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 0.0), &mut out);
        // +20 bps
        e.on_tick(&tick(100.2, 0.0), &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].signed_qty > 0.0);
        assert!((out[0].limit_price - 100.205).abs() < 1e-9);
    }

    #[test]
    fn test_downward_burst_sells_at_bid() {
        let mut e = MomentumBurst::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 0.0), &mut out);
        e.on_tick(&tick(99.8, 0.0), &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].signed_qty < 0.0);
    }

    #[test]
    fn test_noise_does_not_fire() {
        let mut e = MomentumBurst::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 0.0), &mut out);
        // +5 bps: below threshold
        e.on_tick(&tick(100.05, 0.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_position_cap_suppresses() {
        let mut e = MomentumBurst::new("BTCUSDT");
        let mut out = Vec::new();
        e.on_tick(&tick(100.0, 0.05), &mut out);
        e.on_tick(&tick(100.5, 0.05), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_ignores_other_symbols() {
        let mut e = MomentumBurst::new("BTCUSDT");
        let mut out = Vec::new();
        let mut t = tick(100.0, 0.0);
        t.symbol = "ETHUSDT".to_string();
        e.on_tick(&t, &mut out);
        let mut t2 = tick(110.0, 0.0);
        t2.symbol = "ETHUSDT".to_string();
        e.on_tick(&t2, &mut out);
        assert!(out.is_empty());
    }
}
