//! Mean reversion engine: fade deviations from a rolling mid-price mean.
//! Runs on every symbol it receives; each symbol keeps its own window.

use std::collections::{HashMap, VecDeque};

use chimera_core::core::types::OrderIntent;
use chimera_core::strategy::{Engine, MarketTick};

const WINDOW: usize = 20;

/// Relative deviation threshold. 30 bps is a real dislocation on the
/// majors; dollar thresholds fire on noise.
const DEVIATION_BPS: f64 = 30.0;

const MAX_POS: f64 = 0.05;
const ORDER_QTY: f64 = 0.01;

#[derive(Default)]
struct SymbolState {
    window: VecDeque<f64>,
    sum: f64,
}

pub struct MeanReversion {
    engine_id: String,
    state: HashMap<String, SymbolState>,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self::new()
    }
}

impl MeanReversion {
    pub fn new() -> Self {
        Self {
            engine_id: "MEAN_REV".to_string(),
            state: HashMap::new(),
        }
    }
}

impl Engine for MeanReversion {
    fn id(&self) -> &str {
        &self.engine_id
    }

    fn on_tick(&mut self, tick: &MarketTick, intents: &mut Vec<OrderIntent>) {
        let mid = tick.mid();
        let st = self.state.entry(tick.symbol.clone()).or_default();

        st.window.push_back(mid);
        st.sum += mid;
        if st.window.len() > WINDOW {
            if let Some(front) = st.window.pop_front() {
                st.sum -= front;
            }
        }
        if st.window.len() < WINDOW {
            return;
        }

        let mean = st.sum / st.window.len() as f64;
        let diff_bps = (mid - mean) / mean * 10_000.0;

        if tick.position.abs() >= MAX_POS {
            return;
        }

        if diff_bps > DEVIATION_BPS {
            // Above the mean: sell the reversion.
            intents.push(OrderIntent {
                engine_id: self.engine_id.clone(),
                symbol: tick.symbol.clone(),
                signed_qty: -ORDER_QTY,
                limit_price: tick.bid,
            });
        } else if diff_bps < -DEVIATION_BPS {
            intents.push(OrderIntent {
                engine_id: self.engine_id.clone(),
                symbol: tick.symbol.clone(),
                signed_qty: ORDER_QTY,
                limit_price: tick.ask,
            });
        }
    }
}
