//! Edge attribution: per-engine fill-quality forensics.
//!
//! On submit the predicted edge is recorded; on fill the realized result is
//! compared. The leak (predicted minus realized) and its latency
//! sensitivity (leak times ACK latency) are tracked as per-engine EWMAs.
//! An engine that persistently leaks edge is killed through the PnL
//! governor before the loss compounds.
//!
//! A single-engine kill is not a system event: cancel federation is NOT
//! fired from here. In-flight orders from the killed engine resolve via the
//! normal lifecycle.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::control::pnl::PnLGovernor;

const DEFAULT_ALPHA: f64 = 0.05;
const DEFAULT_MAX_EDGE_LEAK_BPS: f64 = 1.5;
const DEFAULT_MAX_LATENCY_SENS: f64 = 0.002;
const MIN_FILLS_FOR_KILL: u64 = 5;

#[derive(Debug, Clone, Default)]
pub struct EngineEdgeStats {
    pub ewma_edge_leak: f64,
    pub ewma_latency_sens: f64,
    pub win_rate: f64,
    pub trades: u64,
}

#[derive(Debug, Clone)]
struct PendingSubmit {
    engine_id: String,
    predicted_edge_bps: f64,
    #[allow(dead_code)]
    queue_pos: f64,
}

#[derive(Default)]
struct EdgeInner {
    pending: HashMap<String, PendingSubmit>,
    engines: HashMap<String, EngineEdgeStats>,
}

pub struct EdgeAttribution {
    alpha: f64,
    max_edge_leak_bps: f64,
    max_latency_sens: f64,
    inner: Mutex<EdgeInner>,
}

impl Default for EdgeAttribution {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALPHA,
            DEFAULT_MAX_EDGE_LEAK_BPS,
            DEFAULT_MAX_LATENCY_SENS,
        )
    }
}

impl EdgeAttribution {
    pub fn new(alpha: f64, max_edge_leak_bps: f64, max_latency_sens: f64) -> Self {
        Self {
            alpha,
            max_edge_leak_bps,
            max_latency_sens,
            inner: Mutex::new(EdgeInner::default()),
        }
    }

    /// Record submit-time context for a pending order.
    pub fn on_submit(
        &self,
        order_id: &str,
        engine_id: &str,
        predicted_edge_bps: f64,
        queue_pos: f64,
    ) {
        self.inner.lock().pending.insert(
            order_id.to_string(),
            PendingSubmit {
                engine_id: engine_id.to_string(),
                predicted_edge_bps,
                queue_pos,
            },
        );
    }

    /// Fill event: compute the leak and update the engine's EWMAs. Kills the
    /// engine through `pnl.block_engine` when a threshold is breached after
    /// enough fills to rule out noise.
    pub fn on_fill(
        &self,
        order_id: &str,
        realized_pnl_bps: f64,
        latency_us: f64,
        pnl: &PnLGovernor,
    ) {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.pending.remove(order_id) else {
            return;
        };

        let s = inner
            .engines
            .entry(pending.engine_id.clone())
            .or_default();

        let leak = pending.predicted_edge_bps - realized_pnl_bps;
        // Positive leak on a slow link is the toxic combination.
        let latency_factor = latency_us * leak;

        s.ewma_edge_leak = (1.0 - self.alpha) * s.ewma_edge_leak + self.alpha * leak;
        s.ewma_latency_sens =
            (1.0 - self.alpha) * s.ewma_latency_sens + self.alpha * latency_factor;

        let win = realized_pnl_bps > 0.0;
        s.win_rate =
            (s.win_rate * s.trades as f64 + if win { 1.0 } else { 0.0 }) / (s.trades + 1) as f64;
        s.trades += 1;

        if s.trades >= MIN_FILLS_FOR_KILL
            && (s.ewma_edge_leak > self.max_edge_leak_bps
                || s.ewma_latency_sens > self.max_latency_sens)
        {
            warn!(
                engine_id = %pending.engine_id,
                leak = s.ewma_edge_leak,
                latency_sens = s.ewma_latency_sens,
                trades = s.trades,
                "edge leak threshold breached, blocking engine"
            );
            pnl.block_engine(&pending.engine_id);
        }
    }

    /// Cancel cleanup: free the pending slot for an order that resolved
    /// without filling (TTL, cancel-replace, reject, expire). Without this
    /// the pending map grows for the life of the process.
    pub fn on_cancel(&self, order_id: &str) {
        self.inner.lock().pending.remove(order_id);
    }

    pub fn stats(&self, engine_id: &str) -> EngineEdgeStats {
        self.inner
            .lock()
            .engines
            .get(engine_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}
