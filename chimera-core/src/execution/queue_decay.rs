//! Queue Decay Governor: adverse-selection defense for live orders.
//!
//! Every live order gets a decay clock. Hard TTL breach (any live order
//! older than 5 s) fires cancel federation outright - fills normally happen
//! in under a second, so a five-second survivor means the exchange, the
//! link, or this process is broken. Past the soft TTL, the order's queue
//! position is re-estimated against the current book and combined with ACK
//! latency into an urgency score; a breach there means low fill probability
//! on a slow link - adverse selection territory - and also fires the
//! federation.
//!
//! Live only; in shadow there is nothing on the exchange to decay.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::core::types::now_ns;
use crate::runtime::context::Context;

#[derive(Debug, Clone, Copy)]
pub struct QueueDecayConfig {
    pub hard_ttl_ns: u64,
    pub soft_ttl_ns: u64,
    /// Latency amplification factor in the urgency score.
    pub latency_k: f64,
    pub urgency_threshold: f64,
}

impl Default for QueueDecayConfig {
    fn default() -> Self {
        Self {
            hard_ttl_ns: 5_000_000_000,
            soft_ttl_ns: 1_000_000_000,
            latency_k: 0.002,
            urgency_threshold: 12.0,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedOrder {
    submit_ns: u64,
    symbol: String,
    price: f64,
    is_buy: bool,
}

pub struct QueueDecayGovernor {
    config: QueueDecayConfig,
    live: Mutex<HashMap<String, TrackedOrder>>,
}

impl Default for QueueDecayGovernor {
    fn default() -> Self {
        Self::new(QueueDecayConfig::default())
    }
}

impl QueueDecayGovernor {
    pub fn new(config: QueueDecayConfig) -> Self {
        Self {
            config,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Track a live submission. No-op unless live trading is enabled.
    pub fn on_order_submitted(
        &self,
        ctx: &Context,
        client_id: &str,
        symbol: &str,
        price: f64,
        is_buy: bool,
    ) {
        if !ctx.arm.live_enabled() {
            return;
        }
        self.live.lock().insert(
            client_id.to_string(),
            TrackedOrder {
                submit_ns: now_ns(),
                symbol: symbol.to_string(),
                price,
                is_buy,
            },
        );
    }

    /// Order resolved through its normal lifecycle - stop tracking.
    pub fn on_order_done(&self, client_id: &str) {
        self.live.lock().remove(client_id);
    }

    pub fn tracked(&self) -> usize {
        self.live.lock().len()
    }

    /// Execution-tick poll. May fire cancel federation; returns early when
    /// it does - the sweep makes further per-order checks moot.
    pub fn poll(&self, ctx: &Context) {
        if !ctx.arm.live_enabled() {
            return;
        }

        let now = now_ns();
        let latency_us = ctx.latency.last_latency_us();

        let mut live = self.live.lock();
        if live.is_empty() {
            return;
        }

        let mut resolved = Vec::new();
        for (client_id, tracked) in live.iter() {
            // Resolved between our submit and this poll (fill/cancel on the
            // user stream) - clean up tracking.
            if !ctx.osm.is_open(client_id) {
                resolved.push(client_id.clone());
                continue;
            }

            let age_ns = now.saturating_sub(tracked.submit_ns);

            if age_ns > self.config.hard_ttl_ns {
                warn!(
                    client_id = %client_id,
                    age_ms = age_ns / 1_000_000,
                    "hard TTL breach, firing cancel federation"
                );
                ctx.cancel_fed.trigger("QUEUE_HARD_TTL");
                return;
            }

            if age_ns > self.config.soft_ttl_ns {
                let probe_qty = ctx
                    .symbols
                    .get(&tracked.symbol)
                    .map(|m| m.lot_size)
                    .unwrap_or(0.0005);
                let est =
                    ctx.queue
                        .estimate(&tracked.symbol, tracked.price, probe_qty, tracked.is_buy);

                let fill_prob_inv = 1.0 / (est.expected_fill_prob + 1e-6);
                let latency_factor = 1.0 + latency_us * self.config.latency_k;
                let urgency = fill_prob_inv * latency_factor;

                if urgency > self.config.urgency_threshold {
                    warn!(
                        client_id = %client_id,
                        age_ms = age_ns / 1_000_000,
                        fill_prob = est.expected_fill_prob,
                        latency_us,
                        urgency,
                        "urgency breach, firing cancel federation"
                    );
                    ctx.cancel_fed.trigger("QUEUE_URGENCY");
                    return;
                }
            }
        }

        for client_id in resolved {
            live.remove(&client_id);
        }
    }
}
