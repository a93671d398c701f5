//! Strategy contract and runner.
//!
//! Engines are black boxes: they see [`MarketTick`]s and produce
//! [`OrderIntent`]s. The runner owns the poll loop, the kill gates, the
//! per-symbol submission cooldown, and client-id generation; engines never
//! touch the context or the router directly, which keeps them portable and
//! testable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::core::types::{now_ns, OrderIntent};
use crate::execution::router::ExecutionRouter;
use crate::runtime::context::Context;

/// Per-symbol market snapshot handed to engines, with the engine's current
/// net position injected so it can cap its own sizing.
#[derive(Debug, Clone)]
pub struct MarketTick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub ts_ns: u64,
    pub position: f64,
}

impl MarketTick {
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }
}

/// A strategy engine. Implementations produce zero or more intents per tick.
pub trait Engine: Send {
    fn id(&self) -> &str;

    fn on_tick(&mut self, tick: &MarketTick, intents: &mut Vec<OrderIntent>);
}

/// Process-wide client-id sequence, shared by every runner. The engine id
/// already namespaces the prefix; the shared counter removes any residual
/// collision window between runners waking from the same sleep.
static CLIENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Minimum spacing between submissions on one symbol from one runner.
/// The throttle would catch the excess anyway; gating here avoids
/// constructing and risk-checking dead orders at poll rate. Advanced on
/// every intent that clears the window, accepted or not - otherwise a
/// blocked intent regenerates at full poll rate forever.
const SUBMIT_COOLDOWN: Duration = Duration::from_millis(50);

const POLL_SLEEP: Duration = Duration::from_micros(100);

pub struct StrategyRunner {
    engine: Box<dyn Engine>,
    symbols: Vec<String>,
    last_submit_ns: Vec<u64>,
}

impl StrategyRunner {
    pub fn new(engine: Box<dyn Engine>, symbols: Vec<String>) -> Self {
        let n = symbols.len();
        Self {
            engine,
            symbols,
            last_submit_ns: vec![0; n],
        }
    }

    pub fn engine_id(&self) -> String {
        self.engine.id().to_string()
    }

    fn make_client_id(&self) -> String {
        format!(
            "{}_{}",
            self.engine.id(),
            CLIENT_SEQ.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Blocking poll loop. Runs on the execution core; exits when the
    /// context stops running.
    pub fn run(&mut self, ctx: &Context, router: &ExecutionRouter) {
        let mut engine_dead = false;

        while ctx.is_running() {
            // System kill gate: drift latched means every engine stops for
            // good. Sleep out the rest of the process lifetime.
            if ctx.risk.killed() {
                info!(engine_id = %self.engine.id(), "system killed, engine stopping");
                while ctx.is_running() {
                    std::thread::sleep(Duration::from_millis(100));
                }
                break;
            }

            // Per-engine kill gate: this engine stops generating intents,
            // the others continue. Log once on the transition.
            if !engine_dead && !ctx.pnl.allow_strategy(self.engine.id()) {
                engine_dead = true;
                info!(engine_id = %self.engine.id(), "engine killed, no further intents");
            }
            if engine_dead {
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }

            self.poll_once(ctx, router);
            std::thread::sleep(POLL_SLEEP);
        }
    }

    /// One pass over every symbol. Split out so tests can drive ticks
    /// without a thread.
    pub fn poll_once(&mut self, ctx: &Context, router: &ExecutionRouter) {
        let mut intents = Vec::new();
        self.poll_symbols(ctx, router, &mut intents);
    }

    fn poll_symbols(
        &mut self,
        ctx: &Context,
        router: &ExecutionRouter,
        intents: &mut Vec<OrderIntent>,
    ) {
        for i in 0..self.symbols.len() {
            let symbol = &self.symbols[i];
            let tob = ctx.queue.top(symbol);
            if !tob.valid {
                continue;
            }

            let tick = MarketTick {
                symbol: symbol.clone(),
                bid: tob.bid,
                ask: tob.ask,
                bid_size: tob.bid_size,
                ask_size: tob.ask_size,
                ts_ns: now_ns(),
                position: ctx.risk.get_position(symbol),
            };

            intents.clear();
            self.engine.on_tick(&tick, intents);

            for intent in intents.iter() {
                if tick.ts_ns.saturating_sub(self.last_submit_ns[i])
                    < SUBMIT_COOLDOWN.as_nanos() as u64
                {
                    continue;
                }
                // Cooldown advances on any intent that cleared the window,
                // accepted or blocked.
                self.last_submit_ns[i] = tick.ts_ns;

                // Risk pre-check, live only: shadow positions accumulate
                // against the ceilings with no reset path, so the router's
                // queue-probability gate is the sole shadow admission.
                if ctx.arm.live_enabled()
                    && !ctx
                        .risk
                        .pre_check(&intent.symbol, intent.limit_price, intent.signed_qty.abs())
                {
                    debug!(engine_id = %self.engine.id(), symbol = %intent.symbol, "risk pre-check block");
                    continue;
                }

                let client_id = self.make_client_id();
                let accepted = router.submit_order(
                    ctx,
                    &client_id,
                    &intent.symbol,
                    intent.limit_price,
                    intent.signed_qty,
                    &intent.engine_id,
                );
                if accepted {
                    debug!(
                        engine_id = %self.engine.id(),
                        symbol = %intent.symbol,
                        price = intent.limit_price,
                        qty = intent.signed_qty,
                        "intent submitted"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_unique_across_runners() {
        struct Noop;
        impl Engine for Noop {
            fn id(&self) -> &str {
                "NOOP"
            }
            fn on_tick(&mut self, _tick: &MarketTick, _intents: &mut Vec<OrderIntent>) {}
        }

        let a = StrategyRunner::new(Box::new(Noop), vec!["BTCUSDT".to_string()]);
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| a.make_client_id()).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.starts_with("NOOP_")));
    }

    #[test]
    fn test_market_tick_mid() {
        let tick = MarketTick {
            symbol: "BTCUSDT".to_string(),
            bid: 100.0,
            ask: 101.0,
            bid_size: 1.0,
            ask_size: 1.0,
            ts_ns: 0,
            position: 0.0,
        };
        assert_eq!(tick.mid(), 100.5);
    }
}
