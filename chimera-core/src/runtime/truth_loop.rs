//! Exchange truth loop: periodic reconciliation against exchange-side
//! positions and open orders. Live mode only - in shadow the loop sleeps.
//!
//! Orders get full phantom detection in both directions:
//!
//! - **Exchange ghost (phantom)**: the exchange reports an order the OSM has
//!   no record of at all. Unknown orders mean corrupted state or external
//!   interference; neither is safe to trade through. Drift kill.
//! - **Local ghost**: the OSM thinks an order is open but the exchange does
//!   not. Expected transiently (a NEW not yet on the wire, a fill in flight
//!   on the user stream) - logged only; the normal cancel policy resolves it.
//!
//! Positions are recorded through the risk governor's reconciler and any
//! divergence is logged; the full position diff stays informational until
//! live position tracking is wired end to end.
//!
//! A REST failure in live mode means flying blind - dangerous enough to
//! kill.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::exchange::ExchangeAdapter;
use crate::runtime::context::Context;

pub const DEFAULT_TRUTH_INTERVAL: Duration = Duration::from_secs(3);

/// One reconciliation cycle against a single venue. Exposed as a function so
/// tests can drive it synchronously; the loop thread just calls it on a
/// timer.
pub fn check_exchange_state(ctx: &Context, adapter: &dyn ExchangeAdapter) {
    // Positions first: a REST failure here is fatal in live mode.
    let positions = match adapter.get_all_positions() {
        Ok(p) => p,
        Err(e) => {
            error!(venue = adapter.name(), error = %e, "truth loop position fetch failed");
            ctx.risk
                .drift()
                .trigger(format!("TRUTH LOOP: position fetch failed: {}", e));
            return;
        }
    };
    for pos in &positions {
        if pos.qty.abs() > 1e-8 {
            info!(venue = adapter.name(), symbol = %pos.symbol, qty = pos.qty, "live exchange position");
        }
        ctx.risk.reconcile_position(&pos.symbol, pos.qty);
    }

    // Open orders: failure here is less critical (orders are ephemeral and
    // the user-stream reconcile path catches order drift on reconnect).
    let exchange_open = match adapter.get_all_open_orders() {
        Ok(o) => o,
        Err(e) => {
            warn!(venue = adapter.name(), error = %e, "truth loop open-orders fetch failed");
            return;
        }
    };

    // Pass 1: exchange ghosts. Any order on the exchange with no OSM record
    // at all (not merely not-open - no record, period) is a phantom.
    for order in &exchange_open {
        if ctx.osm.get(&order.client_id).is_err() {
            error!(
                venue = adapter.name(),
                client_id = %order.client_id,
                "phantom order on exchange, killing"
            );
            ctx.risk.drift().trigger(format!(
                "TRUTH LOOP: phantom order on exchange: {}",
                order.client_id
            ));
            return;
        }
    }

    // Pass 2: local ghosts. Log only.
    let exchange_ids: std::collections::HashSet<&str> = exchange_open
        .iter()
        .map(|o| o.client_id.as_str())
        .collect();
    let local_open = ctx.osm.open_client_ids();
    for client_id in &local_open {
        if !exchange_ids.contains(client_id.as_str()) {
            info!(
                client_id = %client_id,
                "local ghost: open in OSM, not on exchange (transient expected)"
            );
        }
    }

    debug!(
        venue = adapter.name(),
        local_open = local_open.len(),
        exchange_open = exchange_open.len(),
        "truth loop cycle clean"
    );
}

pub struct ExchangeTruthLoop {
    interval: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ExchangeTruthLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Spawn the loop thread. `adapter = None` (shadow, no credentials)
    /// makes every cycle a no-op.
    pub fn start(&mut self, ctx: Arc<Context>, adapter: Option<Arc<dyn ExchangeAdapter>>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return; // already running
        }
        let running = Arc::clone(&self.running);
        let interval = self.interval;
        self.worker = Some(std::thread::spawn(move || {
            while running.load(Ordering::Acquire) && ctx.is_running() {
                std::thread::sleep(interval);
                if !running.load(Ordering::Acquire) || !ctx.is_running() {
                    break;
                }
                // Live only; shadow has nothing to verify.
                if !ctx.arm.live_enabled() {
                    continue;
                }
                let Some(adapter) = adapter.as_deref() else {
                    warn!("truth loop live with no adapter wired, cannot verify");
                    continue;
                };
                check_exchange_state(&ctx, adapter);
            }
        }));
    }

    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ExchangeTruthLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
