//! Execution router: the hub between strategy engines and the exchange.
//!
//! `submit_order` (called from engine threads) runs the admission cascade:
//! throttle, governor gates, latency-scaled sizing, lot/notional
//! normalization, cancel-replace coalescing, and - live only - the profit
//! ledger's edge admission. `poll` (the execution thread, ~50 µs period)
//! observes the cancel federation, drains user-feed lifecycle events into
//! the OSM and the downstream governors, runs the queue decay and desk
//! polls, and in shadow mode simulates fills for pending orders.
//!
//! Shadow mode deliberately skips the live risk `pre_check` and the edge
//! admission: shadow positions accumulate against ceilings with no reset
//! path, so the queue-probability gate in the fill simulator is the sole
//! shadow admission.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use crate::control::ledger::{FillReport, FEE_BPS};
use crate::core::types::{
    now_ns, LifecycleEvent, OrderRecord, OrderSubmit, Side, SymbolMeta,
};
use crate::execution::coalescer::{CancelReplaceCoalescer, PendingOrder};
use crate::execution::throttle::ExecutionThrottle;
use crate::exchange::ExchangeAdapter;
use crate::runtime::context::Context;

/// Consecutive adapter failures before the circuit breaker drift-kills.
const CIRCUIT_BREAK_THRESHOLD: u32 = 3;

/// Terminal purge cadence, in poll ticks.
const PURGE_EVERY_TICKS: u64 = 1024;

/// Per-tick cap on drained lifecycle events, so one burst cannot starve the
/// governor polls.
const MAX_EVENTS_PER_TICK: usize = 256;

pub struct ExecutionRouter {
    throttle: ExecutionThrottle,
    coalescer: CancelReplaceCoalescer,
    adapter: Option<Arc<dyn ExchangeAdapter>>,

    lifecycle_tx: Sender<LifecycleEvent>,
    lifecycle_rx: Receiver<LifecycleEvent>,

    /// Orders handed to the adapter but not yet terminal. Prevents duplicate
    /// submission and scopes the reconcile after an outage.
    submitted: Mutex<HashSet<String>>,

    /// Consecutive adapter failures; reset on any success.
    adapter_failures: AtomicU32,

    tick: AtomicU64,
}

impl ExecutionRouter {
    pub fn new(adapter: Option<Arc<dyn ExchangeAdapter>>) -> Self {
        Self::with_throttle(adapter, ExecutionThrottle::with_defaults())
    }

    pub fn with_throttle(
        adapter: Option<Arc<dyn ExchangeAdapter>>,
        throttle: ExecutionThrottle,
    ) -> Self {
        let (lifecycle_tx, lifecycle_rx) = bounded(4096);
        Self {
            throttle,
            coalescer: CancelReplaceCoalescer::new(),
            adapter,
            lifecycle_tx,
            lifecycle_rx,
            submitted: Mutex::new(HashSet::new()),
            adapter_failures: AtomicU32::new(0),
            tick: AtomicU64::new(0),
        }
    }

    /// Sender side of the lifecycle channel - the user feed pushes
    /// ACK/FILL/CANCEL/REJECT events here.
    pub fn lifecycle_sender(&self) -> Sender<LifecycleEvent> {
        self.lifecycle_tx.clone()
    }

    pub fn pending_coalescer_entries(&self) -> usize {
        self.coalescer.len()
    }

    pub fn find_pending(&self, engine_id: &str, symbol: &str) -> Option<(String, PendingOrder)> {
        self.coalescer.find_by_engine_symbol(engine_id, symbol)
    }

    // -----------------------------------------------------------------------
    // Submit pipeline
    // -----------------------------------------------------------------------

    /// Run one order intent through the admission cascade. Returns whether
    /// the order entered the pipeline. All rejections are silent drops with
    /// the appropriate telemetry counter bumped.
    pub fn submit_order(
        &self,
        ctx: &Context,
        client_id: &str,
        symbol: &str,
        price: f64,
        signed_qty: f64,
        engine_id: &str,
    ) -> bool {
        // Drift latch collapses the whole cascade, shadow included.
        if ctx.risk.killed() {
            ctx.telemetry.increment_risk_block();
            return false;
        }

        // 1. Validate the id and the symbol before anything else.
        if client_id.is_empty() || signed_qty == 0.0 || price <= 0.0 {
            return false;
        }
        let Some(meta) = ctx.symbols.get(symbol) else {
            ctx.telemetry.increment_risk_block();
            return false;
        };

        // 2. Throttle: global, then per-symbol.
        if !self.throttle.allow_global() || !self.throttle.allow_symbol(symbol) {
            ctx.telemetry.increment_throttle_block();
            return false;
        }

        // 3. Governor cascade, fixed order. First denial records the reason.
        let live = ctx.arm.live_enabled();
        if live && !ctx.risk.pre_check(symbol, price, signed_qty.abs()) {
            debug!(engine_id, symbol, "risk governor block");
            ctx.telemetry.increment_risk_block();
            return false;
        }
        if !ctx.pnl.allow_strategy(engine_id) {
            debug!(engine_id, "pnl governor block");
            ctx.telemetry.increment_risk_block();
            return false;
        }
        if !ctx.desk.allow_submit(engine_id) {
            debug!(engine_id, "desk arbiter block");
            ctx.telemetry.increment_risk_block();
            return false;
        }
        if ctx.latency.is_critical() {
            warn!(engine_id, "latency critical at submit, demanding cancel federation");
            ctx.cancel_fed.trigger("LATENCY_CRITICAL");
            ctx.telemetry.increment_risk_block();
            return false;
        }

        // 4. Size: latency ladder times the engine's tuned multiplier, then
        //    normalize to the lot grid and enforce min notional.
        let scaled =
            signed_qty * ctx.latency.size_multiplier() * ctx.ledger.size_multiplier(engine_id);
        let qty_abs = normalize_to_lot(scaled.abs(), meta);
        if qty_abs <= 0.0 || qty_abs * price < meta.min_notional {
            debug!(engine_id, symbol, qty_abs, "below lot/min-notional after scaling");
            ctx.telemetry.increment_risk_block();
            return false;
        }
        let side = Side::from_signed_qty(signed_qty);
        let signed_qty = side.sign() * qty_abs;

        // 5. Cancel-replace coalescing: one pending order per (engine,
        //    symbol). Same price = duplicate, drop. Different price = cancel
        //    the prior and install this one.
        if let Some((prior_id, prior)) = self.coalescer.find_by_engine_symbol(engine_id, symbol) {
            if (prior.price - price).abs() < meta.tick_size * 0.5 {
                debug!(engine_id, symbol, "coalesced duplicate at same price");
                return false;
            }
            self.cancel_replace_prior(ctx, &prior_id, live);
        }

        // 6. Edge admission - live only. In shadow the queue-probability
        //    gate in the fill simulator is the sole admission (see module
        //    docs).
        let tob = ctx.queue.top(symbol);
        if tob.valid {
            ctx.ledger.note_spread(symbol, tob.spread_bps());
        }
        let est = ctx
            .queue
            .estimate(symbol, price, qty_abs, side.is_buy());
        let predicted_edge_bps = predicted_edge(&tob, price, side);
        if live {
            let threshold = ctx.ledger.admission_threshold(
                engine_id,
                symbol,
                ctx.latency.ewma_us(),
                est.expected_fill_prob,
            );
            if predicted_edge_bps < threshold {
                debug!(
                    engine_id,
                    symbol, predicted_edge_bps, threshold, "edge admission block"
                );
                ctx.telemetry.increment_admission_block();
                return false;
            }
        }

        // 7. Reserve state: OSM record in New, coalescer entry, submit-time
        //    context for the ledger and edge attribution.
        let rec = OrderRecord::new(
            client_id.to_string(),
            symbol.to_string(),
            side,
            price,
            qty_abs,
            engine_id.to_string(),
        );
        if let Err(e) = ctx.osm.on_new(rec) {
            warn!(client_id, error = %e, "duplicate client id rejected");
            return false;
        }
        self.coalescer.submit(
            client_id,
            PendingOrder {
                engine_id: engine_id.to_string(),
                symbol: symbol.to_string(),
                price,
                qty: signed_qty,
            },
        );
        ctx.edge
            .on_submit(client_id, engine_id, predicted_edge_bps, est.expected_fill_prob);
        ctx.ledger.on_submit(engine_id);

        // 8. Hand off: adapter in live mode; in shadow the coalescer entry
        //    is the simulation queue.
        if live {
            self.live_submit(
                ctx,
                &OrderSubmit {
                    client_id: client_id.to_string(),
                    symbol: symbol.to_string(),
                    price,
                    qty: signed_qty,
                },
            );
            ctx.queue_decay
                .on_order_submitted(ctx, client_id, symbol, price, side.is_buy());
        }

        // 9. Forensic record.
        if let Err(e) = ctx.recorder.write_submit(client_id, signed_qty, price) {
            error!(error = %e, "event log submit write failed");
        }
        true
    }

    fn cancel_replace_prior(&self, ctx: &Context, prior_id: &str, live: bool) {
        debug!(prior_id, "cancel-replace: canceling prior pending order");
        if live {
            if let Some(adapter) = &self.adapter {
                self.note_adapter_result(ctx, adapter.cancel_order(prior_id));
            }
        }
        let engine_id = ctx.osm.get(prior_id).map(|r| r.engine_id).ok();
        ctx.osm.on_cancel_by_client_id(prior_id);
        if let Some(engine_id) = &engine_id {
            ctx.ledger.on_cancel(engine_id);
        }
        ctx.edge.on_cancel(prior_id);
        self.coalescer.clear(prior_id);
        ctx.queue_decay.on_order_done(prior_id);
        self.submitted.lock().remove(prior_id);
        if let Err(e) = ctx.recorder.write_cancel(prior_id) {
            error!(error = %e, "event log cancel write failed");
        }
    }

    fn live_submit(&self, ctx: &Context, order: &OrderSubmit) {
        let Some(adapter) = &self.adapter else {
            warn!(client_id = %order.client_id, "live mode with no adapter wired, dropping");
            return;
        };
        let queued = adapter.send_order(order);
        if queued {
            self.submitted.lock().insert(order.client_id.clone());
        }
        self.note_adapter_result(ctx, queued);
    }

    /// Consecutive-failure circuit breaker around the adapter's non-blocking
    /// queue operations. Three in a row means the transport is gone: drift.
    fn note_adapter_result(&self, ctx: &Context, ok: bool) {
        if ok {
            self.adapter_failures.store(0, Ordering::Relaxed);
            return;
        }
        let failures = self.adapter_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(failures, "adapter call failed");
        if failures >= CIRCUIT_BREAK_THRESHOLD {
            ctx.risk
                .drift()
                .trigger("adapter circuit breaker: consecutive failures");
        }
    }

    // -----------------------------------------------------------------------
    // Poll loop
    // -----------------------------------------------------------------------

    /// One execution tick. Runs on the execution core.
    pub fn poll(&self, ctx: &Context) {
        // Portfolio drawdown observed here so the kill escalates through the
        // same sweep as every other system event.
        if ctx.pnl.portfolio_killed() && !ctx.risk.killed() {
            ctx.cancel_fed.trigger("PORTFOLIO_DD");
        }

        if ctx.cancel_fed.active() {
            self.sweep(ctx);
        }

        self.drain_lifecycle_events(ctx);

        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        if tick % PURGE_EVERY_TICKS == 0 {
            let purged = ctx.osm.purge_terminal();
            if purged > 0 {
                debug!(purged, "purged terminal orders");
            }
        }

        ctx.queue_decay.poll(ctx);
        ctx.desk.poll(&ctx.cancel_fed);

        // Volatility feed: the ledger's cost model tracks bps-per-ms off the
        // mid. Duplicate timestamps are ignored inside the tracker.
        for meta in ctx.symbols.symbols() {
            let tob = ctx.queue.top(&meta.symbol);
            if tob.valid && tob.mid() > 0.0 {
                ctx.ledger.on_price(&meta.symbol, tob.mid(), tob.ts_ns);
            }
        }

        if !ctx.arm.live_enabled() {
            self.simulate_shadow_fills(ctx);
        }
    }

    fn drain_lifecycle_events(&self, ctx: &Context) {
        for _ in 0..MAX_EVENTS_PER_TICK {
            match self.lifecycle_rx.try_recv() {
                Ok(event) => self.apply_lifecycle_event(ctx, event),
                Err(_) => break,
            }
        }
    }

    /// Apply one user-feed lifecycle event to the OSM and every downstream
    /// governor. Runs on the execution thread only.
    pub fn apply_lifecycle_event(&self, ctx: &Context, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Ack {
                client_id,
                exchange_id,
            } => self.handle_ack(ctx, &client_id, &exchange_id),
            LifecycleEvent::Fill {
                exchange_id,
                qty,
                price,
            } => self.handle_fill(ctx, &exchange_id, qty, price),
            LifecycleEvent::Cancel { exchange_id } | LifecycleEvent::Expire { exchange_id } => {
                self.handle_cancel(ctx, &exchange_id)
            }
            LifecycleEvent::Reject { client_id } => self.handle_reject(ctx, &client_id),
        }
    }

    fn handle_ack(&self, ctx: &Context, client_id: &str, exchange_id: &str) {
        let Ok(rec) = ctx.osm.get(client_id) else {
            warn!(client_id, "ack for unknown order");
            return;
        };
        let latency_us = (now_ns().saturating_sub(rec.created_ns)) as f64 / 1000.0;
        ctx.osm.on_ack(client_id, exchange_id);
        ctx.latency.on_ack_latency(latency_us);
        ctx.telemetry.set_latency_us(latency_us as u64);
        if let Err(e) = ctx.recorder.write_ack(client_id, exchange_id) {
            error!(error = %e, "event log ack write failed");
        }
    }

    fn handle_fill(&self, ctx: &Context, exchange_id: &str, qty: f64, price: f64) {
        // Resolve through the secondary index before the transition so the
        // engine/symbol/side context is still at hand.
        let Some(rec) = ctx.osm.get_by_exchange_id(exchange_id) else {
            warn!(exchange_id, "fill for unknown exchange id");
            return;
        };
        let fill_qty = qty.abs().min(rec.remaining_qty);
        if fill_qty <= 0.0 {
            return;
        }

        ctx.osm.on_fill(exchange_id, fill_qty);

        let signed_qty = rec.side.sign() * fill_qty;
        ctx.risk.on_execution_ack(&rec.symbol, signed_qty, price);

        // Fill quality versus the mid at fill time. With no valid book the
        // fill is scored flat.
        let tob = ctx.queue.top(&rec.symbol);
        let mid = if tob.valid && tob.mid() > 0.0 {
            tob.mid()
        } else {
            price
        };
        let realized_edge_bps = match rec.side {
            Side::Buy => (mid - price) / mid * 10_000.0,
            Side::Sell => (price - mid) / mid * 10_000.0,
        };
        let net_bps = realized_edge_bps - FEE_BPS;
        let notional = price * fill_qty;
        let net_pnl_usd = net_bps / 10_000.0 * notional;
        let latency_us = ctx.latency.last_latency_us();

        ctx.pnl.update_fill(&rec.engine_id, net_pnl_usd);
        ctx.edge
            .on_fill(&rec.client_id, realized_edge_bps, latency_us, &ctx.pnl);
        ctx.desk.on_fill(&rec.engine_id, net_bps);
        ctx.ledger.on_fill(
            &FillReport {
                engine_id: rec.engine_id.clone(),
                symbol: rec.symbol.clone(),
                is_buy: rec.side.is_buy(),
                fill_price: price,
                fill_qty,
                latency_us,
                predicted_edge_bps: 0.0,
                realized_edge_bps,
                pnl_usd: net_pnl_usd,
                net_bps,
            },
            &ctx.pnl,
        );

        ctx.telemetry.increment_fills();
        let position = ctx.risk.get_position(&rec.symbol);
        ctx.telemetry
            .update_symbol(&rec.symbol, position, position.abs() * price, now_ns());

        if let Err(e) = ctx.recorder.write_fill(&rec.client_id, fill_qty, price) {
            error!(error = %e, "event log fill write failed");
        }

        // Terminal bookkeeping once fully filled.
        if fill_qty >= rec.remaining_qty - 1e-12 {
            self.coalescer.clear(&rec.client_id);
            ctx.queue_decay.on_order_done(&rec.client_id);
            self.submitted.lock().remove(&rec.client_id);
        }
    }

    fn handle_cancel(&self, ctx: &Context, exchange_id: &str) {
        let Some(rec) = ctx.osm.get_by_exchange_id(exchange_id) else {
            return;
        };
        ctx.osm.on_cancel(exchange_id);
        ctx.ledger.on_cancel(&rec.engine_id);
        ctx.edge.on_cancel(&rec.client_id);
        self.coalescer.clear(&rec.client_id);
        ctx.queue_decay.on_order_done(&rec.client_id);
        self.submitted.lock().remove(&rec.client_id);
        if let Err(e) = ctx.recorder.write_cancel(&rec.client_id) {
            error!(error = %e, "event log cancel write failed");
        }
    }

    fn handle_reject(&self, ctx: &Context, client_id: &str) {
        let Ok(rec) = ctx.osm.get(client_id) else {
            return;
        };
        ctx.osm.on_reject(client_id);
        ctx.ledger.on_cancel(&rec.engine_id);
        ctx.edge.on_cancel(client_id);
        self.coalescer.clear(client_id);
        ctx.queue_decay.on_order_done(client_id);
        self.submitted.lock().remove(client_id);
        if let Err(e) = ctx.recorder.write_reject(client_id) {
            error!(error = %e, "event log reject write failed");
        }
    }

    // -----------------------------------------------------------------------
    // Cancel federation sweep
    // -----------------------------------------------------------------------

    /// Execute the federation sweep: cancel every open order, clear the
    /// coalescer, latch the drift kill. The federation flag is cleared once
    /// the sweep is done; the drift latch is what keeps the system locked.
    fn sweep(&self, ctx: &Context) {
        let reason = ctx.cancel_fed.reason().unwrap_or("UNKNOWN");
        let open = ctx.osm.open_client_ids();
        warn!(reason, open_orders = open.len(), "cancel federation sweep");

        let live = ctx.arm.live_enabled();
        for client_id in &open {
            if live {
                if let Some(adapter) = &self.adapter {
                    // Fire-and-forget: the system is dying, latency is
                    // irrelevant and failures change nothing.
                    let _ = adapter.cancel_order(client_id);
                }
            }
            let engine_id = ctx.osm.get(client_id).map(|r| r.engine_id).ok();
            ctx.osm.on_cancel_by_client_id(client_id);
            if let Some(engine_id) = &engine_id {
                ctx.ledger.on_cancel(engine_id);
            }
            ctx.edge.on_cancel(client_id);
            ctx.queue_decay.on_order_done(client_id);
            if let Err(e) = ctx.recorder.write_cancel(client_id) {
                error!(error = %e, "event log cancel write failed");
            }
        }

        self.coalescer.clear_all();
        self.submitted.lock().clear();

        ctx.risk.drift().trigger(format!("CANCEL_FED: {}", reason));
        ctx.telemetry.set_drift(true);
        ctx.cancel_fed.clear();
    }

    // -----------------------------------------------------------------------
    // Shadow fill simulation
    // -----------------------------------------------------------------------

    /// Deterministic shadow fills: a pending order fills on the first poll
    /// at which its current fill-probability estimate clears the engine's
    /// threshold. Reproducible given the book tape - no randomness.
    fn simulate_shadow_fills(&self, ctx: &Context) {
        for client_id in self.coalescer.pending_keys() {
            let Ok(rec) = ctx.osm.get(&client_id) else {
                self.coalescer.clear(&client_id);
                continue;
            };
            if !rec.status.is_open() {
                self.coalescer.clear(&client_id);
                continue;
            }

            let est = ctx.queue.estimate(
                &rec.symbol,
                rec.price,
                rec.remaining_qty,
                rec.side.is_buy(),
            );
            let threshold = ctx.ledger.soft_ttl_fill_prob(&rec.engine_id);
            if est.expected_fill_prob < threshold {
                continue;
            }

            // Synthesize the full lifecycle so every downstream consumer
            // sees exactly what a live fill would produce.
            let exchange_id = format!("SHADOW-{}", client_id);
            self.handle_ack(ctx, &client_id, &exchange_id);
            self.handle_fill(ctx, &exchange_id, rec.remaining_qty, rec.price);
        }
    }
}

/// Floor a quantity onto the symbol's lot grid. Decimal arithmetic: binary
/// f64 division at lot boundaries (0.05 / 0.01) lands just under the
/// integer and a naive floor would drop a lot.
fn normalize_to_lot(qty: f64, meta: &SymbolMeta) -> f64 {
    if meta.lot_size <= 0.0 {
        return qty;
    }
    let (Some(q), Some(lot)) = (Decimal::from_f64(qty), Decimal::from_f64(meta.lot_size)) else {
        return 0.0;
    };
    if lot.is_zero() {
        return qty;
    }
    ((q / lot).floor() * lot).to_f64().unwrap_or(0.0)
}

/// Predicted edge in bps from price versus mid, used when the engine does
/// not supply its own forecast. Passive orders inside the touch price at a
/// discount to mid; an invalid book prices zero edge (and fails admission).
fn predicted_edge(tob: &crate::core::types::TopOfBook, price: f64, side: Side) -> f64 {
    if !tob.valid {
        return 0.0;
    }
    let mid = tob.mid();
    if mid <= 0.0 {
        return 0.0;
    }
    match side {
        Side::Buy => (mid - price) / mid * 10_000.0,
        Side::Sell => (price - mid) / mid * 10_000.0,
    }
}
