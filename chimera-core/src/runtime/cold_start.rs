//! Cold-start reconciler: the gatekeeper between boot and the arm sequence.
//!
//! Pulls exchange truth from every venue and compares it to the local
//! snapshot. Clean means every exchange position matches the local view
//! within tolerance, every non-zero local position exists on the exchange,
//! and no unknown open orders are resting. Only a clean result unlocks the
//! arm system; a failure leaves it locked for manual intervention.

use std::fmt::Write as _;

use tracing::{info, warn};

use crate::exchange::ExchangeAdapter;
use crate::runtime::context::Context;

const POSITION_TOLERANCE: f64 = 1e-8;

pub struct ColdStartReconciler;

impl ColdStartReconciler {
    /// Run the gate against every venue. Returns whether the state is clean
    /// and a human-readable report; unlocks or locks the arm system to
    /// match.
    pub fn reconcile(ctx: &Context, venues: &[&dyn ExchangeAdapter]) -> (bool, String) {
        let mut report = String::from("cold-start reconciliation\n");
        let mut ok = true;

        let mut exchange_positions = Vec::new();
        let mut exchange_orders = Vec::new();

        for venue in venues {
            match venue.get_all_positions() {
                Ok(positions) => {
                    let _ = writeln!(
                        report,
                        "  {}: {} positions",
                        venue.name(),
                        positions.len()
                    );
                    exchange_positions.extend(positions);
                }
                Err(e) => {
                    let _ = writeln!(report, "  {}: FAIL (positions: {})", venue.name(), e);
                    ok = false;
                    continue;
                }
            }
            match venue.get_all_open_orders() {
                Ok(orders) => {
                    let _ = writeln!(report, "  {}: {} open orders", venue.name(), orders.len());
                    exchange_orders.extend(orders);
                }
                Err(e) => {
                    let _ = writeln!(report, "  {}: FAIL (orders: {})", venue.name(), e);
                    ok = false;
                }
            }
        }

        let local = ctx.risk.dump_positions();

        // Everything the exchange has, local must agree on.
        for pos in &exchange_positions {
            match local.get(&pos.symbol) {
                None if pos.qty.abs() > POSITION_TOLERANCE => {
                    let _ = writeln!(
                        report,
                        "  MISMATCH {}: exchange qty={} missing locally",
                        pos.symbol, pos.qty
                    );
                    ok = false;
                }
                Some(local_qty) if (local_qty - pos.qty).abs() > POSITION_TOLERANCE => {
                    let _ = writeln!(
                        report,
                        "  MISMATCH {}: local={} exchange={}",
                        pos.symbol, local_qty, pos.qty
                    );
                    ok = false;
                }
                _ => {}
            }
        }

        // Non-zero local positions must exist on the exchange.
        for (symbol, qty) in &local {
            if qty.abs() < POSITION_TOLERANCE {
                continue;
            }
            let found = exchange_positions.iter().any(|p| &p.symbol == symbol);
            if !found {
                let _ = writeln!(
                    report,
                    "  MISMATCH {}: local qty={} not on exchange",
                    symbol, qty
                );
                ok = false;
            }
        }

        // Unknown resting orders block the gate.
        for order in &exchange_orders {
            if ctx.osm.get(&order.client_id).is_err() {
                let _ = writeln!(
                    report,
                    "  MISMATCH: unknown open order {} on exchange",
                    order.client_id
                );
                ok = false;
            }
        }

        if ok {
            let _ = writeln!(report, "  PASS: state aligned, arm sequence unlocked");
            info!("cold start reconciliation passed");
        } else {
            let _ = writeln!(report, "  FAIL: arm system locked, manual intervention required");
            warn!("cold start reconciliation failed, arm locked");
        }
        ctx.arm.set_cold_start_ok(ok);
        (ok, report)
    }
}
