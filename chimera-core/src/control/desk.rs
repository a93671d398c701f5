//! Desk arbiter: cross-engine capital governance.
//!
//! Engines map many-to-one onto desks. Each desk tracks rolling PnL via an
//! EWMA. One desk entering its loss regime pauses that desk only - its
//! engines stop submitting while the others continue - and the desk resumes
//! automatically once its EWMA recovers above zero.
//!
//! Two or more desks paused at the same time is a regime event: correlated
//! losses mean the market itself is hostile, and the system cannot tell
//! "bad strategy" from "bad market". Cancel federation fires and everything
//! stays frozen until operator reset. This is the only cascade step whose
//! threshold depends on the joint state of multiple desks.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::execution::cancel_federation::CancelFederation;

const EWMA_ALPHA: f64 = 0.05;
const LOSS_THRESHOLD_BPS: f64 = -5.0;
const MIN_TRADES: u64 = 5;

#[derive(Debug, Clone, Default)]
pub struct DeskState {
    pub ewma_pnl_bps: f64,
    pub trades: u64,
    pub paused: bool,
}

#[derive(Default)]
struct DeskInner {
    engine_to_desk: HashMap<String, String>,
    desks: HashMap<String, DeskState>,
}

#[derive(Default)]
pub struct DeskArbiter {
    inner: Mutex<DeskInner>,
}

impl DeskArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine → desk mapping. Called during startup wiring.
    pub fn register_engine(&self, engine_id: &str, desk_id: &str) {
        let mut inner = self.inner.lock();
        inner
            .engine_to_desk
            .insert(engine_id.to_string(), desk_id.to_string());
        inner.desks.entry(desk_id.to_string()).or_default();
    }

    /// Submit gate. Unregistered engines are allowed - not every engine
    /// needs desk governance.
    pub fn allow_submit(&self, engine_id: &str) -> bool {
        let inner = self.inner.lock();
        let Some(desk_id) = inner.engine_to_desk.get(engine_id) else {
            return true;
        };
        inner.desks.get(desk_id).map(|d| !d.paused).unwrap_or(true)
    }

    /// Fill event: update the engine's desk EWMA and pause on a loss regime.
    /// A desk with zero recorded trades is never paused.
    pub fn on_fill(&self, engine_id: &str, pnl_bps: f64) {
        let mut inner = self.inner.lock();
        let Some(desk_id) = inner.engine_to_desk.get(engine_id).cloned() else {
            return;
        };
        let d = inner.desks.entry(desk_id.clone()).or_default();

        d.ewma_pnl_bps = (1.0 - EWMA_ALPHA) * d.ewma_pnl_bps + EWMA_ALPHA * pnl_bps;
        d.trades += 1;

        if d.trades >= MIN_TRADES && d.ewma_pnl_bps < LOSS_THRESHOLD_BPS && !d.paused {
            d.paused = true;
            warn!(
                desk_id = %desk_id,
                ewma_pnl_bps = d.ewma_pnl_bps,
                trades = d.trades,
                "desk paused on loss regime"
            );
            // No federation here: one desk pausing is normal desk-level risk
            // management. The multi-desk regime check runs in poll().
        }
    }

    /// Execution-tick poll: resume recovered desks, then check for the
    /// multi-desk regime event. Recovery runs first so desks that just
    /// recovered don't count toward the regime threshold.
    pub fn poll(&self, cancel_fed: &CancelFederation) {
        let mut inner = self.inner.lock();

        for (desk_id, d) in inner.desks.iter_mut() {
            if d.paused && d.ewma_pnl_bps > 0.0 {
                d.paused = false;
                warn!(desk_id = %desk_id, ewma_pnl_bps = d.ewma_pnl_bps, "desk resumed");
            }
        }

        let paused = inner.desks.values().filter(|d| d.paused).count();
        if paused >= 2 {
            warn!(paused, "multi-desk regime event, firing cancel federation");
            cancel_fed.trigger("DESK_REGIME");
        }
    }

    pub fn desk_state(&self, desk_id: &str) -> Option<DeskState> {
        self.inner.lock().desks.get(desk_id).cloned()
    }

    pub fn dump_desks(&self) -> HashMap<String, DeskState> {
        self.inner.lock().desks.clone()
    }

    /// Operator recovery after a regime event.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        for d in inner.desks.values_mut() {
            *d = DeskState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> DeskArbiter {
        let a = DeskArbiter::new();
        a.register_engine("BTC_BURST", "BTC_DESK");
        a.register_engine("ETH_FADE", "ETH_DESK");
        a.register_engine("MEAN_REV", "MEAN_REV_DESK");
        a
    }

    fn drive_into_loss(a: &DeskArbiter, engine: &str) {
        for _ in 0..MIN_TRADES + 30 {
            a.on_fill(engine, -120.0);
        }
    }

    #[test]
    fn test_unregistered_engine_allowed() {
        let a = arbiter();
        assert!(a.allow_submit("UNKNOWN"));
    }

    #[test]
    fn test_desk_pauses_on_loss_regime() {
        let a = arbiter();
        drive_into_loss(&a, "BTC_BURST");
        assert!(!a.allow_submit("BTC_BURST"));
        assert!(a.desk_state("BTC_DESK").unwrap().paused);
        // Other desks keep trading.
        assert!(a.allow_submit("ETH_FADE"));
    }

    #[test]
    fn test_no_pause_below_min_trades() {
        let a = arbiter();
        // Deep losses but too few trades: never paused.
        for _ in 0..(MIN_TRADES - 1) {
            a.on_fill("BTC_BURST", -500.0);
        }
        assert!(a.allow_submit("BTC_BURST"));
        assert!(!a.desk_state("BTC_DESK").unwrap().paused);
    }

    #[test]
    fn test_zero_trade_desk_never_paused() {
        let a = arbiter();
        assert!(!a.desk_state("BTC_DESK").unwrap().paused);
        let fed = CancelFederation::new();
        a.poll(&fed);
        assert!(!fed.active());
    }

    #[test]
    fn test_desk_recovers_on_positive_ewma() {
        let a = arbiter();
        drive_into_loss(&a, "BTC_BURST");
        assert!(!a.allow_submit("BTC_BURST"));

        // Winning fills pull the EWMA back positive; poll resumes the desk.
        for _ in 0..200 {
            a.on_fill("BTC_BURST", 50.0);
        }
        let fed = CancelFederation::new();
        a.poll(&fed);
        assert!(a.allow_submit("BTC_BURST"));
        assert!(!fed.active());
    }

    #[test]
    fn test_single_desk_pause_does_not_fire_federation() {
        let a = arbiter();
        drive_into_loss(&a, "BTC_BURST");
        let fed = CancelFederation::new();
        a.poll(&fed);
        assert!(!fed.active());
    }

    #[test]
    fn test_two_desk_regime_fires_federation() {
        let a = arbiter();
        drive_into_loss(&a, "BTC_BURST");
        drive_into_loss(&a, "ETH_FADE");
        let fed = CancelFederation::new();
        a.poll(&fed);
        assert!(fed.active());
        assert_eq!(fed.reason(), Some("DESK_REGIME"));
    }

    #[test]
    fn test_reset_clears_all_desks() {
        let a = arbiter();
        drive_into_loss(&a, "BTC_BURST");
        a.reset();
        assert!(a.allow_submit("BTC_BURST"));
        let d = a.desk_state("BTC_DESK").unwrap();
        assert_eq!(d.trades, 0);
        assert_eq!(d.ewma_pnl_bps, 0.0);
    }
}
