//! PnL governor: per-engine rolling EV kill and the portfolio drawdown kill.
//!
//! Engines earn the right to trade by keeping their rolling EV above the
//! floor. Once breached, the engine is killed one-shot: new orders are
//! blocked at submit, but in-flight orders are NOT yanked - pulling orders
//! mid-queue creates adverse liquidity events, so they resolve through the
//! normal lifecycle.
//!
//! The portfolio kill only latches a flag here. The router observes it and
//! fires cancel federation; this governor stays independent of the runtime
//! kill mechanism.
//!
//! Runs in both shadow and live modes: shadow fills carry fill-versus-mid
//! quality estimates, so kill thresholds get validated before real capital
//! is at stake.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

const EV_ALPHA: f64 = 0.1;

pub const DEFAULT_STRATEGY_FLOOR_USD: f64 = -10.0;
pub const DEFAULT_PORTFOLIO_DD_USD: f64 = -500.0;

#[derive(Debug, Clone, Default)]
pub struct StrategyStats {
    pub realized_pnl: f64,
    /// EWMA of per-fill PnL deltas.
    pub rolling_ev: f64,
    /// One-shot: sticky until operator reset.
    pub killed: bool,
}

struct PnlInner {
    stats: HashMap<String, StrategyStats>,
    portfolio_pnl: f64,
    portfolio_killed: bool,
}

pub struct PnLGovernor {
    strategy_floor: f64,
    portfolio_dd: f64,
    inner: Mutex<PnlInner>,
}

impl Default for PnLGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_STRATEGY_FLOOR_USD, DEFAULT_PORTFOLIO_DD_USD)
    }
}

impl PnLGovernor {
    pub fn new(strategy_floor: f64, portfolio_dd: f64) -> Self {
        Self {
            strategy_floor,
            portfolio_dd,
            inner: Mutex::new(PnlInner {
                stats: HashMap::new(),
                portfolio_pnl: 0.0,
                portfolio_killed: false,
            }),
        }
    }

    /// Apply one fill's realized PnL delta (shadow or live).
    pub fn update_fill(&self, engine_id: &str, pnl_delta: f64) {
        let mut inner = self.inner.lock();

        let s = inner.stats.entry(engine_id.to_string()).or_default();
        s.realized_pnl += pnl_delta;
        s.rolling_ev = (1.0 - EV_ALPHA) * s.rolling_ev + EV_ALPHA * pnl_delta;

        // The floor binds both the rolling EV and the cumulative realized
        // PnL: a slow bleed breaches on the cumulative leg long before the
        // EWMA gets there.
        if (s.rolling_ev < self.strategy_floor || s.realized_pnl < self.strategy_floor) && !s.killed
        {
            s.killed = true;
            warn!(
                engine_id,
                rolling_ev = s.rolling_ev,
                realized = s.realized_pnl,
                floor = self.strategy_floor,
                "strategy killed on EV floor breach"
            );
        }

        inner.portfolio_pnl += pnl_delta;
        if inner.portfolio_pnl < self.portfolio_dd && !inner.portfolio_killed {
            inner.portfolio_killed = true;
            warn!(
                portfolio_pnl = inner.portfolio_pnl,
                limit = self.portfolio_dd,
                "portfolio drawdown kill latched"
            );
        }
    }

    /// Submit gate. False once the engine has ever breached its floor, or
    /// once the portfolio kill has latched. Engines with no history are
    /// allowed - a first trade cannot have breached anything.
    pub fn allow_strategy(&self, engine_id: &str) -> bool {
        let inner = self.inner.lock();
        if inner.portfolio_killed {
            return false;
        }
        inner
            .stats
            .get(engine_id)
            .map(|s| !s.killed)
            .unwrap_or(true)
    }

    /// Force-kill an engine immediately - the edge-attribution and
    /// profit-ledger kill paths land here. One-shot, same as an EV breach.
    pub fn block_engine(&self, engine_id: &str) {
        let mut inner = self.inner.lock();
        let s = inner.stats.entry(engine_id.to_string()).or_default();
        if !s.killed {
            s.killed = true;
            warn!(engine_id, realized = s.realized_pnl, "engine force-blocked");
        }
    }

    pub fn portfolio_pnl(&self) -> f64 {
        self.inner.lock().portfolio_pnl
    }

    pub fn portfolio_killed(&self) -> bool {
        self.inner.lock().portfolio_killed
    }

    pub fn dump_stats(&self) -> HashMap<String, StrategyStats> {
        self.inner.lock().stats.clone()
    }

    /// Operator recovery path (and tests). Clears every kill.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.stats.clear();
        inner.portfolio_pnl = 0.0;
        inner.portfolio_killed = false;
    }
}
