//! Global risk governor: per-symbol position ceilings, portfolio notional
//! ceiling, the drift kill latch, and the exchange-truth reconciler.
//!
//! Positions are mutated by live fills, shadow fills, and reconciliation.
//! The drift kill is one-shot and sticky: once any caller triggers it, every
//! `pre_check` returns false until an operator restarts the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::core::types::{now_ns, SymbolTable};

/// One-shot, sticky system-wide stop. Recovery is operator-only: there is no
/// in-process reset path.
#[derive(Default)]
pub struct DriftKill {
    killed: AtomicBool,
    detail: Mutex<Option<KillDetail>>,
}

#[derive(Debug, Clone)]
pub struct KillDetail {
    pub reason: String,
    pub ts_ns: u64,
}

impl DriftKill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the kill. Only the first trigger records its reason.
    pub fn trigger(&self, reason: impl Into<String>) {
        if self
            .killed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let reason = reason.into();
            error!(%reason, "DRIFT KILL latched - system locked until operator reset");
            *self.detail.lock() = Some(KillDetail {
                reason,
                ts_ns: now_ns(),
            });
        }
    }

    #[inline]
    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    pub fn detail(&self) -> Option<KillDetail> {
        self.detail.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SymbolRisk {
    position: f64,
    /// Last trade price, used to value the position for the notional ceiling.
    ref_price: f64,
    /// Exchange-reported position from the last truth-loop cycle.
    exchange_position: f64,
}

pub struct GlobalRiskGovernor {
    symbols: Arc<SymbolTable>,
    max_portfolio_notional: f64,
    state: Mutex<HashMap<String, SymbolRisk>>,
    drift: DriftKill,
}

impl GlobalRiskGovernor {
    pub fn new(symbols: Arc<SymbolTable>, max_portfolio_notional: f64) -> Self {
        Self {
            symbols,
            max_portfolio_notional,
            state: Mutex::new(HashMap::new()),
            drift: DriftKill::new(),
        }
    }

    /// Admission gate. False once killed, for unknown symbols, when the
    /// resulting position would breach the symbol ceiling, or when the
    /// portfolio notional would breach its ceiling.
    ///
    /// `abs_qty` is unsigned: without the side we block conservatively on
    /// `|position| + qty`.
    pub fn pre_check(&self, symbol: &str, price: f64, abs_qty: f64) -> bool {
        if self.drift.killed() {
            return false;
        }
        let Some(meta) = self.symbols.get(symbol) else {
            return false;
        };

        let state = self.state.lock();
        let current = state.get(symbol).copied().unwrap_or_default();

        if current.position.abs() + abs_qty > meta.max_position + 1e-12 {
            return false;
        }

        let mut notional = price * abs_qty;
        for (sym, s) in state.iter() {
            let px = if s.ref_price > 0.0 {
                s.ref_price
            } else if sym == symbol {
                price
            } else {
                0.0
            };
            notional += s.position.abs() * px;
        }
        if notional > self.max_portfolio_notional {
            return false;
        }

        true
    }

    /// Apply an execution to the local position view. `signed_qty` is
    /// positive for buys.
    pub fn on_execution_ack(&self, symbol: &str, signed_qty: f64, price: f64) {
        let mut state = self.state.lock();
        let s = state.entry(symbol.to_string()).or_default();
        s.position += signed_qty;
        if price > 0.0 {
            s.ref_price = price;
        }
    }

    /// Record the exchange-reported position from the truth loop. Divergence
    /// is logged; the full diff kill stays off until live position tracking
    /// is wired end-to-end.
    pub fn reconcile_position(&self, symbol: &str, exchange_qty: f64) {
        let mut state = self.state.lock();
        let s = state.entry(symbol.to_string()).or_default();
        s.exchange_position = exchange_qty;
        if (s.position - exchange_qty).abs() > 1e-8 {
            info!(
                symbol,
                local = s.position,
                exchange = exchange_qty,
                "position divergence recorded"
            );
        }
    }

    pub fn get_position(&self, symbol: &str) -> f64 {
        self.state
            .lock()
            .get(symbol)
            .map(|s| s.position)
            .unwrap_or(0.0)
    }

    /// Snapshot hook: all local positions.
    pub fn dump_positions(&self) -> HashMap<String, f64> {
        self.state
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.position))
            .collect()
    }

    /// Boot hook: restore one symbol's position.
    pub fn restore_position(&self, symbol: &str, qty: f64) {
        self.state.lock().entry(symbol.to_string()).or_default().position = qty;
    }

    pub fn drift(&self) -> &DriftKill {
        &self.drift
    }

    #[inline]
    pub fn killed(&self) -> bool {
        self.drift.killed()
    }
}
