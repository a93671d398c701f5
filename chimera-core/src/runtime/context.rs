//! The single authoritative owner of all system state.
//!
//! No globals, no statics: the `Context` is constructed exactly once in
//! `main`, wrapped in an `Arc`, and every component takes a non-owning
//! reference. Each member is `Sync` through interior mutability
//! (mutexes/atomics), so methods that need cross-component access simply
//! take `&Context` - the borrow-tree rendition of dependency injection.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::control::desk::DeskArbiter;
use crate::control::edge::EdgeAttribution;
use crate::control::ledger::{LedgerConfig, ProfitLedger};
use crate::control::pnl::{PnLGovernor, DEFAULT_PORTFOLIO_DD_USD, DEFAULT_STRATEGY_FLOOR_USD};
use crate::core::errors::LogError;
use crate::core::types::SymbolTable;
use crate::execution::cancel_federation::CancelFederation;
use crate::execution::order_state::OrderStateMachine;
use crate::execution::queue_decay::{QueueDecayConfig, QueueDecayGovernor};
use crate::execution::queue_model::QueueModel;
use crate::forensics::event_log::EventLog;
use crate::risk::governor::GlobalRiskGovernor;
use crate::risk::latency::LatencyGovernor;
use crate::runtime::arm::{ArmSystem, DEFAULT_MIN_ARM_SECONDS};
use crate::telemetry::TelemetryState;

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub symbols: Arc<SymbolTable>,
    pub event_log_path: PathBuf,
    pub min_arm_secs: u64,
    pub max_portfolio_notional: f64,
    pub strategy_floor_usd: f64,
    pub portfolio_dd_usd: f64,
    pub ledger: LedgerConfig,
    pub queue_decay: QueueDecayConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            symbols: Arc::new(SymbolTable::default_universe()),
            event_log_path: PathBuf::from("data/events.bin"),
            min_arm_secs: DEFAULT_MIN_ARM_SECONDS,
            max_portfolio_notional: 250_000.0,
            strategy_floor_usd: DEFAULT_STRATEGY_FLOOR_USD,
            portfolio_dd_usd: DEFAULT_PORTFOLIO_DD_USD,
            ledger: LedgerConfig::default(),
            queue_decay: QueueDecayConfig::default(),
        }
    }
}

pub struct Context {
    /// Global run flag. Every loop observes it at the top of its body.
    pub running: AtomicBool,

    pub symbols: Arc<SymbolTable>,

    // Safety
    pub arm: ArmSystem,

    // Execution intelligence
    pub queue: QueueModel,
    pub osm: OrderStateMachine,
    pub cancel_fed: CancelFederation,
    pub queue_decay: QueueDecayGovernor,

    // Risk + truth
    pub risk: GlobalRiskGovernor,
    pub latency: LatencyGovernor,

    // Capital governance
    pub pnl: PnLGovernor,
    pub edge: EdgeAttribution,
    pub desk: DeskArbiter,
    pub ledger: ProfitLedger,

    // Observability
    pub telemetry: TelemetryState,

    // Forensics - owns the event log
    pub recorder: EventLog,
}

impl Context {
    /// Construct the root value. The only unrecoverable failure is the
    /// event log failing to open.
    pub fn new(config: ContextConfig) -> Result<Self, LogError> {
        let recorder = EventLog::open(&config.event_log_path)?;
        Ok(Self {
            running: AtomicBool::new(true),
            arm: ArmSystem::new(config.min_arm_secs),
            queue: QueueModel::new(),
            osm: OrderStateMachine::new(),
            cancel_fed: CancelFederation::new(),
            queue_decay: QueueDecayGovernor::new(config.queue_decay),
            risk: GlobalRiskGovernor::new(
                Arc::clone(&config.symbols),
                config.max_portfolio_notional,
            ),
            latency: LatencyGovernor::new(),
            pnl: PnLGovernor::new(config.strategy_floor_usd, config.portfolio_dd_usd),
            edge: EdgeAttribution::default(),
            desk: DeskArbiter::new(),
            ledger: ProfitLedger::new(config.ledger),
            telemetry: TelemetryState::new(),
            recorder,
            symbols: config.symbols,
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_context_construction_and_stop() {
        let dir = tempdir().unwrap();
        let ctx = Context::new(ContextConfig {
            event_log_path: dir.path().join("events.bin"),
            ..Default::default()
        })
        .unwrap();

        assert!(ctx.is_running());
        assert!(!ctx.arm.live_enabled());
        assert!(!ctx.risk.killed());
        assert!(!ctx.cancel_fed.active());

        ctx.stop();
        assert!(!ctx.is_running());
    }

    #[test]
    fn test_context_fails_without_log_dir() {
        let err = Context::new(ContextConfig {
            event_log_path: PathBuf::from("/dev/null/nope/events.bin"),
            ..Default::default()
        });
        assert!(err.is_err());
    }
}
