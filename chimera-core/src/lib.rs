//! Chimera Core - Crypto HFT Execution & Safety Spine
//!
//! The deterministic path from "an engine proposes an order" to "the order
//! is on the exchange, accounted for, and tracked through its lifecycle",
//! wrapped in a multi-layer governance cascade that can throttle, downsize,
//! block, cancel-all, or permanently kill trading at any instant.
//!
//! ## Architecture
//! - **Single root Context** constructed once in `main`; every component is
//!   `Sync` via interior mutability and borrows from it. No globals.
//! - **Core-pinned threads**: feeds on core 0; the execution router and all
//!   strategy engines time-share core 1 so fill delivery and engine
//!   decisions observe one book timeline.
//! - **Eight-layer safety cascade**: arm gate, per-engine EV/edge kills,
//!   desk governance, portfolio drawdown, queue decay, latency ladder,
//!   global risk governor, and the cancel-federation emergency sweep.
//! - **Forensics first**: every causally significant event lands in a
//!   CRC-framed append-only binary log with snapshot continuity across
//!   restarts.
//!
//! ## Core Modules
//! - `core`: domain types and error taxonomy
//! - `execution`: OSM, queue model, throttle, coalescer, federation, router
//! - `risk`: global risk governor + drift kill, latency governor
//! - `control`: PnL governor, desk arbiter, profit ledger, edge attribution
//! - `forensics`: event log, CRC32, replay
//! - `runtime`: context, arm system, snapshot, truth loop, threads
//! - `strategy`: engine contract and runner
//! - `exchange`: venue adapter interface

pub mod config;
pub mod control;
pub mod core;
pub mod exchange;
pub mod execution;
pub mod forensics;
pub mod risk;
pub mod runtime;
pub mod strategy;
pub mod telemetry;
pub mod testing;

// Re-export the spine's primary types.
pub use crate::core::{
    LifecycleEvent, OrderIntent, OrderRecord, OrderStatus, OrderSubmit, Side, SymbolMeta,
    SymbolTable, TopOfBook,
};
pub use crate::execution::{ExecutionRouter, OrderStateMachine, QueueModel};
pub use crate::runtime::{Context, ContextConfig, ContextSnapshotter};
pub use crate::strategy::{Engine, MarketTick, StrategyRunner};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::core::{
        LifecycleEvent, OrderIntent, OrderRecord, OrderStatus, OrderSubmit, Side, SymbolMeta,
        SymbolTable, TopOfBook,
    };
    pub use crate::exchange::{ExchangeAdapter, VenueOpenOrder, VenuePosition};
    pub use crate::execution::{ExecutionRouter, OrderStateMachine, QueueModel};
    pub use crate::runtime::{
        Context, ContextConfig, ContextSnapshotter, ExchangeTruthLoop, ThreadModel,
    };
    pub use crate::strategy::{Engine, MarketTick, StrategyRunner};
}
