//! Control layer: per-engine and portfolio capital governance.

pub mod desk;
pub mod edge;
pub mod ledger;
pub mod pnl;

pub use desk::DeskArbiter;
pub use edge::EdgeAttribution;
pub use ledger::{FillReport, ProfitLedger};
pub use pnl::PnLGovernor;
