//! Runtime: the root context, arm system, snapshot continuity, exchange
//! truth loop, cold-start gate, thread model, and shutdown signalling.

pub mod arm;
pub mod cold_start;
pub mod context;
pub mod shutdown;
pub mod snapshot;
pub mod thread;
pub mod truth_loop;

pub use arm::{ArmState, ArmSystem};
pub use cold_start::ColdStartReconciler;
pub use context::{Context, ContextConfig};
pub use snapshot::ContextSnapshotter;
pub use thread::{ThreadModel, EXECUTION_CORE, FEED_CORE};
pub use truth_loop::{check_exchange_state, ExchangeTruthLoop};
