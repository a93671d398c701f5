//! Chimera strategy engines.
//!
//! Each engine is a black box behind [`chimera_core::Engine`]: ticks in,
//! order intents out. The execution spine treats them uniformly - arming,
//! sizing, admission, and kill decisions all happen downstream, so engines
//! here only express signal logic and their own position discipline.

pub mod mean_reversion;
pub mod momentum;
pub mod queue_maker;

pub use mean_reversion::MeanReversion;
pub use momentum::MomentumBurst;
pub use queue_maker::QueueJoiner;
