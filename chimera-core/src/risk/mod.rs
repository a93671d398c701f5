//! Risk layer: global position/notional governance with the drift kill, and
//! the latency governor ladder.

pub mod governor;
pub mod latency;

pub use governor::{DriftKill, GlobalRiskGovernor};
pub use latency::{LatencyGovernor, LatencyState};
