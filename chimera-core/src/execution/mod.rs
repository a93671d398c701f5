//! Execution spine: order state, queue model, admission throttling,
//! cancel-replace coalescing, the cancel federation, queue decay, and the
//! router that ties them together.

pub mod cancel_federation;
pub mod coalescer;
pub mod order_state;
pub mod queue_decay;
pub mod queue_model;
pub mod router;
pub mod throttle;

pub use cancel_federation::CancelFederation;
pub use coalescer::{CancelReplaceCoalescer, PendingOrder};
pub use order_state::OrderStateMachine;
pub use queue_decay::{QueueDecayConfig, QueueDecayGovernor};
pub use queue_model::{QueueEstimate, QueueModel, QueueState};
pub use router::ExecutionRouter;
pub use throttle::ExecutionThrottle;
