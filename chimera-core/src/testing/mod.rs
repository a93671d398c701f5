//! Test support: a scriptable mock exchange adapter and context builders.
//!
//! Compiled into the library (not cfg(test)) so integration tests and the
//! strategies crate's tests can share them.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::errors::AdapterError;
use crate::core::types::OrderSubmit;
use crate::exchange::{ExchangeAdapter, VenueOpenOrder, VenuePosition};
use crate::runtime::context::{Context, ContextConfig};

/// Build a context against a temp-dir event log, with a zero-second arm
/// time lock so live-mode tests can arm synchronously.
pub fn test_context(dir: &std::path::Path) -> Context {
    let config = ContextConfig {
        event_log_path: dir.join("events.bin"),
        min_arm_secs: 0,
        ..Default::default()
    };
    Context::new(config).expect("test context")
}

/// Arm straight through to live. Only usable with a zero time lock.
pub fn arm_live(ctx: &Context) {
    assert!(ctx.arm.request_arm("TEST-ARM"));
    assert!(ctx.arm.confirm_arm("TEST-ARM"));
    assert!(ctx.arm.verify_exchange());
    assert!(ctx.arm.live_enabled());
}

/// Scriptable venue: records outbound orders/cancels, serves configured
/// positions and open orders, and can be failed on demand.
#[derive(Default)]
pub struct MockExchangeAdapter {
    pub sent_orders: Mutex<Vec<OrderSubmit>>,
    pub canceled: Mutex<Vec<String>>,
    positions: Mutex<Vec<VenuePosition>>,
    open_orders: Mutex<Vec<VenueOpenOrder>>,
    fail_requests: AtomicBool,
    reject_sends: AtomicBool,
}

impl MockExchangeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_positions(&self, positions: Vec<VenuePosition>) {
        *self.positions.lock() = positions;
    }

    pub fn set_open_orders(&self, orders: Vec<VenueOpenOrder>) {
        *self.open_orders.lock() = orders;
    }

    /// Make truth queries fail, as a dead REST endpoint would.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::Release);
    }

    /// Make order submission/cancel return false (transport backpressure).
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::Release);
    }

    pub fn sent_count(&self) -> usize {
        self.sent_orders.lock().len()
    }

    pub fn canceled_ids(&self) -> Vec<String> {
        self.canceled.lock().clone()
    }
}

impl ExchangeAdapter for MockExchangeAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn send_order(&self, order: &OrderSubmit) -> bool {
        if self.reject_sends.load(Ordering::Acquire) {
            return false;
        }
        self.sent_orders.lock().push(order.clone());
        true
    }

    fn cancel_order(&self, client_id: &str) -> bool {
        if self.reject_sends.load(Ordering::Acquire) {
            return false;
        }
        self.canceled.lock().push(client_id.to_string());
        true
    }

    fn get_all_positions(&self) -> Result<Vec<VenuePosition>, AdapterError> {
        if self.fail_requests.load(Ordering::Acquire) {
            return Err(AdapterError::Request("mock request failure".to_string()));
        }
        Ok(self.positions.lock().clone())
    }

    fn get_all_open_orders(&self) -> Result<Vec<VenueOpenOrder>, AdapterError> {
        if self.fail_requests.load(Ordering::Acquire) {
            return Err(AdapterError::Request("mock request failure".to_string()));
        }
        Ok(self.open_orders.lock().clone())
    }
}
