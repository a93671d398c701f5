//! Cold-start gate: boot reconciliation against exchange truth decides
//! whether the arm sequence unlocks.

use chimera_core::exchange::{ExchangeAdapter, VenueOpenOrder, VenuePosition};
use chimera_core::execution::ExecutionRouter;
use chimera_core::runtime::ColdStartReconciler;
use chimera_core::testing::{test_context, MockExchangeAdapter};
use tempfile::tempdir;

#[test]
fn test_clean_state_unlocks_arming() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();

    ctx.arm.lock_pending_reconcile();
    assert!(!ctx.arm.request_arm("GO"));

    let (ok, report) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(ok, "report:\n{}", report);
    assert!(report.contains("PASS"));
    assert!(ctx.arm.request_arm("GO"));
}

#[test]
fn test_matching_positions_pass() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();

    ctx.risk.restore_position("BTCUSDT", 0.02);
    adapter.set_positions(vec![VenuePosition {
        symbol: "BTCUSDT".to_string(),
        qty: 0.02,
    }]);

    let (ok, _) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(ok);
}

#[test]
fn test_position_mismatch_locks_arming() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();

    ctx.risk.restore_position("BTCUSDT", 0.02);
    adapter.set_positions(vec![VenuePosition {
        symbol: "BTCUSDT".to_string(),
        qty: 0.05,
    }]);

    let (ok, report) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(!ok);
    assert!(report.contains("MISMATCH"));
    assert!(!ctx.arm.request_arm("GO"));
}

#[test]
fn test_local_position_missing_on_exchange_fails() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();

    ctx.risk.restore_position("ETHUSDT", -0.5);

    let (ok, report) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(!ok);
    assert!(report.contains("not on exchange"));
}

#[test]
fn test_unknown_open_order_fails() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();

    adapter.set_open_orders(vec![VenueOpenOrder {
        client_id: "GHOST_1".to_string(),
        symbol: "BTCUSDT".to_string(),
        price: 100.0,
        qty: 0.01,
    }]);

    let (ok, report) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(!ok);
    assert!(report.contains("unknown open order"));
}

#[test]
fn test_known_snapshot_order_passes() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();
    let router = ExecutionRouter::new(None);

    // An order restored from snapshot (still in the OSM) resting on the
    // exchange is consistent state.
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);
    assert!(router.submit_order(&ctx, "E1_0", "BTCUSDT", 100.00, 0.02, "E1"));

    adapter.set_open_orders(vec![VenueOpenOrder {
        client_id: "E1_0".to_string(),
        symbol: "BTCUSDT".to_string(),
        price: 100.0,
        qty: 0.02,
    }]);

    let (ok, _) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(ok);
}

#[test]
fn test_venue_failure_fails_gate() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = MockExchangeAdapter::new();
    adapter.fail_requests(true);

    let (ok, report) = ColdStartReconciler::reconcile(&ctx, &[&adapter as &dyn ExchangeAdapter]);
    assert!(!ok);
    assert!(report.contains("FAIL"));
    assert!(!ctx.risk.killed()); // the gate locks arming, it does not kill
}
