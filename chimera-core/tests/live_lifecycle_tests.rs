//! Live-path lifecycle: orders out through the adapter, ACK/FILL/CANCEL/
//! REJECT events back through the user-feed channel, and the adapter
//! circuit breaker.

use std::sync::Arc;

use chimera_core::core::types::{LifecycleEvent, OrderStatus};
use chimera_core::execution::ExecutionRouter;
use chimera_core::testing::{arm_live, test_context, MockExchangeAdapter};
use tempfile::tempdir;

/// Deep passive buy that clears the live edge admission with default
/// ledger parameters.
fn submit_live_buy(
    router: &ExecutionRouter,
    ctx: &chimera_core::Context,
    client_id: &str,
    qty: f64,
) -> bool {
    router.submit_order(ctx, client_id, "BTCUSDT", 99.80, qty, "E1")
}

#[test]
fn test_ack_fill_lifecycle_updates_everything() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = Arc::new(MockExchangeAdapter::new());
    let router = ExecutionRouter::new(Some(adapter.clone()));

    arm_live(&ctx);
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);

    assert!(submit_live_buy(&router, &ctx, "E1_0", 0.02));
    assert_eq!(adapter.sent_count(), 1);
    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::New);

    // User feed delivers the ACK, then a partial fill, then the rest.
    let tx = router.lifecycle_sender();
    tx.send(LifecycleEvent::Ack {
        client_id: "E1_0".to_string(),
        exchange_id: "X1".to_string(),
    })
    .unwrap();
    router.poll(&ctx);
    let rec = ctx.osm.get("E1_0").unwrap();
    assert_eq!(rec.status, OrderStatus::Acked);
    assert_eq!(rec.exchange_id.as_deref(), Some("X1"));
    assert!(ctx.latency.ewma_us() > 0.0);

    tx.send(LifecycleEvent::Fill {
        exchange_id: "X1".to_string(),
        qty: 0.01,
        price: 99.80,
    })
    .unwrap();
    router.poll(&ctx);
    assert_eq!(
        ctx.osm.get("E1_0").unwrap().status,
        OrderStatus::PartiallyFilled
    );
    assert!((ctx.risk.get_position("BTCUSDT") - 0.01).abs() < 1e-12);

    tx.send(LifecycleEvent::Fill {
        exchange_id: "X1".to_string(),
        qty: 0.01,
        price: 99.80,
    })
    .unwrap();
    router.poll(&ctx);
    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::Filled);
    assert!((ctx.risk.get_position("BTCUSDT") - 0.02).abs() < 1e-12);
    assert_eq!(ctx.telemetry.total_fills(), 2);
    assert_eq!(router.pending_coalescer_entries(), 0);

    // A buy below mid scores positive edge; the engine's PnL reflects it.
    assert!(ctx.pnl.portfolio_pnl() > 0.0);
}

#[test]
fn test_cancel_event_resolves_order() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = Arc::new(MockExchangeAdapter::new());
    let router = ExecutionRouter::new(Some(adapter));

    arm_live(&ctx);
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);
    assert!(submit_live_buy(&router, &ctx, "E1_0", 0.02));

    let tx = router.lifecycle_sender();
    tx.send(LifecycleEvent::Ack {
        client_id: "E1_0".to_string(),
        exchange_id: "X1".to_string(),
    })
    .unwrap();
    tx.send(LifecycleEvent::Cancel {
        exchange_id: "X1".to_string(),
    })
    .unwrap();
    router.poll(&ctx);

    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::Canceled);
    assert_eq!(router.pending_coalescer_entries(), 0);
    // Cancel frees the edge-attribution pending slot.
    assert_eq!(ctx.edge.pending_count(), 0);
}

#[test]
fn test_reject_event_resolves_order() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = Arc::new(MockExchangeAdapter::new());
    let router = ExecutionRouter::new(Some(adapter));

    arm_live(&ctx);
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);
    assert!(submit_live_buy(&router, &ctx, "E1_0", 0.02));

    router
        .lifecycle_sender()
        .send(LifecycleEvent::Reject {
            client_id: "E1_0".to_string(),
        })
        .unwrap();
    router.poll(&ctx);

    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::Rejected);
    assert_eq!(router.pending_coalescer_entries(), 0);
}

#[test]
fn test_adapter_circuit_breaker_drift_kills() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = Arc::new(MockExchangeAdapter::new());
    let router = ExecutionRouter::new(Some(adapter.clone()));

    arm_live(&ctx);
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);

    adapter.reject_sends(true);

    // Three consecutive transport failures trip the breaker. Distinct
    // engines so the coalescer doesn't dedup the retries.
    assert!(router.submit_order(&ctx, "E1_0", "BTCUSDT", 99.80, 0.02, "E1"));
    assert!(!ctx.risk.killed());
    assert!(router.submit_order(&ctx, "E2_0", "BTCUSDT", 99.80, 0.02, "E2"));
    assert!(!ctx.risk.killed());
    assert!(router.submit_order(&ctx, "E3_0", "BTCUSDT", 99.80, 0.02, "E3"));

    assert!(ctx.risk.killed());
    let reason = ctx.risk.drift().detail().unwrap().reason;
    assert!(reason.contains("circuit breaker"), "reason: {}", reason);
}

#[test]
fn test_fill_before_ack_cannot_resolve() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let adapter = Arc::new(MockExchangeAdapter::new());
    let router = ExecutionRouter::new(Some(adapter));

    arm_live(&ctx);
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);
    assert!(submit_live_buy(&router, &ctx, "E1_0", 0.02));

    // A FILL arriving before the ACK has no index entry to resolve
    // through; the order is untouched.
    router
        .lifecycle_sender()
        .send(LifecycleEvent::Fill {
            exchange_id: "X1".to_string(),
            qty: 0.02,
            price: 99.80,
        })
        .unwrap();
    router.poll(&ctx);
    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::New);
}
