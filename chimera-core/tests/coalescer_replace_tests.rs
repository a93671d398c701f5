//! Cancel-replace coalescing through the router: one pending order per
//! (engine, symbol) at any instant.

use chimera_core::core::types::OrderStatus;
use chimera_core::execution::ExecutionRouter;
use chimera_core::testing::test_context;
use tempfile::tempdir;

#[test]
fn test_cancel_replace_before_ack() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    // Deep book so neither order shadow-fills during the test.
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);

    assert!(router.submit_order(&ctx, "E1_0", "BTCUSDT", 100.00, 0.02, "E1"));
    assert_eq!(router.pending_coalescer_entries(), 1);

    // Same engine, same symbol, better price, before any ACK: the router
    // cancels the first via its client id and installs the second.
    assert!(router.submit_order(&ctx, "E1_1", "BTCUSDT", 99.99, 0.02, "E1"));

    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::Canceled);
    assert_eq!(ctx.osm.get("E1_1").unwrap().status, OrderStatus::New);

    // Exactly one pending entry for (E1, BTCUSDT), and it is the new one.
    assert_eq!(router.pending_coalescer_entries(), 1);
    let (client_id, pending) = router.find_pending("E1", "BTCUSDT").unwrap();
    assert_eq!(client_id, "E1_1");
    assert_eq!(pending.price, 99.99);
}

#[test]
fn test_same_price_resubmission_deduplicated() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);

    assert!(router.submit_order(&ctx, "E1_0", "BTCUSDT", 100.00, 0.02, "E1"));
    // Identical price: pure duplicate, dropped, original untouched.
    assert!(!router.submit_order(&ctx, "E1_1", "BTCUSDT", 100.00, 0.02, "E1"));

    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::New);
    assert!(ctx.osm.get("E1_1").is_err());
    assert_eq!(router.pending_coalescer_entries(), 1);
}

#[test]
fn test_distinct_engines_and_symbols_do_not_coalesce() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);
    ctx.queue
        .on_book_update("ETHUSDT", 2000.00, 50.0, 2000.01, 50.0, 1);

    assert!(router.submit_order(&ctx, "E1_0", "BTCUSDT", 100.00, 0.02, "E1"));
    assert!(router.submit_order(&ctx, "E2_0", "BTCUSDT", 99.99, 0.02, "E2"));
    assert!(router.submit_order(&ctx, "E1_1", "ETHUSDT", 2000.00, 0.002, "E1"));

    assert_eq!(router.pending_coalescer_entries(), 3);
    assert_eq!(ctx.osm.get("E1_0").unwrap().status, OrderStatus::New);
}
