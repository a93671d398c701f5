//! Dual-desk regime events: correlated desk losses escalate to a cancel
//! federation sweep and the drift latch.

use chimera_core::core::types::OrderStatus;
use chimera_core::execution::ExecutionRouter;
use chimera_core::testing::test_context;
use tempfile::tempdir;

fn drive_desk_into_loss(ctx: &chimera_core::Context, engine: &str) {
    for _ in 0..40 {
        ctx.desk.on_fill(engine, -120.0);
    }
}

#[test]
fn test_two_desks_paused_fires_federation_and_sweep() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    ctx.desk.register_engine("E_BTC", "BTC_DESK");
    ctx.desk.register_engine("E_ETH", "ETH_DESK");

    // Deep book: pending orders won't shadow-fill while the regime builds.
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);
    assert!(router.submit_order(&ctx, "B_0", "BTCUSDT", 100.00, 0.02, "E_BTC"));
    assert!(router.submit_order(&ctx, "O_0", "BTCUSDT", 99.99, 0.02, "E_OTHER"));

    drive_desk_into_loss(&ctx, "E_BTC");
    drive_desk_into_loss(&ctx, "E_ETH");
    assert!(!ctx.desk.allow_submit("E_BTC"));
    assert!(!ctx.desk.allow_submit("E_ETH"));

    // First tick: the desk poll detects the regime and raises the signal.
    router.poll(&ctx);
    // Next tick: the sweep cancels every open order and latches drift.
    router.poll(&ctx);

    assert_eq!(ctx.osm.get("B_0").unwrap().status, OrderStatus::Canceled);
    assert_eq!(ctx.osm.get("O_0").unwrap().status, OrderStatus::Canceled);
    assert_eq!(router.pending_coalescer_entries(), 0);

    assert!(ctx.risk.killed());
    let reason = ctx.risk.drift().detail().unwrap().reason;
    assert!(reason.contains("DESK_REGIME"), "reason: {}", reason);
}

#[test]
fn test_single_desk_pause_is_contained() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    ctx.desk.register_engine("E_BTC", "BTC_DESK");
    ctx.desk.register_engine("E_ETH", "ETH_DESK");
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);

    drive_desk_into_loss(&ctx, "E_BTC");
    router.poll(&ctx);

    // Paused desk's engine is blocked; the other desk trades on; no kill.
    assert!(!router.submit_order(&ctx, "B_0", "BTCUSDT", 100.00, 0.02, "E_BTC"));
    assert!(router.submit_order(&ctx, "O_0", "BTCUSDT", 100.00, 0.02, "E_ETH"));
    assert!(!ctx.risk.killed());
    assert!(!ctx.cancel_fed.active());
}

#[test]
fn test_desk_recovery_reopens_submissions() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    ctx.desk.register_engine("E_BTC", "BTC_DESK");
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 10.0, 100.01, 10.0, 1);

    drive_desk_into_loss(&ctx, "E_BTC");
    assert!(!ctx.desk.allow_submit("E_BTC"));

    // Winning tape pulls the EWMA positive; the poll resumes the desk.
    for _ in 0..200 {
        ctx.desk.on_fill("E_BTC", 60.0);
    }
    router.poll(&ctx);

    assert!(ctx.desk.allow_submit("E_BTC"));
    assert!(router.submit_order(&ctx, "B_1", "BTCUSDT", 100.00, 0.02, "E_BTC"));
}
