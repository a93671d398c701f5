//! Full loop: a real engine through the strategy runner into the router's
//! shadow path.

use chimera_core::execution::ExecutionRouter;
use chimera_core::testing::test_context;
use chimera_core::StrategyRunner;
use chimera_strategies::MomentumBurst;
use tempfile::tempdir;

#[test]
fn test_momentum_burst_fills_in_shadow() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    let mut runner = StrategyRunner::new(
        Box::new(MomentumBurst::new("BTCUSDT")),
        vec!["BTCUSDT".to_string()],
    );

    // Seed tick, then a +30 bps burst: the engine lifts the ask.
    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);
    runner.poll_once(&ctx, &router);
    ctx.queue
        .on_book_update("BTCUSDT", 100.30, 1.0, 100.31, 1.0, 2);
    runner.poll_once(&ctx, &router);

    // One pending order from the burst; the marketable price estimates at
    // the 0.85 cap, so the next execution tick fills it.
    assert_eq!(router.pending_coalescer_entries(), 1);
    router.poll(&ctx);

    assert_eq!(ctx.telemetry.total_fills(), 1);
    assert!((ctx.risk.get_position("BTCUSDT") - 0.01).abs() < 1e-12);
}

#[test]
fn test_killed_engine_stops_generating() {
    let dir = tempdir().unwrap();
    let ctx = test_context(dir.path());
    let router = ExecutionRouter::new(None);

    let mut runner = StrategyRunner::new(
        Box::new(MomentumBurst::new("BTCUSDT")),
        vec!["BTCUSDT".to_string()],
    );

    // Kill the engine's strategy gate up front.
    ctx.pnl.block_engine("BTC_BURST");

    ctx.queue
        .on_book_update("BTCUSDT", 100.00, 1.0, 100.01, 1.0, 1);
    runner.poll_once(&ctx, &router);
    ctx.queue
        .on_book_update("BTCUSDT", 100.30, 1.0, 100.31, 1.0, 2);
    runner.poll_once(&ctx, &router);
    router.poll(&ctx);

    // The burst intent was generated but blocked at the governor cascade.
    assert_eq!(ctx.telemetry.total_fills(), 0);
    assert!(ctx.osm.is_empty());
}
