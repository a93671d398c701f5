//! Chimera: the long-running trading process.
//!
//! Wires the context, the engine fleet, the execution router, and the truth
//! loop onto their cores, then babysits the run from the main thread:
//! telemetry pump, periodic console status, signal-flag shutdown, and the
//! snapshot save after every worker has joined.
//!
//! Venue adapter crates plug in behind the `ExchangeAdapter` trait; without
//! one the process runs the shadow path, optionally driven by a recorded
//! event-log tape (`--replay` / `CHIMERA_REPLAY`).

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chimera_core::config::RuntimeConfig;
use chimera_core::control::ledger::DEFAULT_SOFT_TTL_FILL_PROB;
use chimera_core::forensics::ReplayFeed;
use chimera_core::prelude::*;
use chimera_core::runtime::shutdown::install_signal_flag;
use chimera_core::runtime::{EXECUTION_CORE, FEED_CORE};
use chimera_strategies::{MeanReversion, MomentumBurst, QueueJoiner};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const ROUTER_POLL: Duration = Duration::from_micros(50);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about = "Chimera crypto HFT engine")]
struct Args {
    /// Exchange prefix for env-based configuration
    #[arg(long, default_value = "BINANCE")]
    exchange: String,

    /// Replay a recorded event log through the shadow path
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    let config = RuntimeConfig::from_env(&args.exchange);
    info!(
        exchange = %config.exchange,
        trade_mode = ?config.trade_mode,
        credentials = config.has_credentials(),
        "chimera starting"
    );
    if !config.has_credentials() {
        info!("no API credentials: shadow mode only");
    }

    let ctx = Arc::new(Context::new(ContextConfig {
        event_log_path: config.event_log_path.clone(),
        min_arm_secs: config.min_arm_secs,
        ..Default::default()
    })?);

    // Restore continuity before anything observes state.
    ContextSnapshotter::load(&ctx, &config.snapshot_path)?;

    // Signal handlers only set this flag; all cleanup happens below, in
    // this thread, after the workers have joined.
    let sigint = install_signal_flag()?;

    // ---- engine fleet + desk registration ----
    ctx.desk.register_engine("BTC_BURST", "BTC_DESK");
    ctx.desk.register_engine("QJOIN", "BTC_DESK");
    ctx.desk.register_engine("MEAN_REV", "MEAN_REV_DESK");
    for engine_id in ["BTC_BURST", "QJOIN", "MEAN_REV"] {
        ctx.ledger
            .set_engine_defaults(engine_id, 15.0, 1.0, DEFAULT_SOFT_TTL_FILL_PROB);
    }

    let universe: Vec<String> = ctx.symbols.symbols().map(|m| m.symbol.clone()).collect();
    let runners: Vec<StrategyRunner> = vec![
        StrategyRunner::new(Box::new(MomentumBurst::new("BTCUSDT")), universe.clone()),
        StrategyRunner::new(Box::new(QueueJoiner::new("BTCUSDT")), universe.clone()),
        StrategyRunner::new(Box::new(MeanReversion::new()), universe.clone()),
    ];

    // ---- execution router (no in-tree venue adapter: shadow path) ----
    let router = Arc::new(ExecutionRouter::new(None));

    // ---- truth loop (no-op until armed live with an adapter) ----
    let mut truth_loop = ExchangeTruthLoop::new(Duration::from_secs(config.truth_interval_secs));
    truth_loop.start(Arc::clone(&ctx), None);

    // ---- workers ----
    let mut workers = Vec::new();

    {
        let ctx = Arc::clone(&ctx);
        let router = Arc::clone(&router);
        workers.push(ThreadModel::spawn(
            "execution",
            Some(EXECUTION_CORE),
            move || {
                while ctx.is_running() {
                    router.poll(&ctx);
                    std::thread::sleep(ROUTER_POLL);
                }
            },
        )?);
    }

    for mut runner in runners {
        let ctx = Arc::clone(&ctx);
        let router = Arc::clone(&router);
        let name = format!("engine-{}", runner.engine_id());
        workers.push(ThreadModel::spawn(&name, Some(EXECUTION_CORE), move || {
            runner.run(&ctx, &router);
        })?);
    }

    if let Some(replay) = args.replay.or_else(|| {
        std::env::var("CHIMERA_REPLAY").ok().map(PathBuf::from)
    }) {
        let ctx = Arc::clone(&ctx);
        workers.push(ThreadModel::spawn("replay-feed", Some(FEED_CORE), move || {
            match ReplayFeed::replay_into(&ctx, &replay) {
                Ok(ticks) => info!(ticks, "replay feed finished"),
                Err(e) => warn!(error = %e, "replay feed failed"),
            }
        })?);
    }

    // ---- main thread: telemetry pump + status + shutdown watch ----
    let start = Instant::now();
    let mut last_status = Instant::now();
    while ctx.is_running() {
        if sigint.load(Ordering::Acquire) {
            info!("shutdown signal observed");
            ctx.stop();
            break;
        }

        ctx.telemetry.set_uptime(start.elapsed().as_secs());
        ctx.telemetry.set_drift(ctx.risk.killed());

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            print_status(&ctx, start.elapsed().as_secs());
        }

        std::thread::sleep(Duration::from_millis(100));
    }
    ctx.stop();

    truth_loop.stop();
    for worker in workers {
        worker.join();
    }

    // Snapshot save happens here, in the main thread, after every loop has
    // joined - never in signal context.
    info!("all workers stopped, saving snapshot");
    if let Err(e) = ContextSnapshotter::save(&ctx, &config.snapshot_path) {
        warn!(error = %e, "snapshot save failed");
    }

    info!("clean exit");
    Ok(())
}

fn print_status(ctx: &Context, uptime_s: u64) {
    let positions = ctx.risk.dump_positions();
    let engines = ctx.ledger.dump_metrics();

    info!(
        uptime_s,
        arm = ctx.arm.status(),
        killed = ctx.risk.killed(),
        portfolio_pnl = ctx.pnl.portfolio_pnl(),
        fills = ctx.telemetry.total_fills(),
        throttle_blocks = ctx.telemetry.throttle_blocks(),
        risk_blocks = ctx.telemetry.risk_blocks(),
        admission_blocks = ctx.telemetry.admission_blocks(),
        "status"
    );

    for meta in ctx.symbols.symbols() {
        let tob = ctx.queue.top(&meta.symbol);
        let pos = positions.get(&meta.symbol).copied().unwrap_or(0.0);
        if tob.valid || pos != 0.0 {
            info!(
                symbol = %meta.symbol,
                pos,
                bid = tob.bid,
                ask = tob.ask,
                "book"
            );
        }
    }

    for (engine_id, m) in engines {
        info!(
            engine = %engine_id,
            ev_bps = m.ev_ema_bps,
            net_pnl = m.net_pnl_usd,
            fills = m.fills,
            alive = m.alive,
            "engine"
        );
    }
}
