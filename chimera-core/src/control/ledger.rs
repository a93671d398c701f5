//! Profit ledger: per-engine cost/edge accounting, the admission threshold
//! function, and the periodic auto-tuner.
//!
//! Every fill produces a complete cost/edge record. From these the ledger
//! maintains, per engine: a 100-fill EMA of net bps (structural
//! profitability), fill/cancel rates, a p95 of ACK latency, and cumulative
//! net PnL. Those numbers gate everything:
//!
//! - **Admission**: predicted edge must beat real cost times the safety
//!   multiplier (and the engine's tuned edge floor).
//! - **Kill**: EV EMA below −3 bps sustained for 3 minutes, with at least 10
//!   fills, kills the engine through the PnL governor. One-shot sticky.
//! - **Auto-tune**: EV drives `min_edge_bps` and `size_multiplier`;
//!   fill/cancel rates drive the shadow fill-probability threshold.
//!
//! The real cost model is fully measurable:
//!
//! ```text
//! real_cost_bps = FEE_BPS + latency_bps + queue_bps
//!   latency_bps = (ack_latency_us / 1000) * symbol_vol_bps_per_ms
//!   queue_bps   = (1 - fill_prob) * spread_bps * 0.5
//! threshold     = max(real_cost_bps * SAFETY_MULT, engine_min_edge_bps)
//! ```
//!
//! The safety multiplier keeps the system out of slow-bleed territory: trade
//! only when edge is 50% above cost, not merely above it.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::control::pnl::PnLGovernor;
use crate::core::types::now_ns;

pub const FEE_BPS: f64 = 10.0;
pub const SAFETY_MULT: f64 = 1.5;
pub const DEFAULT_MIN_EDGE_BPS: f64 = 15.0;
pub const DEFAULT_SOFT_TTL_FILL_PROB: f64 = 0.35;

/// Conservative volatility default for symbols with no ticks yet.
pub const DEFAULT_VOL_BPS_PER_MS: f64 = 0.5;
const DEFAULT_SPREAD_BPS: f64 = 1.0;

const EV_EMA_ALPHA: f64 = 0.01;
const VOL_EMA_ALPHA: f64 = 0.1;
const LATENCY_WINDOW: usize = 200;
const MIN_FILLS_FOR_KILL: u64 = 10;
const MIN_FILLS_FOR_TUNE: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    pub ev_kill_threshold_bps: f64,
    pub ev_kill_sustain_ns: u64,
    pub autotune_interval_ns: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ev_kill_threshold_bps: -3.0,
            ev_kill_sustain_ns: 180_000_000_000, // 3 min
            autotune_interval_ns: 300_000_000_000, // 5 min
        }
    }
}

/// One fill's complete cost/edge breakdown, as reported by the router.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub engine_id: String,
    pub symbol: String,
    pub is_buy: bool,
    pub fill_price: f64,
    pub fill_qty: f64,
    pub latency_us: f64,
    pub predicted_edge_bps: f64,
    pub realized_edge_bps: f64,
    pub pnl_usd: f64,
    pub net_bps: f64,
}

#[derive(Debug, Clone)]
struct EngineMetrics {
    // Tunable parameters (auto-tuner writes these)
    min_edge_bps: f64,
    size_multiplier: f64,
    soft_ttl_fill_prob: f64,

    // Counters
    submits: u64,
    fills: u64,
    cancels: u64,

    // Rolling metrics
    ev_ema_bps: f64,
    net_pnl_usd: f64,

    // Kill state
    alive: bool,
    ev_negative_since_ns: u64,

    latency_samples: VecDeque<f64>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            min_edge_bps: DEFAULT_MIN_EDGE_BPS,
            size_multiplier: 1.0,
            soft_ttl_fill_prob: DEFAULT_SOFT_TTL_FILL_PROB,
            submits: 0,
            fills: 0,
            cancels: 0,
            ev_ema_bps: 0.0,
            net_pnl_usd: 0.0,
            alive: true,
            ev_negative_since_ns: 0,
            latency_samples: VecDeque::new(),
        }
    }
}

/// Serializable view of one engine's metrics, for telemetry/console dumps.
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetricsView {
    pub ev_ema_bps: f64,
    pub fill_rate: f64,
    pub cancel_rate: f64,
    pub latency_p95_us: f64,
    pub net_pnl_usd: f64,
    pub submits: u64,
    pub fills: u64,
    pub cancels: u64,
    pub min_edge_bps: f64,
    pub size_multiplier: f64,
    pub soft_ttl_fill_prob: f64,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct VolState {
    prev_mid: f64,
    prev_ts_ns: u64,
    vol_bps_per_ms: f64,
}

#[derive(Default)]
struct LedgerInner {
    engines: HashMap<String, EngineMetrics>,
    vol: HashMap<String, VolState>,
    spread_bps: HashMap<String, f64>,
    last_autotune_ns: u64,
}

pub struct ProfitLedger {
    config: LedgerConfig,
    inner: Mutex<LedgerInner>,
}

impl Default for ProfitLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl ProfitLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Per-engine initialization. Call during startup wiring.
    pub fn set_engine_defaults(
        &self,
        engine_id: &str,
        min_edge_bps: f64,
        size_multiplier: f64,
        soft_ttl_fill_prob: f64,
    ) {
        let mut inner = self.inner.lock();
        let m = inner.engines.entry(engine_id.to_string()).or_default();
        m.min_edge_bps = min_edge_bps;
        m.size_multiplier = size_multiplier;
        m.soft_ttl_fill_prob = soft_ttl_fill_prob;
    }

    pub fn on_submit(&self, engine_id: &str) {
        self.inner
            .lock()
            .engines
            .entry(engine_id.to_string())
            .or_default()
            .submits += 1;
    }

    pub fn on_cancel(&self, engine_id: &str) {
        self.inner
            .lock()
            .engines
            .entry(engine_id.to_string())
            .or_default()
            .cancels += 1;
    }

    /// The core data point: one fill's cost/edge record. Updates EV and
    /// latency tracking, checks the kill condition, and triggers the
    /// auto-tuner when its interval has elapsed.
    pub fn on_fill(&self, report: &FillReport, pnl: &PnLGovernor) {
        let now = now_ns();
        let mut inner = self.inner.lock();

        let m = inner
            .engines
            .entry(report.engine_id.clone())
            .or_default();
        m.fills += 1;
        m.net_pnl_usd += report.pnl_usd;
        m.ev_ema_bps = (1.0 - EV_EMA_ALPHA) * m.ev_ema_bps + EV_EMA_ALPHA * report.net_bps;

        m.latency_samples.push_back(report.latency_us);
        if m.latency_samples.len() > LATENCY_WINDOW {
            m.latency_samples.pop_front();
        }

        if m.fills >= MIN_FILLS_FOR_KILL {
            Self::check_kill(&self.config, &report.engine_id, m, now, pnl);
        }

        if now.saturating_sub(inner.last_autotune_ns) > self.config.autotune_interval_ns {
            inner.last_autotune_ns = now;
            Self::auto_tune(&mut inner.engines);
        }
    }

    /// Volatility feed: call with the current mid per symbol on each book
    /// update. Drives the latency cost component.
    pub fn on_price(&self, symbol: &str, mid: f64, ts_ns: u64) {
        let mut inner = self.inner.lock();
        let vs = inner.vol.entry(symbol.to_string()).or_default();

        if vs.prev_mid > 0.0 && vs.prev_ts_ns > 0 && ts_ns > vs.prev_ts_ns {
            let dt_ms = (ts_ns - vs.prev_ts_ns) as f64 / 1_000_000.0;
            // Min 50µs between samples: sub-tick jitter isn't volatility.
            if dt_ms > 0.05 {
                let change_bps = ((mid - vs.prev_mid) / vs.prev_mid).abs() * 10_000.0;
                let bps_per_ms = change_bps / dt_ms;
                vs.vol_bps_per_ms =
                    (1.0 - VOL_EMA_ALPHA) * vs.vol_bps_per_ms + VOL_EMA_ALPHA * bps_per_ms;
            }
        }
        vs.prev_mid = mid;
        vs.prev_ts_ns = ts_ns;
    }

    /// Spread cache feed from the router's top-of-book read, so the
    /// admission path never re-reads the book inside the ledger mutex.
    pub fn note_spread(&self, symbol: &str, spread_bps: f64) {
        if spread_bps > 0.0 {
            self.inner
                .lock()
                .spread_bps
                .insert(symbol.to_string(), spread_bps);
        }
    }

    /// The dynamic edge floor for a prospective order.
    pub fn admission_threshold(
        &self,
        engine_id: &str,
        symbol: &str,
        latency_us: f64,
        fill_prob: f64,
    ) -> f64 {
        let inner = self.inner.lock();

        let vol_bps_per_ms = inner
            .vol
            .get(symbol)
            .map(|v| v.vol_bps_per_ms)
            .filter(|&v| v > 0.0)
            .unwrap_or(DEFAULT_VOL_BPS_PER_MS);
        let spread_bps = inner
            .spread_bps
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_SPREAD_BPS);

        let latency_bps = (latency_us / 1000.0) * vol_bps_per_ms;
        let queue_bps = (1.0 - fill_prob) * spread_bps * 0.5;
        let real_cost = FEE_BPS + latency_bps + queue_bps;

        let engine_min = inner
            .engines
            .get(engine_id)
            .map(|m| m.min_edge_bps)
            .unwrap_or(DEFAULT_MIN_EDGE_BPS);

        (real_cost * SAFETY_MULT).max(engine_min)
    }

    pub fn min_edge(&self, engine_id: &str) -> f64 {
        self.inner
            .lock()
            .engines
            .get(engine_id)
            .map(|m| m.min_edge_bps)
            .unwrap_or(DEFAULT_MIN_EDGE_BPS)
    }

    pub fn size_multiplier(&self, engine_id: &str) -> f64 {
        self.inner
            .lock()
            .engines
            .get(engine_id)
            .map(|m| m.size_multiplier)
            .unwrap_or(1.0)
    }

    pub fn soft_ttl_fill_prob(&self, engine_id: &str) -> f64 {
        self.inner
            .lock()
            .engines
            .get(engine_id)
            .map(|m| m.soft_ttl_fill_prob)
            .unwrap_or(DEFAULT_SOFT_TTL_FILL_PROB)
    }

    pub fn alive(&self, engine_id: &str) -> bool {
        self.inner
            .lock()
            .engines
            .get(engine_id)
            .map(|m| m.alive)
            .unwrap_or(true)
    }

    /// Serializable per-engine metric views, for telemetry and the console.
    pub fn dump_metrics(&self) -> HashMap<String, EngineMetricsView> {
        let inner = self.inner.lock();
        inner
            .engines
            .iter()
            .map(|(id, m)| {
                let attempts = m.fills + m.cancels;
                let fill_rate = if attempts > 0 {
                    m.fills as f64 / attempts as f64
                } else {
                    0.0
                };
                let cancel_rate = if attempts > 0 {
                    m.cancels as f64 / attempts as f64
                } else {
                    0.0
                };
                (
                    id.clone(),
                    EngineMetricsView {
                        ev_ema_bps: m.ev_ema_bps,
                        fill_rate,
                        cancel_rate,
                        latency_p95_us: Self::latency_p95(m),
                        net_pnl_usd: m.net_pnl_usd,
                        submits: m.submits,
                        fills: m.fills,
                        cancels: m.cancels,
                        min_edge_bps: m.min_edge_bps,
                        size_multiplier: m.size_multiplier,
                        soft_ttl_fill_prob: m.soft_ttl_fill_prob,
                        alive: m.alive,
                    },
                )
            })
            .collect()
    }

    /// Run one tuner pass immediately, outside the 5-minute cadence.
    /// Operator/diagnostic surface; the timed path calls the same logic.
    pub fn run_auto_tune_now(&self) {
        let mut inner = self.inner.lock();
        inner.last_autotune_ns = now_ns();
        Self::auto_tune(&mut inner.engines);
    }

    fn check_kill(
        config: &LedgerConfig,
        engine_id: &str,
        m: &mut EngineMetrics,
        now: u64,
        pnl: &PnLGovernor,
    ) {
        if !m.alive {
            return;
        }

        if m.ev_ema_bps < config.ev_kill_threshold_bps {
            if m.ev_negative_since_ns == 0 {
                m.ev_negative_since_ns = now;
            }
            if now - m.ev_negative_since_ns >= config.ev_kill_sustain_ns {
                m.alive = false;
                warn!(
                    engine_id,
                    ev_ema_bps = m.ev_ema_bps,
                    sustained_s = (now - m.ev_negative_since_ns) / 1_000_000_000,
                    net_pnl_usd = m.net_pnl_usd,
                    "engine killed on sustained negative EV"
                );
                pnl.block_engine(engine_id);
            }
        } else {
            // Recovered above the threshold - reset the timer.
            m.ev_negative_since_ns = 0;
        }
    }

    fn auto_tune(engines: &mut HashMap<String, EngineMetrics>) {
        for (engine_id, m) in engines.iter_mut() {
            if !m.alive || m.fills < MIN_FILLS_FOR_TUNE {
                continue;
            }

            if m.ev_ema_bps > 5.0 {
                // Profitable: loosen the floor, grow the size.
                m.min_edge_bps = (m.min_edge_bps - 1.0).max(5.0);
                m.size_multiplier = (m.size_multiplier * 1.1).min(3.0);
                info!(
                    engine_id = %engine_id,
                    min_edge_bps = m.min_edge_bps,
                    size_multiplier = m.size_multiplier,
                    "auto-tune: EV > +5bps"
                );
            } else if m.ev_ema_bps < 0.0 {
                // Bleeding: tighten the floor, shrink the size.
                m.min_edge_bps = (m.min_edge_bps + 2.0).min(50.0);
                m.size_multiplier = (m.size_multiplier * 0.8).max(0.1);
                info!(
                    engine_id = %engine_id,
                    min_edge_bps = m.min_edge_bps,
                    size_multiplier = m.size_multiplier,
                    "auto-tune: EV < 0"
                );
            }

            let attempts = m.fills + m.cancels;
            if attempts > 0 {
                let fill_rate = m.fills as f64 / attempts as f64;
                let cancel_rate = m.cancels as f64 / attempts as f64;

                if fill_rate < 0.15 {
                    m.soft_ttl_fill_prob = (m.soft_ttl_fill_prob - 0.05).max(0.15);
                    info!(
                        engine_id = %engine_id,
                        soft_ttl_fill_prob = m.soft_ttl_fill_prob,
                        "auto-tune: fill rate < 15%"
                    );
                }
                if cancel_rate < 0.30 {
                    m.soft_ttl_fill_prob = (m.soft_ttl_fill_prob + 0.05).min(0.60);
                    info!(
                        engine_id = %engine_id,
                        soft_ttl_fill_prob = m.soft_ttl_fill_prob,
                        "auto-tune: cancel rate < 30%"
                    );
                }
            }
        }
    }

    fn latency_p95(m: &EngineMetrics) -> f64 {
        if m.latency_samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = m.latency_samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((0.95 * sorted.len() as f64) as usize).min(sorted.len() - 1);
        sorted[idx]
    }
}
