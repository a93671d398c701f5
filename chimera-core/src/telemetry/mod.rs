//! In-process telemetry: lock-free counters for the hot-path gates and a
//! mutex-guarded per-symbol map, dumped as JSON for the console and any
//! external scraper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolTelemetry {
    pub position_qty: f64,
    pub notional: f64,
    pub last_update_ns: u64,
}

#[derive(Default)]
pub struct TelemetryState {
    uptime_sec: AtomicU64,
    latency_us: AtomicU64,
    drift: AtomicBool,

    // Gate counters are atomics: two concurrent submits must never lose an
    // increment to a read-modify-write race.
    throttle_blocks: AtomicU64,
    risk_blocks: AtomicU64,
    admission_blocks: AtomicU64,
    total_fills: AtomicU64,

    symbols: Mutex<HashMap<String, SymbolTelemetry>>,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_uptime(&self, sec: u64) {
        self.uptime_sec.store(sec, Ordering::Relaxed);
    }

    pub fn set_latency_us(&self, us: u64) {
        self.latency_us.store(us, Ordering::Relaxed);
    }

    pub fn set_drift(&self, v: bool) {
        self.drift.store(v, Ordering::Relaxed);
    }

    pub fn increment_throttle_block(&self) {
        self.throttle_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn throttle_blocks(&self) -> u64 {
        self.throttle_blocks.load(Ordering::Relaxed)
    }

    /// Governor-cascade rejections: a separate counter from throttle blocks
    /// so the bottleneck is attributable.
    pub fn increment_risk_block(&self) {
        self.risk_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn risk_blocks(&self) -> u64 {
        self.risk_blocks.load(Ordering::Relaxed)
    }

    /// Profit-ledger admission rejections.
    pub fn increment_admission_block(&self) {
        self.admission_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission_blocks(&self) -> u64 {
        self.admission_blocks.load(Ordering::Relaxed)
    }

    pub fn increment_fills(&self) {
        self.total_fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_fills(&self) -> u64 {
        self.total_fills.load(Ordering::Relaxed)
    }

    pub fn update_symbol(&self, symbol: &str, qty: f64, notional: f64, ts_ns: u64) {
        let mut symbols = self.symbols.lock();
        let s = symbols.entry(symbol.to_string()).or_default();
        s.position_qty = qty;
        s.notional = notional;
        s.last_update_ns = ts_ns;
    }

    pub fn symbol(&self, symbol: &str) -> Option<SymbolTelemetry> {
        self.symbols.lock().get(symbol).copied()
    }

    pub fn to_json(&self) -> String {
        let symbols = self.symbols.lock();
        let sym_map: serde_json::Map<String, serde_json::Value> = symbols
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    json!({
                        "qty": v.position_qty,
                        "notional": v.notional,
                        "last_ns": v.last_update_ns,
                    }),
                )
            })
            .collect();

        json!({
            "uptime": self.uptime_sec.load(Ordering::Relaxed),
            "latency_us": self.latency_us.load(Ordering::Relaxed),
            "drift": self.drift.load(Ordering::Relaxed),
            "throttle_blocks": self.throttle_blocks(),
            "risk_blocks": self.risk_blocks(),
            "admission_blocks": self.admission_blocks(),
            "total_fills": self.total_fills(),
            "symbols": sym_map,
        })
        .to_string()
    }
}
