//! Outbound order rate limits: global and per-symbol one-second rolling
//! windows. A denied submit is a silent drop with a counter bump upstream,
//! never an error.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

/// Default global submissions per second.
pub const DEFAULT_GLOBAL_RATE: u32 = 20;
/// Default per-symbol submissions per second.
pub const DEFAULT_SYMBOL_RATE: u32 = 5;

struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
        }
    }

    fn allow(&mut self, now: Instant, rate: u32) -> bool {
        if now.duration_since(self.started).as_nanos() > 1_000_000_000 {
            self.started = now;
            self.count = 0;
        }
        if self.count >= rate {
            return false;
        }
        self.count += 1;
        true
    }
}

struct ThrottleInner {
    global: Window,
    symbols: HashMap<String, Window>,
}

pub struct ExecutionThrottle {
    global_rate: u32,
    symbol_rate: u32,
    inner: Mutex<ThrottleInner>,
}

impl ExecutionThrottle {
    pub fn new(global_rate: u32, symbol_rate: u32) -> Self {
        Self {
            global_rate,
            symbol_rate,
            inner: Mutex::new(ThrottleInner {
                global: Window::new(Instant::now()),
                symbols: HashMap::new(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_GLOBAL_RATE, DEFAULT_SYMBOL_RATE)
    }

    /// Consume one slot from the global window.
    pub fn allow_global(&self) -> bool {
        let now = Instant::now();
        self.inner.lock().global.allow(now, self.global_rate)
    }

    /// Consume one slot from the symbol's window.
    pub fn allow_symbol(&self, symbol: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let rate = self.symbol_rate;
        inner
            .symbols
            .entry(symbol.to_string())
            .or_insert_with(|| Window::new(now))
            .allow(now, rate)
    }
}
