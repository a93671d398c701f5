//! Latency governor: EWMA of order ACK round-trip latency, classified into
//! a four-step ladder that scales order size down as the link degrades and
//! demands a cancel-federation sweep at the critical threshold.
//!
//! The EWMA is stored as f64 bits in an atomic so the hot path reads it
//! without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

const EWMA_ALPHA: f64 = 0.1;

const WARN_US: f64 = 500.0;
const STRESSED_US: f64 = 2_000.0;
const CRITICAL_US: f64 = 5_000.0;

/// Ladder classification of the current latency regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyState {
    Normal,
    Warn,
    Stressed,
    /// Demand cancel federation; no further submissions.
    Critical,
}

impl LatencyState {
    /// Order size scaling applied by the router.
    pub fn size_multiplier(&self) -> f64 {
        match self {
            LatencyState::Normal => 1.0,
            LatencyState::Warn => 0.5,
            LatencyState::Stressed => 0.25,
            LatencyState::Critical => 0.0,
        }
    }
}

#[derive(Default)]
pub struct LatencyGovernor {
    ewma_us_bits: AtomicU64,
    last_us_bits: AtomicU64,
}

impl LatencyGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one ACK round-trip sample (microseconds).
    pub fn on_ack_latency(&self, latency_us: f64) {
        if !latency_us.is_finite() || latency_us < 0.0 {
            return;
        }
        self.last_us_bits
            .store(latency_us.to_bits(), Ordering::Relaxed);

        let prev = f64::from_bits(self.ewma_us_bits.load(Ordering::Relaxed));
        let next = if prev == 0.0 {
            latency_us // first sample seeds the EWMA
        } else {
            (1.0 - EWMA_ALPHA) * prev + EWMA_ALPHA * latency_us
        };
        self.ewma_us_bits.store(next.to_bits(), Ordering::Relaxed);
    }

    pub fn ewma_us(&self) -> f64 {
        f64::from_bits(self.ewma_us_bits.load(Ordering::Relaxed))
    }

    /// Most recent raw sample - the queue decay governor's urgency input.
    pub fn last_latency_us(&self) -> f64 {
        f64::from_bits(self.last_us_bits.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> LatencyState {
        let ewma = self.ewma_us();
        if ewma < WARN_US {
            LatencyState::Normal
        } else if ewma < STRESSED_US {
            LatencyState::Warn
        } else if ewma < CRITICAL_US {
            LatencyState::Stressed
        } else {
            LatencyState::Critical
        }
    }

    pub fn size_multiplier(&self) -> f64 {
        self.state().size_multiplier()
    }

    #[inline]
    pub fn is_critical(&self) -> bool {
        self.state() == LatencyState::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fresh_governor_is_normal() {
        let g = LatencyGovernor::new();
        assert_eq!(g.state(), LatencyState::Normal);
        assert_eq!(g.size_multiplier(), 1.0);
        assert!(!g.is_critical());
    }

    #[test]
    fn test_first_sample_seeds_ewma() {
        let g = LatencyGovernor::new();
        g.on_ack_latency(300.0);
        assert_relative_eq!(g.ewma_us(), 300.0);
        assert_relative_eq!(g.last_latency_us(), 300.0);
    }

    #[test]
    fn test_ewma_smoothing() {
        let g = LatencyGovernor::new();
        g.on_ack_latency(100.0);
        g.on_ack_latency(200.0);
        // 0.9 * 100 + 0.1 * 200 = 110
        assert_relative_eq!(g.ewma_us(), 110.0);
    }

    #[test]
    fn test_ladder_steps() {
        let cases = [
            (400.0, LatencyState::Normal, 1.0),
            (800.0, LatencyState::Warn, 0.5),
            (3_000.0, LatencyState::Stressed, 0.25),
            (6_000.0, LatencyState::Critical, 0.0),
        ];
        for (us, state, mult) in cases {
            let g = LatencyGovernor::new();
            g.on_ack_latency(us);
            assert_eq!(g.state(), state, "at {}us", us);
            assert_eq!(g.size_multiplier(), mult);
        }
    }

    #[test]
    fn test_critical_flag() {
        let g = LatencyGovernor::new();
        g.on_ack_latency(10_000.0);
        assert!(g.is_critical());
    }

    #[test]
    fn test_recovery_through_ladder() {
        let g = LatencyGovernor::new();
        g.on_ack_latency(6_000.0);
        assert!(g.is_critical());
        // Sustained fast ACKs drag the EWMA back down.
        for _ in 0..60 {
            g.on_ack_latency(100.0);
        }
        assert_eq!(g.state(), LatencyState::Normal);
    }

    #[test]
    fn test_garbage_samples_ignored() {
        let g = LatencyGovernor::new();
        g.on_ack_latency(f64::NAN);
        g.on_ack_latency(-5.0);
        g.on_ack_latency(f64::INFINITY);
        assert_eq!(g.ewma_us(), 0.0);
    }
}
