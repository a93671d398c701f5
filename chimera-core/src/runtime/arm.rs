//! Live arm system: the time-locked human-confirmation gate between shadow
//! and live trading.
//!
//! State machine: `DISARMED → ARM_REQUESTED → ARMED → VERIFIED`. A minimum
//! wall-clock delay must elapse between the arm request and its
//! confirmation; live trading requires the full `VERIFIED` state.
//!
//! On snapshot restore, `armed` is restored but `verified` is always reset:
//! the exchange must be re-checked on every boot. The cold-start gate can
//! additionally lock arm requests until the boot reconcile passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

pub const DEFAULT_MIN_ARM_SECONDS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Disarmed,
    ArmRequested,
    Armed,
    Verified,
}

#[derive(Default)]
struct ArmRequest {
    code: String,
    requested_at: Option<Instant>,
}

pub struct ArmSystem {
    min_arm_secs: u64,
    armed: AtomicBool,
    verified: AtomicBool,
    /// False while the cold-start reconcile is pending in a live boot.
    cold_start_ok: AtomicBool,
    request: Mutex<ArmRequest>,
}

impl ArmSystem {
    pub fn new(min_arm_secs: u64) -> Self {
        Self {
            min_arm_secs,
            armed: AtomicBool::new(false),
            verified: AtomicBool::new(false),
            cold_start_ok: AtomicBool::new(true),
            request: Mutex::new(ArmRequest::default()),
        }
    }

    /// Begin the arm sequence. Resets any prior armed/verified state and
    /// starts the time lock. Refused while the cold-start gate is locked.
    pub fn request_arm(&self, code: &str) -> bool {
        if !self.cold_start_ok.load(Ordering::Acquire) {
            warn!("arm request refused: cold-start reconcile has not passed");
            return false;
        }
        let mut req = self.request.lock();
        req.code = code.to_string();
        req.requested_at = Some(Instant::now());
        self.armed.store(false, Ordering::Release);
        self.verified.store(false, Ordering::Release);
        info!("arm requested, waiting for confirmation");
        true
    }

    /// Human confirmation. Requires the matching code and an elapsed time
    /// lock.
    pub fn confirm_arm(&self, code: &str) -> bool {
        let req = self.request.lock();
        if req.code.is_empty() || req.code != code {
            return false;
        }
        let Some(requested_at) = req.requested_at else {
            return false;
        };
        let elapsed = requested_at.elapsed().as_secs();
        if elapsed < self.min_arm_secs {
            info!(
                remaining_s = self.min_arm_secs - elapsed,
                "arm time lock active"
            );
            return false;
        }
        self.armed.store(true, Ordering::Release);
        info!("arm confirmation accepted");
        true
    }

    /// Final gate: exchange state verified. Only valid once armed.
    pub fn verify_exchange(&self) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        self.verified.store(true, Ordering::Release);
        info!("exchange verification passed, live trading enabled");
        true
    }

    #[inline]
    pub fn live_enabled(&self) -> bool {
        self.armed.load(Ordering::Acquire) && self.verified.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ArmState {
        if self.verified.load(Ordering::Acquire) {
            return ArmState::Verified;
        }
        if self.armed.load(Ordering::Acquire) {
            return ArmState::Armed;
        }
        if self.request.lock().requested_at.is_some() {
            return ArmState::ArmRequested;
        }
        ArmState::Disarmed
    }

    pub fn status(&self) -> &'static str {
        match self.state() {
            ArmState::Disarmed => "DISARMED",
            ArmState::ArmRequested => "ARM_REQUESTED",
            ArmState::Armed => "ARMED_WAITING_VERIFY",
            ArmState::Verified => "LIVE_ENABLED",
        }
    }

    /// Lock arm requests until the cold-start reconcile passes. The live
    /// boot path calls this before pulling exchange truth.
    pub fn lock_pending_reconcile(&self) {
        self.cold_start_ok.store(false, Ordering::Release);
    }

    /// Cold-start reconcile result. A clean pass unlocks arming.
    pub fn set_cold_start_ok(&self, ok: bool) {
        self.cold_start_ok.store(ok, Ordering::Release);
    }

    /// Snapshot hook.
    pub fn armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Restore from a CRC-verified snapshot. `armed` carries over;
    /// `verified` is ALWAYS reset - the snapshot proves we were armed, but
    /// the exchange must be re-confirmed live before trading resumes.
    pub fn restore(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
        self.verified.store(false, Ordering::Release);
        if armed {
            info!("arm state restored from snapshot; exchange verification required");
        }
    }
}

impl Default for ArmSystem {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ARM_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_disarmed() {
        let arm = ArmSystem::new(0);
        assert_eq!(arm.state(), ArmState::Disarmed);
        assert!(!arm.live_enabled());
        assert_eq!(arm.status(), "DISARMED");
    }

    #[test]
    fn test_full_arm_sequence_zero_lock() {
        let arm = ArmSystem::new(0);
        assert!(arm.request_arm("GO-LIVE"));
        assert_eq!(arm.state(), ArmState::ArmRequested);

        assert!(arm.confirm_arm("GO-LIVE"));
        assert_eq!(arm.state(), ArmState::Armed);
        assert!(!arm.live_enabled());

        assert!(arm.verify_exchange());
        assert_eq!(arm.state(), ArmState::Verified);
        assert!(arm.live_enabled());
        assert_eq!(arm.status(), "LIVE_ENABLED");
    }

    #[test]
    fn test_time_lock_blocks_confirmation() {
        let arm = ArmSystem::new(3600);
        arm.request_arm("GO");
        assert!(!arm.confirm_arm("GO"));
        assert!(!arm.live_enabled());
    }

    #[test]
    fn test_wrong_code_rejected() {
        let arm = ArmSystem::new(0);
        arm.request_arm("GO");
        assert!(!arm.confirm_arm("STOP"));
        assert!(!arm.live_enabled());
    }

    #[test]
    fn test_verify_requires_armed() {
        let arm = ArmSystem::new(0);
        assert!(!arm.verify_exchange());
        assert!(!arm.live_enabled());
    }

    #[test]
    fn test_restore_resets_verified() {
        let arm = ArmSystem::new(0);
        arm.restore(true);
        assert!(arm.armed());
        assert!(!arm.live_enabled());
        assert_eq!(arm.state(), ArmState::Armed);

        // Verification must pass again after restore.
        assert!(arm.verify_exchange());
        assert!(arm.live_enabled());
    }

    #[test]
    fn test_cold_start_gate_blocks_arming() {
        let arm = ArmSystem::new(0);
        arm.lock_pending_reconcile();
        assert!(!arm.request_arm("GO"));

        arm.set_cold_start_ok(true);
        assert!(arm.request_arm("GO"));
    }

    #[test]
    fn test_rearm_resets_verified() {
        let arm = ArmSystem::new(0);
        arm.request_arm("A");
        arm.confirm_arm("A");
        arm.verify_exchange();
        assert!(arm.live_enabled());

        // A new request drops back out of live until re-confirmed.
        arm.request_arm("B");
        assert!(!arm.live_enabled());
    }
}
