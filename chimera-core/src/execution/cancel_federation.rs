//! Cancel Federation: the centralized kill-sweep signal.
//!
//! Any governor on any thread calls [`CancelFederation::trigger`] - an
//! atomic CAS plus a pointer-sized store, no blocking, no REST, no
//! allocation. The actual sweep (cancel every open order, clear the
//! coalescer, latch the drift kill) runs on the execution thread inside the
//! router poll, where the thread-affine adapter resources live. Maximum
//! trigger → sweep latency is one poll tick.
//!
//! The reason must be a `&'static str`: the signalling path never copies it
//! into a heap buffer. Multiple concurrent triggers produce the single first
//! winner's reason.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

#[derive(Default)]
pub struct CancelFederation {
    active: AtomicBool,
    // A &'static str is (ptr, len); that doesn't fit one atomic, so the two
    // halves are stored separately. Only the CAS winner ever writes them.
    reason: AtomicPtr<u8>,
    reason_len: AtomicUsize,
}

impl CancelFederation {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            reason: AtomicPtr::new(std::ptr::null_mut()),
            reason_len: AtomicUsize::new(0),
        }
    }

    /// Signal the sweep. Only the first caller wins the CAS and stores its
    /// reason; later callers are no-ops.
    pub fn trigger(&self, reason: &'static str) {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.reason_len.store(reason.len(), Ordering::Relaxed);
            self.reason
                .store(reason.as_ptr() as *mut u8, Ordering::Release);
        }
    }

    pub fn active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The winning trigger's reason, if the flag is (or was) set.
    pub fn reason(&self) -> Option<&'static str> {
        let ptr = self.reason.load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        let len = self.reason_len.load(Ordering::Relaxed);
        // Reconstructs the &'static str stored in trigger(): the pointer and
        // length came from a 'static str and are published with release
        // ordering, so the bytes are valid for the program lifetime.
        unsafe {
            let slice = std::slice::from_raw_parts(ptr, len);
            Some(std::str::from_utf8_unchecked(slice))
        }
    }

    /// Clear after the sweep has run. The drift latch - not this flag - is
    /// what keeps the system locked.
    pub fn clear(&self) {
        self.reason.store(std::ptr::null_mut(), Ordering::Relaxed);
        self.reason_len.store(0, Ordering::Relaxed);
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_trigger_sets_flag_and_reason() {
        let fed = CancelFederation::new();
        assert!(!fed.active());
        assert!(fed.reason().is_none());

        fed.trigger("QUEUE_HARD_TTL");
        assert!(fed.active());
        assert_eq!(fed.reason(), Some("QUEUE_HARD_TTL"));
    }

    #[test]
    fn test_first_trigger_wins() {
        let fed = CancelFederation::new();
        fed.trigger("FIRST");
        fed.trigger("SECOND");
        assert_eq!(fed.reason(), Some("FIRST"));
    }

    #[test]
    fn test_clear_then_retrigger() {
        let fed = CancelFederation::new();
        fed.trigger("A");
        fed.clear();
        assert!(!fed.active());
        assert!(fed.reason().is_none());

        fed.trigger("B");
        assert_eq!(fed.reason(), Some("B"));
    }

    #[test]
    fn test_concurrent_triggers_single_winner() {
        let fed = Arc::new(CancelFederation::new());
        let handles: Vec<_> = ["R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7"]
            .iter()
            .map(|&r| {
                let fed = Arc::clone(&fed);
                std::thread::spawn(move || fed.trigger(r))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(fed.active());
        let reason = fed.reason().unwrap();
        assert!(reason.starts_with('R'));
    }
}
