//! Signal-safe shutdown flag.
//!
//! The signal handler does exactly one thing: set an atomic flag. All
//! cleanup (stopping the loops, joining workers, saving the snapshot)
//! happens in the main thread after it observes the flag. File I/O, mutexes,
//! and allocation are all off-limits in signal context, and this split is
//! the only safe pattern for a process of this size.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use signal_hook::consts::{SIGINT, SIGTERM};

/// Register SIGINT and SIGTERM to set the returned flag.
pub fn install_signal_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&flag))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&flag))?;
    Ok(flag)
}

/// Convenience read with acquire ordering.
#[inline]
pub fn is_set(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Acquire)
}
