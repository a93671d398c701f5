//! Core-pinned worker threads.
//!
//! Thread roles map to physical cores: feed threads share core 0, the
//! execution router and every strategy engine share core 1, auxiliary
//! threads float. Pinning prevents the OS from migrating a hot loop between
//! cores, which costs cache evictions and latency jitter.

use std::thread::JoinHandle;

use anyhow::Result;
use core_affinity::CoreId;
use tracing::{info, warn};

/// Conventional core for feed threads.
pub const FEED_CORE: usize = 0;
/// Conventional core for the execution router and strategy engines.
pub const EXECUTION_CORE: usize = 1;

/// Pin the current thread to a CPU core.
pub fn pin_to_core(core: usize) -> Result<()> {
    if core_affinity::set_for_current(CoreId { id: core }) {
        info!(core, "pinned thread to core");
        Ok(())
    } else {
        anyhow::bail!("failed to pin thread to core {}", core)
    }
}

/// Set SCHED_FIFO real-time priority (Linux only; requires CAP_SYS_NICE).
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> Result<()> {
    use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

    // SAFETY: sched_setscheduler only reads the param struct.
    unsafe {
        let param = sched_param {
            sched_priority: priority,
        };
        if sched_setscheduler(0, SCHED_FIFO, &param) == 0 {
            info!(priority, "set SCHED_FIFO priority");
            Ok(())
        } else {
            anyhow::bail!("failed to set realtime priority (needs CAP_SYS_NICE or root)")
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> Result<()> {
    warn!("realtime priority not supported on this platform");
    Ok(())
}

pub fn num_cores() -> usize {
    core_affinity::get_core_ids()
        .map(|ids| ids.len())
        .unwrap_or(1)
}

/// A named worker thread, optionally pinned to a core before its body runs.
pub struct ThreadModel {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl ThreadModel {
    /// Spawn the worker. Pin failures degrade to an unpinned thread with a
    /// warning - on shared hosts affinity is often unavailable and the loop
    /// must still run.
    pub fn spawn<F>(name: &str, core: Option<usize>, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if let Some(core) = core {
                    if let Err(e) = pin_to_core(core) {
                        warn!(core, error = %e, "core pinning unavailable, running unpinned");
                    }
                }
                body();
            })?;

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_num_cores_positive() {
        assert!(num_cores() > 0);
    }

    #[test]
    fn test_thread_model_runs_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let worker = ThreadModel::spawn("test-worker", None, move || {
            flag.store(true, Ordering::Release);
        })
        .unwrap();
        worker.join();
        assert!(ran.load(Ordering::Acquire));
    }

    #[test]
    fn test_thread_model_with_pin_request() {
        // Pinning may fail in constrained environments; the body must run
        // regardless.
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let worker = ThreadModel::spawn("pinned-worker", Some(0), move || {
            flag.store(true, Ordering::Release);
        })
        .unwrap();
        worker.join();
        assert!(ran.load(Ordering::Acquire));
    }
}
