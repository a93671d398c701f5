//! Domain-specific error types for the execution spine.
//!
//! One enum per concern area. Transient admission failures (throttle, risk,
//! admission threshold) are not errors - they are counted drops. These types
//! cover the operations that can genuinely fail.

use thiserror::Error;

/// Errors from order state machine lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("duplicate client id: {0}")]
    DuplicateClientId(String),
}

/// Errors from the forensic event log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Backing file could not be opened. Unrecoverable: no forensic trail,
    /// no trading.
    #[error("event log open failed for {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// Write failed after one retry.
    #[error("event log write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("event log read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Entry failed CRC or header sanity during replay/validation.
    #[error("corrupt entry at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

/// Errors from snapshot save/load.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic: expected CHMR, got {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported version {0}")]
    BadVersion(u32),

    #[error("body crc mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("truncated snapshot body")]
    Truncated,
}

/// Errors from exchange adapter truth queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("venue request failed: {0}")]
    Request(String),

    #[error("venue response unparseable: {0}")]
    Parse(String),
}
