//! Append-only binary event log with CRC-framed entries.
//!
//! Every causally significant event (market tick, submit, ack, fill, cancel,
//! reject) is recorded with a fixed header:
//!
//! ```text
//! timestamp_ns: u64 LE
//! causal_id:    u64 LE
//! event_type:   u32 LE (u8 value zero-padded)
//! payload_len:  u32 LE
//! payload_crc:  u32 LE (CRC32/IEEE over the payload bytes)
//! ```
//!
//! followed by a fixed-layout payload. The causal id is allocated from a
//! process-wide monotonic counter whose value is persisted via snapshot and
//! restored with a single store on boot, so replay ids never collide across
//! restarts.
//!
//! The writer opens in append mode (never truncates) and rotates to
//! `<base>.<epoch_ms>.<ext>` once the file exceeds the size cap. A single
//! writer thread (the router) is assumed; the mutex future-proofs
//! multi-writer use.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::core::errors::LogError;
use crate::core::types::now_ns;
use crate::forensics::crc32;

/// Wire size of the fixed entry header.
pub const HEADER_LEN: usize = 28;

/// Default rotation threshold: 1 GiB.
pub const DEFAULT_MAX_LOG_BYTES: u64 = 1 << 30;

const SYMBOL_FIELD: usize = 16;
const ID_FIELD: usize = 32;

/// Event type discriminants as written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    MarketTick = 1,
    Ack = 2,
    Fill = 3,
    Cancel = 4,
    Reject = 5,
    Submit = 6,
}

impl EventType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(EventType::MarketTick),
            2 => Some(EventType::Ack),
            3 => Some(EventType::Fill),
            4 => Some(EventType::Cancel),
            5 => Some(EventType::Reject),
            6 => Some(EventType::Submit),
            _ => None,
        }
    }
}

struct Writer {
    file: File,
    bytes_written: u64,
}

/// The append-only event log writer.
pub struct EventLog {
    path: PathBuf,
    writer: Mutex<Writer>,
    causal: AtomicU64,
    max_bytes: u64,
}

impl EventLog {
    /// Open (or create) the log at `path` in append mode.
    ///
    /// This is the only unrecoverable failure point: if the backing file
    /// cannot be opened the system has no forensic trail and must not trade.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        Self::open_with_cap(path, DEFAULT_MAX_LOG_BYTES)
    }

    /// Open with an explicit rotation cap. Tests use small caps.
    pub fn open_with_cap(path: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, LogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| LogError::Open {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open {
                path: path.display().to_string(),
                source,
            })?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path,
            writer: Mutex::new(Writer {
                file,
                bytes_written,
            }),
            causal: AtomicU64::new(1),
            max_bytes,
        })
    }

    /// Allocate the next causal id.
    pub fn next_causal_id(&self) -> u64 {
        self.causal.fetch_add(1, Ordering::Relaxed)
    }

    /// Current causal counter value (the next id to be allocated).
    pub fn causal_watermark(&self) -> u64 {
        self.causal.load(Ordering::Relaxed)
    }

    /// Restore the causal counter from a snapshot. A single store - looping
    /// `fetch_add` up to a large saved value costs real wall time at boot.
    pub fn set_causal(&self, val: u64) {
        self.causal.store(val, Ordering::Relaxed);
    }

    /// Append one entry. I/O errors are retried once, then propagated.
    pub fn write(&self, ty: EventType, payload: &[u8]) -> Result<(), LogError> {
        let causal_id = self.next_causal_id();
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&now_ns().to_le_bytes());
        buf.extend_from_slice(&causal_id.to_le_bytes());
        buf.extend_from_slice(&(ty as u8 as u32).to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32::compute(payload).to_le_bytes());
        buf.extend_from_slice(payload);

        let mut w = self.writer.lock();
        self.rotate_if_needed(&mut w)?;

        if let Err(first) = w.file.write_all(&buf).and_then(|_| w.file.flush()) {
            warn!(error = %first, "event log write failed, retrying once");
            w.file
                .write_all(&buf)
                .and_then(|_| w.file.flush())
                .map_err(LogError::Write)?;
        }
        w.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Rename the current file to a timestamped archive and reopen fresh.
    /// Caller holds the writer lock, so the swap is atomic for readers of
    /// this handle.
    fn rotate_if_needed(&self, w: &mut Writer) -> Result<(), LogError> {
        if w.bytes_written < self.max_bytes {
            return Ok(());
        }

        let epoch_ms = now_ns() / 1_000_000;
        let archived = archive_name(&self.path, epoch_ms);
        if let Err(e) = std::fs::rename(&self.path, &archived) {
            warn!(error = %e, "event log rotation rename failed");
        } else {
            info!(from = %self.path.display(), to = %archived.display(), "event log rotated");
        }

        w.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LogError::Open {
                path: self.path.display().to_string(),
                source,
            })?;
        w.bytes_written = 0;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Typed helpers - each builds its fixed-layout payload inline.
    // -----------------------------------------------------------------------

    pub fn write_market(
        &self,
        symbol: &str,
        bid: f64,
        bid_qty: f64,
        ask: f64,
        ask_qty: f64,
    ) -> Result<(), LogError> {
        let mut payload = [0u8; SYMBOL_FIELD + 32];
        write_fixed_str(&mut payload[..SYMBOL_FIELD], symbol);
        payload[16..24].copy_from_slice(&bid.to_le_bytes());
        payload[24..32].copy_from_slice(&bid_qty.to_le_bytes());
        payload[32..40].copy_from_slice(&ask.to_le_bytes());
        payload[40..48].copy_from_slice(&ask_qty.to_le_bytes());
        self.write(EventType::MarketTick, &payload)
    }

    pub fn write_ack(&self, client_id: &str, exchange_id: &str) -> Result<(), LogError> {
        let mut payload = [0u8; ID_FIELD * 2];
        write_fixed_str(&mut payload[..ID_FIELD], client_id);
        write_fixed_str(&mut payload[ID_FIELD..], exchange_id);
        self.write(EventType::Ack, &payload)
    }

    pub fn write_fill(&self, client_id: &str, qty: f64, price: f64) -> Result<(), LogError> {
        let mut payload = [0u8; ID_FIELD + 16];
        write_fixed_str(&mut payload[..ID_FIELD], client_id);
        payload[32..40].copy_from_slice(&qty.to_le_bytes());
        payload[40..48].copy_from_slice(&price.to_le_bytes());
        self.write(EventType::Fill, &payload)
    }

    pub fn write_submit(&self, client_id: &str, qty: f64, price: f64) -> Result<(), LogError> {
        let mut payload = [0u8; ID_FIELD + 16];
        write_fixed_str(&mut payload[..ID_FIELD], client_id);
        payload[32..40].copy_from_slice(&qty.to_le_bytes());
        payload[40..48].copy_from_slice(&price.to_le_bytes());
        self.write(EventType::Submit, &payload)
    }

    pub fn write_cancel(&self, client_id: &str) -> Result<(), LogError> {
        let mut payload = [0u8; ID_FIELD];
        write_fixed_str(&mut payload, client_id);
        self.write(EventType::Cancel, &payload)
    }

    pub fn write_reject(&self, client_id: &str) -> Result<(), LogError> {
        let mut payload = [0u8; ID_FIELD];
        write_fixed_str(&mut payload, client_id);
        self.write(EventType::Reject, &payload)
    }
}

fn archive_name(path: &Path, epoch_ms: u64) -> PathBuf {
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => path.with_file_name(format!(
            "{}.{}.{}",
            stem.to_string_lossy(),
            epoch_ms,
            ext.to_string_lossy()
        )),
        _ => {
            let mut p = path.as_os_str().to_owned();
            p.push(format!(".{}", epoch_ms));
            PathBuf::from(p)
        }
    }
}

fn write_fixed_str(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    // Last byte stays zero so a C-string reader always terminates.
    let n = bytes.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&bytes[..n]);
}

fn read_fixed_str(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// Reader / validator
// ---------------------------------------------------------------------------

/// One decoded log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub ts_ns: u64,
    pub causal_id: u64,
    pub event_type: EventType,
    pub payload: Vec<u8>,
}

impl LogEntry {
    /// Decode a MARKET_TICK payload: `(symbol, bid, bid_qty, ask, ask_qty)`.
    pub fn decode_market(&self) -> Option<(String, f64, f64, f64, f64)> {
        if self.event_type != EventType::MarketTick || self.payload.len() < 48 {
            return None;
        }
        let sym = read_fixed_str(&self.payload[..SYMBOL_FIELD]);
        Some((
            sym,
            f64_at(&self.payload, 16),
            f64_at(&self.payload, 24),
            f64_at(&self.payload, 32),
            f64_at(&self.payload, 40),
        ))
    }

    /// Client id for the order-lifecycle payload layouts.
    pub fn client_id(&self) -> Option<String> {
        if self.event_type == EventType::MarketTick || self.payload.len() < ID_FIELD {
            return None;
        }
        Some(read_fixed_str(&self.payload[..ID_FIELD]))
    }
}

fn f64_at(buf: &[u8], at: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    f64::from_le_bytes(b)
}

/// Sequential reader that verifies every entry's CRC as it goes.
pub struct EventLogReader {
    reader: BufReader<File>,
    offset: u64,
}

impl EventLogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LogError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
        })
    }

    /// Read the next entry, or `None` at a clean end of file.
    pub fn read_next(&mut self) -> Result<Option<LogEntry>, LogError> {
        let mut header = [0u8; HEADER_LEN];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(LogError::Read(e)),
        }

        let ts_ns = u64::from_le_bytes(header[0..8].try_into().unwrap());
        let causal_id = u64::from_le_bytes(header[8..16].try_into().unwrap());
        let raw_type = u32::from_le_bytes(header[16..20].try_into().unwrap());
        let payload_len = u32::from_le_bytes(header[20..24].try_into().unwrap());
        let stored_crc = u32::from_le_bytes(header[24..28].try_into().unwrap());

        let event_type = EventType::from_u8(raw_type as u8).ok_or(LogError::Corrupt {
            offset: self.offset,
            reason: format!("unknown event type {}", raw_type),
        })?;

        // Sanity bound before allocating: no typed payload exceeds 64 bytes.
        if payload_len > 4096 {
            return Err(LogError::Corrupt {
                offset: self.offset,
                reason: format!("implausible payload length {}", payload_len),
            });
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader
            .read_exact(&mut payload)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => LogError::Corrupt {
                    offset: self.offset,
                    reason: "truncated payload".to_string(),
                },
                _ => LogError::Read(e),
            })?;

        let computed = crc32::compute(&payload);
        if computed != stored_crc {
            return Err(LogError::Corrupt {
                offset: self.offset,
                reason: format!(
                    "payload crc mismatch: stored {:#010x}, computed {:#010x}",
                    stored_crc, computed
                ),
            });
        }

        self.offset += (HEADER_LEN + payload_len as usize) as u64;
        Ok(Some(LogEntry {
            ts_ns,
            causal_id,
            event_type,
            payload,
        }))
    }

    /// Walk the whole file, returning the entry count or the first corruption.
    pub fn validate(path: impl AsRef<Path>) -> Result<u64, LogError> {
        let mut reader = Self::open(path)?;
        let mut count = 0u64;
        while reader.read_next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let log = EventLog::open(&path).unwrap();
        log.write_market("BTCUSDT", 100.0, 1.0, 100.01, 2.0).unwrap();
        log.write_ack("E1_0", "X123").unwrap();
        log.write_fill("E1_0", 0.01, 100.0).unwrap();
        log.write_cancel("E1_1").unwrap();
        log.write_reject("E1_2").unwrap();
        drop(log);

        let mut reader = EventLogReader::open(&path).unwrap();
        let tick = reader.read_next().unwrap().unwrap();
        assert_eq!(tick.event_type, EventType::MarketTick);
        let (sym, bid, bid_qty, ask, ask_qty) = tick.decode_market().unwrap();
        assert_eq!(sym, "BTCUSDT");
        assert_eq!(bid, 100.0);
        assert_eq!(bid_qty, 1.0);
        assert_eq!(ask, 100.01);
        assert_eq!(ask_qty, 2.0);

        let ack = reader.read_next().unwrap().unwrap();
        assert_eq!(ack.event_type, EventType::Ack);
        assert_eq!(ack.client_id().unwrap(), "E1_0");

        let fill = reader.read_next().unwrap().unwrap();
        assert_eq!(fill.event_type, EventType::Fill);

        let cancel = reader.read_next().unwrap().unwrap();
        assert_eq!(cancel.event_type, EventType::Cancel);
        assert_eq!(cancel.client_id().unwrap(), "E1_1");

        let reject = reader.read_next().unwrap().unwrap();
        assert_eq!(reject.event_type, EventType::Reject);

        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_causal_ids_monotonic() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path().join("events.bin")).unwrap();
        for _ in 0..5 {
            log.write_cancel("E1_0").unwrap();
        }
        drop(log);

        let mut reader = EventLogReader::open(dir.path().join("events.bin")).unwrap();
        let mut last = 0;
        while let Some(entry) = reader.read_next().unwrap() {
            assert!(entry.causal_id > last);
            last = entry.causal_id;
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_set_causal_restores_watermark() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path().join("events.bin")).unwrap();
        log.set_causal(1_000_000);
        log.write_cancel("E1_0").unwrap();
        drop(log);

        let mut reader = EventLogReader::open(dir.path().join("events.bin")).unwrap();
        let entry = reader.read_next().unwrap().unwrap();
        assert_eq!(entry.causal_id, 1_000_000);
    }

    #[test]
    fn test_append_mode_preserves_prior_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        {
            let log = EventLog::open(&path).unwrap();
            log.write_cancel("E1_0").unwrap();
        }
        {
            // Simulated restart with causal continuity.
            let log = EventLog::open(&path).unwrap();
            log.set_causal(2);
            log.write_cancel("E1_1").unwrap();
        }

        assert_eq!(EventLogReader::validate(&path).unwrap(), 2);
    }

    #[test]
    fn test_rotation_archives_and_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        // Cap small enough that the second write rotates.
        let log = EventLog::open_with_cap(&path, 64).unwrap();
        log.write_ack("E1_0", "X1").unwrap(); // 28 + 64 = 92 bytes > cap
        log.write_ack("E1_1", "X2").unwrap(); // triggers rotation first
        drop(log);

        let archives: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != "events.bin")
            .collect();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].starts_with("events."));
        assert!(archives[0].ends_with(".bin"));

        // Both the archive and the fresh file validate cleanly.
        assert_eq!(EventLogReader::validate(&path).unwrap(), 1);
        assert_eq!(
            EventLogReader::validate(dir.path().join(&archives[0])).unwrap(),
            1
        );
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let log = EventLog::open(&path).unwrap();
        log.write_fill("E1_0", 0.01, 100.0).unwrap();
        drop(log);

        // Flip a payload byte.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let mut reader = EventLogReader::open(&path).unwrap();
        match reader.read_next() {
            Err(LogError::Corrupt { reason, .. }) => assert!(reason.contains("crc")),
            other => panic!("expected corruption, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_failure_is_unrecoverable() {
        let err = EventLog::open("/dev/null/not-a-dir/events.bin");
        assert!(matches!(err, Err(LogError::Open { .. })));
    }
}
