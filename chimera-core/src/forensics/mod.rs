//! Forensics: the append-only binary event log, CRC framing, and replay.

pub mod crc32;
pub mod event_log;
pub mod replay;

pub use event_log::{EventLog, EventLogReader, EventType, LogEntry};
pub use replay::ReplayFeed;
