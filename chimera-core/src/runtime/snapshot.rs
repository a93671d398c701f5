//! Context snapshotter: restart continuity for the state that cannot be
//! rebuilt from the market.
//!
//! Binary file, CRC-framed: a fixed header (`CHMR` magic, version,
//! timestamp, body size, body CRC) followed by concatenated typed sections:
//! positions, open orders, queue books, the causal counter, and the arm
//! state. On load the CRC is verified; a mismatch refuses the snapshot and
//! boot proceeds cold rather than trusting half a state.
//!
//! Saving happens in the main thread after every worker has joined - never
//! from signal context.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::core::errors::SnapshotError;
use crate::core::types::{now_ns, OrderRecord, OrderStatus, Side};
use crate::execution::queue_model::QueueState;
use crate::forensics::crc32;
use crate::runtime::context::Context;

pub const SNAPSHOT_MAGIC: u32 = 0x4348_4D52; // "CHMR"
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 24;

// ---------------------------------------------------------------------------
// Body codec
// ---------------------------------------------------------------------------

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.pos + n > self.buf.len() {
            return Err(SnapshotError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, SnapshotError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, SnapshotError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SnapshotError::Truncated)
    }
}

fn put_order(buf: &mut Vec<u8>, rec: &OrderRecord) {
    put_str(buf, &rec.client_id);
    match &rec.exchange_id {
        Some(id) => {
            put_u8(buf, 1);
            put_str(buf, id);
        }
        None => put_u8(buf, 0),
    }
    put_str(buf, &rec.symbol);
    put_u8(buf, rec.side as u8);
    put_f64(buf, rec.price);
    put_f64(buf, rec.original_qty);
    put_f64(buf, rec.remaining_qty);
    put_str(buf, &rec.engine_id);
    put_u8(buf, rec.status as u8);
    put_u64(buf, rec.created_ns);
    put_u64(buf, rec.last_update_ns);
}

fn read_order(r: &mut BodyReader<'_>) -> Result<OrderRecord, SnapshotError> {
    let client_id = r.string()?;
    let exchange_id = if r.u8()? == 1 {
        Some(r.string()?)
    } else {
        None
    };
    let symbol = r.string()?;
    let side = if r.u8()? == 1 { Side::Sell } else { Side::Buy };
    let price = r.f64()?;
    let original_qty = r.f64()?;
    let remaining_qty = r.f64()?;
    let engine_id = r.string()?;
    let status = match r.u8()? {
        0 => OrderStatus::New,
        1 => OrderStatus::Acked,
        2 => OrderStatus::PartiallyFilled,
        3 => OrderStatus::Filled,
        4 => OrderStatus::Canceled,
        _ => OrderStatus::Rejected,
    };
    let created_ns = r.u64()?;
    let last_update_ns = r.u64()?;
    Ok(OrderRecord {
        client_id,
        exchange_id,
        symbol,
        side,
        price,
        original_qty,
        remaining_qty,
        engine_id,
        status,
        created_ns,
        last_update_ns,
    })
}

// ---------------------------------------------------------------------------
// Snapshotter
// ---------------------------------------------------------------------------

pub struct ContextSnapshotter;

impl ContextSnapshotter {
    /// Serialize the restart-relevant state to `path`.
    pub fn save(ctx: &Context, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let mut body = Vec::with_capacity(4096);

        // Section: positions
        let positions = ctx.risk.dump_positions();
        put_u32(&mut body, positions.len() as u32);
        for (symbol, qty) in &positions {
            put_str(&mut body, symbol);
            put_f64(&mut body, *qty);
        }

        // Section: orders (full OSM dump)
        let orders = ctx.osm.dump_orders();
        put_u32(&mut body, orders.len() as u32);
        for rec in &orders {
            put_order(&mut body, rec);
        }

        // Section: queue books
        let books = ctx.queue.dump();
        put_u32(&mut body, books.len() as u32);
        for (symbol, state) in &books {
            put_str(&mut body, symbol);
            put_f64(&mut body, state.bid_price);
            put_f64(&mut body, state.bid_depth);
            put_f64(&mut body, state.ask_price);
            put_f64(&mut body, state.ask_depth);
            put_u64(&mut body, state.last_update_ns);
        }

        // Section: causal counter
        put_u64(&mut body, ctx.recorder.causal_watermark());

        // Section: arm state
        put_u8(&mut body, ctx.arm.armed() as u8);

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&now_ns().to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&crc32::compute(&body).to_le_bytes());
        out.extend_from_slice(&body);

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path.as_ref(), &out)?;
        info!(
            path = %path.as_ref().display(),
            positions = positions.len(),
            orders = orders.len(),
            books = books.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Restore state from `path` into `ctx`. Returns whether a snapshot was
    /// applied. Missing file or a refused (corrupt/mismatched) snapshot is a
    /// cold boot, not an error; genuine I/O failures propagate.
    pub fn load(ctx: &Context, path: impl AsRef<Path>) -> Result<bool, SnapshotError> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot, cold boot");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        match Self::apply(ctx, &bytes) {
            Ok(()) => {
                info!(path = %path.display(), "snapshot restored");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot refused, cold boot");
                Ok(false)
            }
        }
    }

    fn apply(ctx: &Context, bytes: &[u8]) -> Result<(), SnapshotError> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated);
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic(magic));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::BadVersion(version));
        }
        let body_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
        let stored_crc = u32::from_le_bytes(bytes[20..24].try_into().unwrap());

        if bytes.len() < HEADER_LEN + body_size {
            return Err(SnapshotError::Truncated);
        }
        let body = &bytes[HEADER_LEN..HEADER_LEN + body_size];
        let computed = crc32::compute(body);
        if computed != stored_crc {
            return Err(SnapshotError::CrcMismatch {
                stored: stored_crc,
                computed,
            });
        }

        let mut r = BodyReader::new(body);

        let n_positions = r.u32()?;
        let mut positions = HashMap::new();
        for _ in 0..n_positions {
            let symbol = r.string()?;
            let qty = r.f64()?;
            positions.insert(symbol, qty);
        }

        let n_orders = r.u32()?;
        let mut orders = Vec::with_capacity(n_orders as usize);
        for _ in 0..n_orders {
            orders.push(read_order(&mut r)?);
        }

        let n_books = r.u32()?;
        let mut books = Vec::with_capacity(n_books as usize);
        for _ in 0..n_books {
            let symbol = r.string()?;
            let state = QueueState {
                bid_price: r.f64()?,
                bid_depth: r.f64()?,
                ask_price: r.f64()?,
                ask_depth: r.f64()?,
                last_update_ns: r.u64()?,
            };
            books.push((symbol, state));
        }

        let causal = r.u64()?;
        let armed = r.u8()? == 1;

        // Everything decoded cleanly - only now touch live state.
        for (symbol, qty) in positions {
            ctx.risk.restore_position(&symbol, qty);
        }
        for rec in orders {
            ctx.osm.restore_order(rec);
        }
        for (symbol, state) in books {
            ctx.queue.restore(&symbol, state);
        }
        ctx.recorder.set_causal(causal);
        ctx.arm.restore(armed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::{Context, ContextConfig};
    use tempfile::tempdir;

    fn test_context(dir: &std::path::Path) -> Context {
        Context::new(ContextConfig {
            event_log_path: dir.join("events.bin"),
            ..Default::default()
        })
        .unwrap()
    }

    fn populate(ctx: &Context) {
        ctx.risk.on_execution_ack("BTCUSDT", 0.01, 100.0);
        ctx.risk.on_execution_ack("ETHUSDT", -0.2, 2_000.0);

        let rec = OrderRecord::new(
            "E1_0".to_string(),
            "BTCUSDT".to_string(),
            Side::Buy,
            100.0,
            0.02,
            "E1".to_string(),
        );
        ctx.osm.on_new(rec).unwrap();
        ctx.osm.on_ack("E1_0", "X1");
        ctx.osm.on_fill("X1", 0.01);

        ctx.queue.on_book_update("BTCUSDT", 100.0, 1.0, 100.01, 2.0, 7);
        ctx.recorder.set_causal(424_242);
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        populate(&ctx);

        let snap_path = dir.path().join("snapshot.bin");
        ContextSnapshotter::save(&ctx, &snap_path).unwrap();

        let dir2 = tempdir().unwrap();
        let restored = test_context(dir2.path());
        assert!(ContextSnapshotter::load(&restored, &snap_path).unwrap());

        assert_eq!(restored.risk.dump_positions(), ctx.risk.dump_positions());
        assert_eq!(restored.queue.dump(), ctx.queue.dump());
        assert_eq!(restored.recorder.causal_watermark(), 424_242);

        let rec = restored.osm.get("E1_0").unwrap();
        assert_eq!(rec.status, OrderStatus::PartiallyFilled);
        assert_eq!(rec.exchange_id.as_deref(), Some("X1"));
        assert!((rec.remaining_qty - 0.01).abs() < 1e-12);

        // The restored secondary index still resolves fills.
        restored.osm.on_fill("X1", 0.01);
        assert_eq!(restored.osm.get("E1_0").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_armed_restored_verified_reset() {
        let dir = tempdir().unwrap();
        let ctx = Context::new(ContextConfig {
            event_log_path: dir.path().join("events.bin"),
            min_arm_secs: 0,
            ..Default::default()
        })
        .unwrap();
        ctx.arm.request_arm("GO");
        ctx.arm.confirm_arm("GO");
        ctx.arm.verify_exchange();
        assert!(ctx.arm.live_enabled());

        let snap_path = dir.path().join("snapshot.bin");
        ContextSnapshotter::save(&ctx, &snap_path).unwrap();

        let dir2 = tempdir().unwrap();
        let restored = test_context(dir2.path());
        ContextSnapshotter::load(&restored, &snap_path).unwrap();

        assert!(restored.arm.armed());
        // Verified is never restored: the exchange must be re-checked.
        assert!(!restored.arm.live_enabled());
    }

    #[test]
    fn test_missing_snapshot_is_cold_boot() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let applied =
            ContextSnapshotter::load(&ctx, dir.path().join("missing.bin")).unwrap();
        assert!(!applied);
    }

    #[test]
    fn test_corrupt_snapshot_refused() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        populate(&ctx);

        let snap_path = dir.path().join("snapshot.bin");
        ContextSnapshotter::save(&ctx, &snap_path).unwrap();

        let mut bytes = std::fs::read(&snap_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&snap_path, &bytes).unwrap();

        let dir2 = tempdir().unwrap();
        let restored = test_context(dir2.path());
        let applied = ContextSnapshotter::load(&restored, &snap_path).unwrap();
        assert!(!applied);
        // Nothing leaked into the fresh context.
        assert!(restored.risk.dump_positions().is_empty());
        assert!(restored.osm.is_empty());
    }

    #[test]
    fn test_bad_magic_refused() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());

        let snap_path = dir.path().join("snapshot.bin");
        std::fs::write(&snap_path, b"NOTACHIMERASNAPSHOTFILE!").unwrap();
        assert!(!ContextSnapshotter::load(&ctx, &snap_path).unwrap());
    }
}
