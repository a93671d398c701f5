//! Replay feed: stream MARKET_TICK entries from a recorded event log back
//! into the queue model.
//!
//! This is how the shadow path gets exercised without a venue connection:
//! a recording from a prior session drives the book, the volatility
//! tracker, and through them the engines and the fill simulator.

use std::path::Path;

use tracing::{info, warn};

use crate::core::errors::LogError;
use crate::forensics::event_log::{EventLogReader, EventType};
use crate::runtime::context::Context;

pub struct ReplayFeed;

impl ReplayFeed {
    /// Feed every market tick in the recording into the context's queue
    /// model and volatility tracker, in file order. Non-market entries are
    /// skipped. Returns the number of ticks replayed.
    ///
    /// Stops early (with a warning, not an error) at the first corrupt
    /// entry: everything before the corruption is still a valid tape.
    pub fn replay_into(ctx: &Context, path: impl AsRef<Path>) -> Result<u64, LogError> {
        let mut reader = EventLogReader::open(path.as_ref())?;
        let mut ticks = 0u64;

        loop {
            let entry = match reader.read_next() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(LogError::Corrupt { offset, reason }) => {
                    warn!(offset, %reason, "replay stopped at corrupt entry");
                    break;
                }
                Err(e) => return Err(e),
            };
            if entry.event_type != EventType::MarketTick {
                continue;
            }
            let Some((symbol, bid, bid_qty, ask, ask_qty)) = entry.decode_market() else {
                continue;
            };
            if !ctx.is_running() {
                break;
            }
            ctx.queue
                .on_book_update(&symbol, bid, bid_qty, ask, ask_qty, entry.ts_ns);
            let mid = (bid + ask) * 0.5;
            if mid > 0.0 {
                ctx.ledger.on_price(&symbol, mid, entry.ts_ns);
            }
            ticks += 1;
        }

        info!(ticks, "replay complete");
        Ok(ticks)
    }
}
