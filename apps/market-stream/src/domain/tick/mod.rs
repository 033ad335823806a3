//! Tick Records
//!
//! The immutable value recorded for each inbound market update. The capture
//! timestamp is generated locally at receipt time — the feed does not
//! guarantee timestamp presence — and fields absent from a message stay
//! empty rather than defaulting to zero, so downstream statistics are never
//! polluted with false values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::subscription::Symbol;

/// Column order of the tick sink.
pub const SINK_HEADER: [&str; 6] = ["Timestamp", "Symbol", "LastPrice", "Bid", "Ask", "Volume"];

/// One recorded market update for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRecord {
    /// Local capture time (UTC), truncated to milliseconds on output.
    pub captured_at: DateTime<Utc>,
    /// The feed's symbol identifier.
    pub symbol: Symbol,
    /// Last traded price, if present in the message.
    pub last_price: Option<Decimal>,
    /// Best bid, if present.
    pub bid: Option<Decimal>,
    /// Best ask, if present.
    pub ask: Option<Decimal>,
    /// Traded volume, if present.
    pub volume: Option<i64>,
}

impl TickRecord {
    /// Capture timestamp formatted as `YYYY-MM-DD HH:MM:SS.mmm` (UTC).
    #[must_use]
    pub fn timestamp_cell(&self) -> String {
        self.captured_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    /// The sink row for this record: raw numeric strings, empty cells for
    /// absent fields.
    #[must_use]
    pub fn to_row(&self) -> [String; 6] {
        [
            self.timestamp_cell(),
            self.symbol.clone(),
            self.last_price.map(|d| d.to_string()).unwrap_or_default(),
            self.bid.map(|d| d.to_string()).unwrap_or_default(),
            self.ask.map(|d| d.to_string()).unwrap_or_default(),
            self.volume.map(|v| v.to_string()).unwrap_or_default(),
        ]
    }
}
