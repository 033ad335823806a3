//! Market Hub Wire Types
//!
//! Wire format types for the gateway's real-time hub protocol. Frames are
//! JSON objects delimited by the ASCII record separator (`0x1e`):
//!
//! - Handshake: `{"protocol":"json","version":1}` answered by `{}` (or an
//!   object carrying an `error` field).
//! - Invocation (`type` 1): `{"type":1,"target":"...","arguments":[...]}`.
//!   Outbound target `SubscribeSymbols`, inbound target `MarketData`.
//! - Ping (`type` 6): `{"type":6}`, sent in both directions as keep-alive.
//! - Close (`type` 7): `{"type":7}` with an optional `error`.
//!
//! Subscribe sends are fire-and-forget: the hub does not acknowledge them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::{InstrumentSubscription, MarketField, Symbol};
use crate::domain::tick::TickRecord;

/// ASCII record separator delimiting hub frames.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Frame type discriminator for invocations.
pub const FRAME_INVOCATION: u8 = 1;
/// Frame type discriminator for keep-alive pings.
pub const FRAME_PING: u8 = 6;
/// Frame type discriminator for server close.
pub const FRAME_CLOSE: u8 = 7;

/// Inbound invocation target carrying market updates.
pub const TARGET_MARKET_DATA: &str = "MarketData";
/// Outbound invocation target declaring symbol interest.
pub const TARGET_SUBSCRIBE_SYMBOLS: &str = "SubscribeSymbols";

// =============================================================================
// Handshake
// =============================================================================

/// Protocol handshake sent immediately after the transport opens.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeRequest {
    /// Wire protocol name (always "json").
    pub protocol: &'static str,
    /// Protocol version (always 1).
    pub version: u32,
}

impl HandshakeRequest {
    /// The JSON protocol handshake.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            protocol: "json",
            version: 1,
        }
    }
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Handshake response. An empty object means success.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeResponse {
    /// Populated when the server rejects the handshake.
    #[serde(default)]
    pub error: Option<String>,
}

impl HandshakeResponse {
    /// Check whether the handshake was accepted.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// =============================================================================
// Frames
// =============================================================================

/// An invocation frame (type 1), inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationFrame {
    /// Frame type, always [`FRAME_INVOCATION`].
    #[serde(rename = "type")]
    pub frame_type: u8,
    /// Invocation target name.
    pub target: String,
    /// Invocation arguments.
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

impl InvocationFrame {
    /// Build an outbound `SubscribeSymbols` invocation for one descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized (does not happen
    /// with valid descriptors).
    pub fn subscribe_symbols(
        subscription: &InstrumentSubscription,
    ) -> Result<Self, serde_json::Error> {
        let payload = SubscribeSymbolsRequest {
            symbols: vec![subscription.symbol().to_owned()],
            fields: subscription.fields().to_vec(),
        };
        Ok(Self {
            frame_type: FRAME_INVOCATION,
            target: TARGET_SUBSCRIBE_SYMBOLS.to_owned(),
            arguments: vec![serde_json::to_value(payload)?],
        })
    }
}

/// A close frame (type 7) sent by either side to end the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseFrame {
    /// Frame type, always [`FRAME_CLOSE`].
    #[serde(rename = "type")]
    pub frame_type: u8,
    /// Reason the server is closing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CloseFrame {
    /// A client-initiated close with no error.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frame_type: FRAME_CLOSE,
            error: None,
        }
    }
}

impl Default for CloseFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Any decoded hub frame.
#[derive(Debug, Clone)]
pub enum HubFrame {
    /// An invocation (type 1).
    Invocation(InvocationFrame),
    /// A keep-alive ping (type 6).
    Ping,
    /// A close notification (type 7).
    Close(CloseFrame),
    /// A frame type this client does not handle.
    Other(u64),
}

// =============================================================================
// Payloads
// =============================================================================

/// Payload of an outbound `SubscribeSymbols` invocation.
///
/// # Wire Format (JSON)
/// ```json
/// {"symbols":["F.US.ES"],"fields":["LastPrice","Bid","Ask","Volume"]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeSymbolsRequest {
    /// Symbols to subscribe, usually one per invocation.
    pub symbols: Vec<Symbol>,
    /// Fields requested for those symbols.
    pub fields: Vec<MarketField>,
}

/// One inbound market update, carried as a `MarketData` invocation argument.
///
/// Any field other than the symbol may be absent; absent fields are recorded
/// as empty, never zero.
///
/// # Wire Format (JSON)
/// ```json
/// {"Symbol":"F.US.ES","LastPrice":4390.25,"Bid":4390.0,"Ask":4390.5,"Volume":10}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataMessage {
    /// The feed's symbol identifier.
    #[serde(rename = "Symbol")]
    pub symbol: Symbol,

    /// Last traded price.
    #[serde(rename = "LastPrice", default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,

    /// Best bid price.
    #[serde(rename = "Bid", default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,

    /// Best ask price.
    #[serde(rename = "Ask", default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,

    /// Traded volume.
    #[serde(rename = "Volume", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<i64>,
}

impl MarketDataMessage {
    /// Build the tick record for this update, stamped with the given local
    /// capture time.
    #[must_use]
    pub fn to_record(&self, captured_at: chrono::DateTime<chrono::Utc>) -> TickRecord {
        TickRecord {
            captured_at,
            symbol: self.symbol.clone(),
            last_price: self.last_price,
            bid: self.bid,
            ask: self.ask,
            volume: self.volume,
        }
    }
}
