//! Hub Frame Codec
//!
//! Encoding and decoding for the hub's record-separated JSON framing. A
//! single transport message may carry several frames; each frame is a JSON
//! object terminated by the ASCII record separator (`0x1e`).

use super::messages::{
    CloseFrame, FRAME_CLOSE, FRAME_INVOCATION, FRAME_PING, HandshakeRequest, HandshakeResponse,
    HubFrame, InvocationFrame, RECORD_SEPARATOR,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame object without a numeric `type` field.
    #[error("frame missing numeric 'type' field: {0}")]
    MissingFrameType(String),
}

/// Codec for record-separated JSON hub frames.
#[derive(Debug, Default, Clone)]
pub struct HubFrameCodec;

impl HubFrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode the protocol handshake, with trailing record separator.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (does not happen for the
    /// static handshake payload).
    pub fn encode_handshake(&self) -> Result<String, CodecError> {
        self.encode(&HandshakeRequest::new())
    }

    /// Encode a keep-alive ping frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_ping(&self) -> Result<String, CodecError> {
        let mut text = format!(r#"{{"type":{FRAME_PING}}}"#);
        text.push(RECORD_SEPARATOR);
        Ok(text)
    }

    /// Encode any serializable frame, with trailing record separator.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, frame: &T) -> Result<String, CodecError> {
        let mut text = serde_json::to_string(frame)?;
        text.push(RECORD_SEPARATOR);
        Ok(text)
    }

    /// Split a transport payload into individual frame records.
    ///
    /// Trailing (and any empty) segments produced by the terminator are
    /// dropped.
    #[must_use]
    pub fn split_records<'a>(&self, payload: &'a str) -> Vec<&'a str> {
        payload
            .split(RECORD_SEPARATOR)
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .collect()
    }

    /// Decode a handshake response record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not a JSON object.
    pub fn decode_handshake(&self, record: &str) -> Result<HandshakeResponse, CodecError> {
        Ok(serde_json::from_str(record)?)
    }

    /// Decode one frame record by its `type` discriminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not valid JSON or lacks a numeric
    /// `type` field. Frame types this client does not handle decode to
    /// [`HubFrame::Other`] rather than erroring, so protocol additions do
    /// not break the read loop.
    pub fn decode_frame(&self, record: &str) -> Result<HubFrame, CodecError> {
        let value: serde_json::Value = serde_json::from_str(record)?;

        let Some(frame_type) = value.get("type").and_then(serde_json::Value::as_u64) else {
            return Err(CodecError::MissingFrameType(
                record.chars().take(80).collect(),
            ));
        };

        match frame_type {
            t if t == u64::from(FRAME_INVOCATION) => {
                let frame: InvocationFrame = serde_json::from_value(value)?;
                Ok(HubFrame::Invocation(frame))
            }
            t if t == u64::from(FRAME_PING) => Ok(HubFrame::Ping),
            t if t == u64::from(FRAME_CLOSE) => {
                let frame: CloseFrame = serde_json::from_value(value)?;
                Ok(HubFrame::Close(frame))
            }
            other => Ok(HubFrame::Other(other)),
        }
    }
}
