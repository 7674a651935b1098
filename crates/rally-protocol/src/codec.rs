//! Codec for decoding client messages and encoding server messages.
//!
//! Messages are JSON objects, one per transport frame. The transport owns
//! framing, so this codec never sees partial messages.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::messages::{ClientMessage, MessageKind, ServerMessage};

/// Maximum inbound message size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum size.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    TooLarge(usize),

    /// Not valid JSON, or not an object with a string `type`.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Well-formed message of a kind clients may not send.
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Decode a client message from raw bytes.
///
/// # Errors
///
/// Returns an error if the data is too large, not valid JSON, not an object
/// carrying a string `type`, or of an unknown kind. String fields of the
/// wrong JSON type are read as absent rather than rejected.
pub fn decode(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }

    let value: Value =
        serde_json::from_slice(data).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing message type".into()))?;

    match kind.parse::<MessageKind>() {
        Ok(k) if k.is_inbound() => {}
        Ok(_) => return Err(ProtocolError::UnknownKind(kind.to_string())),
        Err(e) => return Err(e),
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encode a server message to bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(message: &ServerMessage) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(message)?;
    Ok(Bytes::from(payload))
}
