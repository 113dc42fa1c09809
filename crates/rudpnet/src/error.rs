use crate::channel::ChannelKey;
use crate::consts::MAX_PAYLOAD_LENGTH;
use crate::packet::PacketError;
use garnet_binary::BinaryError;
use std::io;
use thiserror::Error;

/// Errors surfaced by engine and peer operations.
///
/// Recoverable protocol anomalies (malformed ingress, stale ACKs, duplicate
/// DATA) never appear here; they are absorbed as events and statistics.
#[derive(Error, Debug)]
pub enum RudpError {
    /// An I/O error from the underlying UDP socket.
    #[error("network i/o error: {0}")]
    Io(#[from] io::Error),

    /// An error while serialising a packet.
    #[error("binary handling error: {0}")]
    Binary(#[from] BinaryError),

    /// An error while validating a packet.
    #[error("packet validation error: {0}")]
    Packet(#[from] PacketError),

    /// Payload does not fit the 12-bit length field.
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LENGTH} byte maximum")]
    PayloadTooLarge(usize),

    /// Operation addressed a channel the engine does not know.
    #[error("no channel registered for {0}")]
    ChannelNotFound(ChannelKey),

    /// Port-increment bind retry ran out of candidate ports.
    #[error("no bindable port in {0}..={1}")]
    BindExhausted(u16, u16),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, RudpError>;
