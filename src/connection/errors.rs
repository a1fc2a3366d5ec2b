//! Error types surfaced by the connection adapter.

use thiserror::Error;

use crate::codec::{CodecError, PacketType};

/// Errors reported through [`Event::Error`](super::Event::Error) or returned
/// from [`Connection::ack`](super::Connection::ack) and
/// [`Connection::publish`](super::Connection::publish).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Transport or framing failure from the codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The client sent a packet only a server may send.
    #[error("unexpected {0:?} packet from client")]
    UnexpectedPacket(PacketType),
    /// A QoS 1 or 2 acknowledgement has no message identifier to correlate.
    #[error("acknowledgement for QoS above 0 needs a message identifier")]
    MissingMessageId,
    /// An action name outside `connect`, `subscribe`, `unsubscribe`, `publish`.
    #[error("unsupported action {0:?}")]
    UnsupportedAction(String),
}
