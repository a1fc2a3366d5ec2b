//! Error types for MQTT packet framing and conversion.

use std::io;

use thiserror::Error;

/// Errors that can occur when decoding or encoding MQTT packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// `mqttbytes` rejected the bytes on the wire or the packet to write.
    #[error("malformed packet: {0:?}")]
    Mqtt(mqttbytes::Error),
    /// The packet cannot be expressed in MQTT 3.1.1.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),
    /// A packet body exceeds the configured maximum.
    #[error("packet of {size} bytes exceeds maximum of {max}")]
    PacketTooLarge {
        /// Body size of the offending packet in bytes.
        size: usize,
        /// Configured maximum body size in bytes.
        max: usize,
    },
    /// The stream ended in the middle of a frame.
    #[error("stream ended inside a packet")]
    UnexpectedEof,
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
