//! Tokio codec adapter for MQTT framing.
//!
//! [`MqttCodec`] implements Tokio's [`Decoder`] and [`Encoder`] traits so a
//! transport can be wrapped in [`tokio_util::codec::Framed`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use pubsub_mqtt::codec::MqttCodec;
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! async fn first_packet(stream: TcpStream) {
//!     let mut framed = Framed::new(stream, MqttCodec::new());
//!     let _packet = framed.next().await;
//! }
//! ```

use bytes::BytesMut;
use mqttbytes::v4;
use tokio_util::codec::{Decoder, Encoder};

use super::{CodecError, MAX_REMAINING_LENGTH, Packet, convert};

/// Tokio codec for MQTT 3.1.1 control packets.
///
/// Parsing and serialization are delegated to `mqttbytes`; this type adds
/// the body size limit, end-of-stream handling, and the packet identifier
/// allocator used for outbound QoS 1 and 2 publishes.
#[derive(Debug)]
pub struct MqttCodec {
    max_packet_size: usize,
    next_message_id: u16,
}

impl Default for MqttCodec {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_REMAINING_LENGTH,
            next_message_id: 1,
        }
    }
}

impl MqttCodec {
    /// Create a codec accepting any packet the protocol allows.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a codec rejecting packets whose body exceeds `max_packet_size`
    /// bytes.
    ///
    /// The limit applies to the remaining length, so the fixed header is not
    /// counted. It is clamped to the protocol maximum.
    #[must_use]
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: max_packet_size.min(MAX_REMAINING_LENGTH),
            ..Self::default()
        }
    }

    /// Return the configured body size limit.
    #[must_use]
    pub const fn max_packet_size(&self) -> usize { self.max_packet_size }

    /// Allocate the next outbound message identifier.
    ///
    /// Identifiers run from 1 to 65535 and wrap back to 1; zero is never
    /// returned.
    pub const fn next_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = match id.checked_add(1) {
            Some(next) => next,
            None => 1,
        };
        id
    }
}

/// Body length of a frame that is `frame_len` bytes long in total.
const fn body_len(frame_len: usize) -> usize {
    let mut length_bytes = 1;
    while length_bytes < 4 && frame_len.saturating_sub(1 + length_bytes) >= 1 << (7 * length_bytes) {
        length_bytes += 1;
    }
    frame_len.saturating_sub(1 + length_bytes)
}

impl Decoder for MqttCodec {
    type Error = CodecError;
    type Item = Packet;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match v4::read(src, self.max_packet_size) {
            Ok(packet) => Ok(Some(convert::from_wire(packet))),
            Err(mqttbytes::Error::InsufficientBytes(needed)) => {
                src.reserve(needed);
                Ok(None)
            }
            Err(mqttbytes::Error::PayloadSizeLimitExceeded(size)) => Err(CodecError::PacketTooLarge {
                size,
                max: self.max_packet_size,
            }),
            Err(e) => Err(CodecError::Mqtt(e)),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None if buf.is_empty() => Ok(None),
            None => Err(CodecError::UnexpectedEof),
        }
    }
}

impl Encoder<Packet> for MqttCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        convert::write(item, dst).inspect_err(|_| dst.truncate(start))?;
        let size = body_len(dst.len() - start);
        if size > self.max_packet_size {
            dst.truncate(start);
            return Err(CodecError::PacketTooLarge {
                size,
                max: self.max_packet_size,
            });
        }
        Ok(())
    }
}
