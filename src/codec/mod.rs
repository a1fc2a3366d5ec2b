//! MQTT 3.1.1 wire codec.
//!
//! Framing and packet layout come from the `mqttbytes` crate. This module
//! adapts it to [`tokio_util::codec::Framed`] and converts its v4 packets
//! into the [`Packet`] types the connection adapter works with.

mod convert;
mod errors;
mod framed;
mod packet;

pub use self::{
    errors::CodecError,
    framed::MqttCodec,
    packet::{
        ConnackPacket,
        ConnectPacket,
        ConnectReturnCode,
        LastWill,
        Packet,
        PacketType,
        PublishPacket,
        QoS,
        SubackCode,
        SubackPacket,
        SubscribePacket,
        Subscription,
        UnsubscribePacket,
    },
};

/// Largest value the remaining-length prefix can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

#[cfg(test)]
mod tests;
