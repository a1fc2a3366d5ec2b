//! MQTT 3.1.1 control packet types.
//!
//! These are the shapes the connection adapter works with; [`MqttCodec`]
//! converts them to and from the `mqttbytes` wire representation.
//!
//! [`MqttCodec`]: super::MqttCodec

use bytes::Bytes;

/// Control packet type carried in the high nibble of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client request to connect.
    Connect = 1,
    /// Connect acknowledgement.
    Connack = 2,
    /// Publish message.
    Publish = 3,
    /// Publish acknowledgement (QoS 1).
    Puback = 4,
    /// Publish received (QoS 2, part 1).
    Pubrec = 5,
    /// Publish release (QoS 2, part 2).
    Pubrel = 6,
    /// Publish complete (QoS 2, part 3).
    Pubcomp = 7,
    /// Subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgement.
    Suback = 9,
    /// Unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgement.
    Unsuback = 11,
    /// Ping request.
    Pingreq = 12,
    /// Ping response.
    Pingresp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

/// Delivery guarantee attached to a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery.
    AtLeastOnce = 1,
    /// Assured single delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Return the wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }
}

/// CONNACK return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    #[default]
    Accepted = 0,
    /// The server does not support the requested protocol level.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not allowed.
    IdentifierRejected = 2,
    /// The MQTT service is unavailable.
    ServerUnavailable = 3,
    /// The username or password is malformed or wrong.
    BadUsernameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    /// Return the wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }
}

/// Will message registered by a CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// Topic the will is published to.
    pub topic: String,
    /// Will payload.
    pub message: Bytes,
    /// QoS for the will publish.
    pub qos: QoS,
    /// Whether the will is retained.
    pub retain: bool,
}

/// CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    /// Discard any previous session state.
    pub clean_session: bool,
    /// Keep-alive interval in seconds.
    pub keep_alive: u16,
    /// Client identifier; may be empty.
    pub client_id: String,
    /// Optional will message.
    pub will: Option<LastWill>,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<Bytes>,
}

impl ConnectPacket {
    /// Build a clean-session MQTT 3.1.1 CONNECT for `client_id`.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            clean_session: true,
            keep_alive: 60,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }
}

/// CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnackPacket {
    /// Whether the server resumed a stored session.
    pub session_present: bool,
    /// Outcome of the connection attempt.
    pub return_code: ConnectReturnCode,
}

/// PUBLISH packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// Redelivery flag.
    pub dup: bool,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Topic name; never contains wildcards.
    pub topic: String,
    /// Present exactly when `qos` is above [`QoS::AtMostOnce`].
    pub message_id: Option<u16>,
    /// Application payload.
    pub payload: Bytes,
}

/// One topic filter in a SUBSCRIBE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic filter, possibly with `+` and `#` wildcards.
    pub topic: String,
    /// Requested maximum QoS.
    pub qos: QoS,
}

/// SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    /// Identifier echoed by the SUBACK.
    pub message_id: u16,
    /// Requested subscriptions in wire order.
    pub subscriptions: Vec<Subscription>,
}

/// Per-subscription result carried by a SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubackCode {
    /// Subscription accepted with the given maximum QoS.
    Granted(QoS),
    /// Subscription refused.
    Failure,
}

/// SUBACK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubackPacket {
    /// Identifier of the SUBSCRIBE being acknowledged.
    pub message_id: u16,
    /// One code per requested subscription, in request order.
    pub granted: Vec<SubackCode>,
}

/// UNSUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    /// Identifier echoed by the UNSUBACK.
    pub message_id: u16,
    /// Topic filters to remove.
    pub unsubscriptions: Vec<String>,
}

/// A decoded MQTT 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// CONNECT.
    Connect(ConnectPacket),
    /// CONNACK.
    Connack(ConnackPacket),
    /// PUBLISH.
    Publish(PublishPacket),
    /// PUBACK with its message identifier.
    Puback(u16),
    /// PUBREC with its message identifier.
    Pubrec(u16),
    /// PUBREL with its message identifier.
    Pubrel(u16),
    /// PUBCOMP with its message identifier.
    Pubcomp(u16),
    /// SUBSCRIBE.
    Subscribe(SubscribePacket),
    /// SUBACK.
    Suback(SubackPacket),
    /// UNSUBSCRIBE.
    Unsubscribe(UnsubscribePacket),
    /// UNSUBACK with its message identifier.
    Unsuback(u16),
    /// PINGREQ.
    Pingreq,
    /// PINGRESP.
    Pingresp,
    /// DISCONNECT.
    Disconnect,
}

impl Packet {
    /// Return the control packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::Connack(_) => PacketType::Connack,
            Self::Publish(_) => PacketType::Publish,
            Self::Puback(_) => PacketType::Puback,
            Self::Pubrec(_) => PacketType::Pubrec,
            Self::Pubrel(_) => PacketType::Pubrel,
            Self::Pubcomp(_) => PacketType::Pubcomp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::Suback(_) => PacketType::Suback,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::Unsuback(_) => PacketType::Unsuback,
            Self::Pingreq => PacketType::Pingreq,
            Self::Pingresp => PacketType::Pingresp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }
}
