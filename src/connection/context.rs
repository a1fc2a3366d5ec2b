//! Normalized event payloads.
//!
//! Each context carries the protocol-neutral fields an application needs plus
//! the decoded packet it was built from, so acknowledgements can be
//! correlated by message identifier.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;

use super::{
    ConnectionError,
    ack::{Ack, ConnectAck, PublishAck, SubscribeAck, UnsubscribeAck},
};
use crate::codec::{ConnectPacket, PublishPacket, QoS, SubscribePacket, UnsubscribePacket};

/// Event produced by [`Connection::next_event`](super::Connection::next_event).
#[derive(Debug)]
pub enum Event {
    /// The client asked to connect.
    Connect(ConnectContext),
    /// The client published a message.
    Publish(PublishContext),
    /// The client asked to subscribe.
    Subscribe(SubscribeContext),
    /// The client asked to unsubscribe.
    Unsubscribe(UnsubscribeContext),
    /// Transport or protocol failure, passed through unmodified.
    Error(ConnectionError),
}

/// Credentials presented in a CONNECT packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    /// Username, if the client sent one.
    pub username: Option<String>,
    /// Password, if the client sent one.
    pub password: Option<Bytes>,
}

/// Context for [`Event::Connect`].
#[derive(Debug, Clone)]
pub struct ConnectContext {
    auth: Auth,
    packet: ConnectPacket,
}

impl ConnectContext {
    pub(crate) fn new(packet: ConnectPacket) -> Self {
        let auth = Auth {
            username: packet.username.clone(),
            password: packet.password.clone(),
        };
        Self { auth, packet }
    }

    /// Credentials from the packet.
    #[must_use]
    pub const fn auth(&self) -> &Auth { &self.auth }

    /// Client identifier from the packet.
    #[must_use]
    pub fn client_id(&self) -> &str { &self.packet.client_id }

    /// The decoded CONNECT packet.
    #[must_use]
    pub const fn packet(&self) -> &ConnectPacket { &self.packet }

    /// Start an acknowledgement that accepts the connection.
    ///
    /// Adjust the returned [`ConnectAck`] to reject it.
    #[must_use]
    pub fn ack(&self) -> ConnectAck { ConnectAck::default() }
}

/// Protocol options of a received publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageOptions {
    /// Delivery guarantee requested by the publisher.
    pub qos: QoS,
}

/// Context for [`Event::Publish`].
#[derive(Debug, Clone)]
pub struct PublishContext {
    options: MessageOptions,
    client_id: Option<String>,
    packet: PublishPacket,
}

impl PublishContext {
    pub(crate) const fn new(packet: PublishPacket, client_id: Option<String>) -> Self {
        Self {
            options: MessageOptions { qos: packet.qos },
            client_id,
            packet,
        }
    }

    /// Topic the message was published to.
    #[must_use]
    pub fn topic(&self) -> &str { &self.packet.topic }

    /// Raw payload bytes.
    #[must_use]
    pub const fn message(&self) -> &Bytes { &self.packet.payload }

    /// Delivery options.
    #[must_use]
    pub const fn options(&self) -> MessageOptions { self.options }

    /// Identifier of the client that connected on this transport.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> { self.client_id.as_deref() }

    /// The decoded PUBLISH packet.
    #[must_use]
    pub const fn packet(&self) -> &PublishPacket { &self.packet }

    /// Build the acknowledgement matching the publish QoS.
    #[must_use]
    pub const fn ack(&self) -> Ack {
        Ack::Publish(PublishAck {
            message_id: self.packet.message_id,
            qos: self.options.qos,
        })
    }
}

/// Options of one requested subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Requested maximum QoS.
    pub qos: QoS,
}

/// Context for [`Event::Subscribe`].
#[derive(Debug, Clone)]
pub struct SubscribeContext {
    subscriptions: BTreeMap<String, SubscriptionOptions>,
    client_id: Option<String>,
    packet: SubscribePacket,
}

impl SubscribeContext {
    pub(crate) fn new(packet: SubscribePacket, client_id: Option<String>) -> Self {
        // Later entries for the same filter replace earlier ones.
        let subscriptions = packet
            .subscriptions
            .iter()
            .map(|s| (s.topic.clone(), SubscriptionOptions { qos: s.qos }))
            .collect();
        Self {
            subscriptions,
            client_id,
            packet,
        }
    }

    /// Requested subscriptions keyed by topic filter.
    #[must_use]
    pub const fn subscriptions(&self) -> &BTreeMap<String, SubscriptionOptions> {
        &self.subscriptions
    }

    /// Identifier of the client that connected on this transport.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> { self.client_id.as_deref() }

    /// The decoded SUBSCRIBE packet.
    #[must_use]
    pub const fn packet(&self) -> &SubscribePacket { &self.packet }

    /// Grant every subscription at its requested QoS.
    #[must_use]
    pub fn ack(&self) -> Ack { Ack::Subscribe(self.subscribe_ack(true)) }

    /// Grant the entries whose filter satisfies `accept` and answer the
    /// others with a failure code.
    #[must_use]
    pub fn ack_where(&self, accept: impl Fn(&str) -> bool) -> Ack {
        let ack = self
            .packet
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| !accept(&s.topic))
            .fold(self.subscribe_ack(true), |ack, (index, _)| ack.refuse(index));
        Ack::Subscribe(ack)
    }

    /// Refuse the whole request; the SUBACK grants nothing.
    #[must_use]
    pub fn deny(&self) -> Ack { Ack::Subscribe(self.subscribe_ack(false)) }

    fn subscribe_ack(&self, authorized: bool) -> SubscribeAck {
        SubscribeAck {
            message_id: self.packet.message_id,
            requested: self.packet.subscriptions.iter().map(|s| s.qos).collect(),
            refused: BTreeSet::new(),
            authorized,
        }
    }
}

/// Context for [`Event::Unsubscribe`].
#[derive(Debug, Clone)]
pub struct UnsubscribeContext {
    client_id: Option<String>,
    packet: UnsubscribePacket,
}

impl UnsubscribeContext {
    pub(crate) const fn new(packet: UnsubscribePacket, client_id: Option<String>) -> Self {
        Self { client_id, packet }
    }

    /// Topic filters to remove.
    #[must_use]
    pub fn unsubscriptions(&self) -> &[String] { &self.packet.unsubscriptions }

    /// Identifier of the client that connected on this transport.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> { self.client_id.as_deref() }

    /// The decoded UNSUBSCRIBE packet.
    #[must_use]
    pub const fn packet(&self) -> &UnsubscribePacket { &self.packet }

    /// Build the UNSUBACK acknowledgement.
    #[must_use]
    pub const fn ack(&self) -> Ack {
        Ack::Unsubscribe(UnsubscribeAck {
            message_id: self.packet.message_id,
        })
    }
}
