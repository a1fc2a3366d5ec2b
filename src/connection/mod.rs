//! Connection adapter between MQTT packets and pub/sub events.
//!
//! A [`Connection`] wraps a byte-stream transport with [`MqttCodec`] and
//! translates in both directions:
//!
//! 1. Inbound packets become typed [`Event`]s from [`Connection::next_event`].
//! 2. The application answers with an [`Ack`] passed to [`Connection::ack`],
//!    which is encoded as the matching response packet.
//!
//! Keep-alive and QoS 2 handshake packets (`PINGREQ`, `PUBREL`, `PUBREC`) are
//! answered internally and never reach the application. Requests that need
//! a decision are never answered until the application calls `ack`.

mod ack;
mod context;
mod errors;

use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

pub use self::{
    ack::{Ack, Action, ConnectAck, PublishAck, SubscribeAck, UnsubscribeAck},
    context::{
        Auth,
        ConnectContext,
        Event,
        MessageOptions,
        PublishContext,
        SubscribeContext,
        SubscriptionOptions,
        UnsubscribeContext,
    },
    errors::ConnectionError,
};
use crate::codec::{ConnackPacket, MqttCodec, Packet, PublishPacket, QoS, SubackPacket};

/// Options for [`Connection::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Delivery guarantee; defaults to QoS 0.
    pub qos: QoS,
    /// Retain flag; defaults to `false`.
    pub retain: bool,
    /// Identifier for QoS 1 and 2; allocated by the codec when absent.
    pub message_id: Option<u16>,
}

impl PublishOptions {
    /// Options for a non-retained publish at `qos`.
    #[must_use]
    pub const fn with_qos(qos: QoS) -> Self {
        Self {
            qos,
            retain: false,
            message_id: None,
        }
    }
}

/// Outcome of handling one inbound packet.
enum Inbound {
    Emit(Event),
    Handled,
    Finished,
}

/// MQTT connection upgraded from a byte-stream transport.
///
/// Methods take `&mut self`, so reading events, acknowledging and publishing
/// are serialized by the owner, matching MQTT's ordered delivery.
#[derive(Debug)]
pub struct Connection<T> {
    framed: Framed<T, MqttCodec>,
    client_id: Option<String>,
    /// Internal replies not yet accepted by the codec.
    replies: VecDeque<Packet>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Upgrade `io` using a default [`MqttCodec`].
    pub fn new(io: T) -> Self { Self::with_codec(io, MqttCodec::new()) }

    /// Upgrade `io` using a configured codec.
    pub fn with_codec(io: T, codec: MqttCodec) -> Self {
        Self {
            framed: Framed::new(io, codec),
            client_id: None,
            replies: VecDeque::new(),
        }
    }

    /// Client identifier from the CONNECT packet, once received.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> { self.client_id.as_deref() }

    /// Borrow the underlying transport.
    #[must_use]
    pub fn get_ref(&self) -> &T { self.framed.get_ref() }

    /// Release the underlying transport.
    ///
    /// Bytes buffered by the codec are discarded.
    #[must_use]
    pub fn into_inner(self) -> T { self.framed.into_inner() }

    /// Wait for the next event.
    ///
    /// Returns `None` once the client disconnects, the transport reaches end
    /// of input, or after a decode error has been reported.
    ///
    /// Dropping the future is safe. An internal reply it was still writing
    /// is sent ahead of the next event or outbound packet.
    pub async fn next_event(&mut self) -> Option<Event> {
        if let Err(e) = self.flush_replies().await {
            return Some(Event::Error(e));
        }
        loop {
            let packet = match self.framed.next().await? {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(error = %e, "failed to decode mqtt packet");
                    return Some(Event::Error(e.into()));
                }
            };
            debug!(packet_type = ?packet.packet_type(), "received packet");
            match self.handle_packet(packet).await {
                Inbound::Emit(event) => return Some(event),
                Inbound::Handled => {}
                Inbound::Finished => return None,
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) -> Inbound {
        match packet {
            Packet::Connect(connect) => {
                self.client_id = Some(connect.client_id.clone());
                Inbound::Emit(Event::Connect(ConnectContext::new(connect)))
            }
            Packet::Publish(publish) => Inbound::Emit(Event::Publish(PublishContext::new(
                publish,
                self.client_id.clone(),
            ))),
            Packet::Subscribe(subscribe) => Inbound::Emit(Event::Subscribe(
                SubscribeContext::new(subscribe, self.client_id.clone()),
            )),
            Packet::Unsubscribe(unsubscribe) => Inbound::Emit(Event::Unsubscribe(
                UnsubscribeContext::new(unsubscribe, self.client_id.clone()),
            )),
            Packet::Pingreq => self.reply(Packet::Pingresp).await,
            Packet::Pubrel(id) => self.reply(Packet::Pubcomp(id)).await,
            Packet::Pubrec(id) => self.reply(Packet::Pubrel(id)).await,
            Packet::Puback(id) | Packet::Pubcomp(id) => {
                debug!(message_id = id, "outbound publish acknowledged");
                Inbound::Handled
            }
            Packet::Disconnect => {
                debug!(client_id = ?self.client_id, "client disconnected");
                Inbound::Finished
            }
            other @ (Packet::Connack(_)
            | Packet::Suback(_)
            | Packet::Unsuback(_)
            | Packet::Pingresp) => {
                let packet_type = other.packet_type();
                warn!(?packet_type, "client sent a server-only packet");
                Inbound::Emit(Event::Error(ConnectionError::UnexpectedPacket(packet_type)))
            }
        }
    }

    async fn reply(&mut self, packet: Packet) -> Inbound {
        self.replies.push_back(packet);
        match self.flush_replies().await {
            Ok(()) => Inbound::Handled,
            Err(e) => Inbound::Emit(Event::Error(e)),
        }
    }

    /// Hand queued internal replies to the codec and flush the transport.
    ///
    /// A reply leaves the queue once the codec has buffered it or failed to.
    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        if self.replies.is_empty() {
            return Ok(());
        }
        while let Some(packet) = self.replies.front().cloned() {
            let packet_type = packet.packet_type();
            let fed = self.framed.feed(packet).await;
            self.replies.pop_front();
            if let Err(e) = fed {
                error!(?packet_type, error = %e, "failed to send reply");
                return Err(e.into());
            }
        }
        if let Err(e) = self.framed.flush().await {
            error!(error = %e, "failed to flush replies");
            return Err(e.into());
        }
        Ok(())
    }

    /// Encode and send the response packet for `ack`.
    ///
    /// A QoS 0 publish needs no response; the returned future still yields to
    /// the scheduler once so completion is never immediate.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MissingMessageId`] for a QoS 1 or 2 publish
    /// acknowledgement without an identifier, or the codec error if the packet
    /// cannot be encoded or written.
    pub async fn ack(&mut self, ack: Ack) -> Result<(), ConnectionError> {
        debug!(action = %ack.action(), "ack");
        match ack {
            Ack::Connect(connect) => {
                let return_code = connect.return_code();
                self.send(Packet::Connack(ConnackPacket {
                    session_present: false,
                    return_code,
                }))
                .await
            }
            Ack::Subscribe(subscribe) => {
                let granted = subscribe.granted();
                self.send(Packet::Suback(SubackPacket {
                    message_id: subscribe.message_id,
                    granted,
                }))
                .await
            }
            Ack::Unsubscribe(unsubscribe) => {
                self.send(Packet::Unsuback(unsubscribe.message_id)).await
            }
            Ack::Publish(publish) => match publish.qos {
                QoS::AtMostOnce => {
                    tokio::task::yield_now().await;
                    Ok(())
                }
                QoS::AtLeastOnce => {
                    let id = publish.message_id.ok_or(ConnectionError::MissingMessageId)?;
                    self.send(Packet::Puback(id)).await
                }
                QoS::ExactlyOnce => {
                    let id = publish.message_id.ok_or(ConnectionError::MissingMessageId)?;
                    self.send(Packet::Pubrec(id)).await
                }
            },
        }
    }

    /// Publish `message` to `topic` on this connection.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the packet cannot be encoded or written.
    pub async fn publish(
        &mut self,
        topic: impl Into<String>,
        message: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<(), ConnectionError> {
        let message_id = match options.qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce | QoS::ExactlyOnce => Some(
                options
                    .message_id
                    .unwrap_or_else(|| self.framed.codec_mut().next_message_id()),
            ),
        };
        self.send(Packet::Publish(PublishPacket {
            dup: false,
            qos: options.qos,
            retain: options.retain,
            topic: topic.into(),
            message_id,
            payload: message.into(),
        }))
        .await
    }

    async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        self.flush_replies().await?;
        let packet_type = packet.packet_type();
        if let Err(e) = self.framed.send(packet).await {
            error!(?packet_type, error = %e, "failed to send packet");
            return Err(e.into());
        }
        Ok(())
    }
}
