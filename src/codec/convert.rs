//! Conversions between [`Packet`] and the `mqttbytes` v4 packet types.

use bytes::{Bytes, BytesMut};
use mqttbytes::v4;

use super::{
    CodecError,
    ConnackPacket,
    ConnectPacket,
    ConnectReturnCode,
    LastWill,
    Packet,
    PublishPacket,
    QoS,
    SubackCode,
    SubackPacket,
    SubscribePacket,
    Subscription,
    UnsubscribePacket,
};

const fn qos_from_wire(qos: mqttbytes::QoS) -> QoS {
    match qos {
        mqttbytes::QoS::AtMostOnce => QoS::AtMostOnce,
        mqttbytes::QoS::AtLeastOnce => QoS::AtLeastOnce,
        mqttbytes::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

const fn qos_to_wire(qos: QoS) -> mqttbytes::QoS {
    match qos {
        QoS::AtMostOnce => mqttbytes::QoS::AtMostOnce,
        QoS::AtLeastOnce => mqttbytes::QoS::AtLeastOnce,
        QoS::ExactlyOnce => mqttbytes::QoS::ExactlyOnce,
    }
}

const fn return_code_from_wire(code: v4::ConnectReturnCode) -> ConnectReturnCode {
    match code {
        v4::ConnectReturnCode::Success => ConnectReturnCode::Accepted,
        v4::ConnectReturnCode::RefusedProtocolVersion => {
            ConnectReturnCode::UnacceptableProtocolVersion
        }
        v4::ConnectReturnCode::BadClientId => ConnectReturnCode::IdentifierRejected,
        v4::ConnectReturnCode::ServiceUnavailable => ConnectReturnCode::ServerUnavailable,
        v4::ConnectReturnCode::BadUserNamePassword => ConnectReturnCode::BadUsernameOrPassword,
        v4::ConnectReturnCode::NotAuthorized => ConnectReturnCode::NotAuthorized,
    }
}

const fn return_code_to_wire(code: ConnectReturnCode) -> v4::ConnectReturnCode {
    match code {
        ConnectReturnCode::Accepted => v4::ConnectReturnCode::Success,
        ConnectReturnCode::UnacceptableProtocolVersion => {
            v4::ConnectReturnCode::RefusedProtocolVersion
        }
        ConnectReturnCode::IdentifierRejected => v4::ConnectReturnCode::BadClientId,
        ConnectReturnCode::ServerUnavailable => v4::ConnectReturnCode::ServiceUnavailable,
        ConnectReturnCode::BadUsernameOrPassword => v4::ConnectReturnCode::BadUserNamePassword,
        ConnectReturnCode::NotAuthorized => v4::ConnectReturnCode::NotAuthorized,
    }
}

/// Empty login strings mean the field was absent on the wire.
fn non_empty(value: String) -> Option<String> { (!value.is_empty()).then_some(value) }

fn connect_from_wire(connect: v4::Connect) -> ConnectPacket {
    let (username, password) = match connect.login {
        Some(login) => (
            non_empty(login.username),
            non_empty(login.password).map(Bytes::from),
        ),
        None => (None, None),
    };
    ConnectPacket {
        clean_session: connect.clean_session,
        keep_alive: connect.keep_alive,
        client_id: connect.client_id,
        will: connect.last_will.map(|will| LastWill {
            topic: will.topic,
            message: will.message,
            qos: qos_from_wire(will.qos),
            retain: will.retain,
        }),
        username,
        password,
    }
}

fn connect_to_wire(packet: ConnectPacket) -> Result<v4::Connect, CodecError> {
    let password = packet
        .password
        .map(|password| String::from_utf8(password.to_vec()))
        .transpose()
        .map_err(|_| CodecError::MalformedPacket("password is not valid UTF-8"))?;
    let mut connect = v4::Connect::new(packet.client_id);
    connect.keep_alive = packet.keep_alive;
    connect.clean_session = packet.clean_session;
    connect.last_will = packet.will.map(|will| v4::LastWill {
        topic: will.topic,
        message: will.message,
        qos: qos_to_wire(will.qos),
        retain: will.retain,
    });
    if packet.username.is_some() || password.is_some() {
        connect.login = Some(v4::Login {
            username: packet.username.unwrap_or_default(),
            password: password.unwrap_or_default(),
        });
    }
    Ok(connect)
}

fn publish_from_wire(publish: v4::Publish) -> PublishPacket {
    let qos = qos_from_wire(publish.qos);
    PublishPacket {
        dup: publish.dup,
        qos,
        retain: publish.retain,
        topic: publish.topic,
        message_id: (qos != QoS::AtMostOnce).then_some(publish.pkid),
        payload: publish.payload,
    }
}

fn publish_to_wire(packet: PublishPacket) -> Result<v4::Publish, CodecError> {
    let pkid = match (packet.qos, packet.message_id) {
        (QoS::AtMostOnce, _) => 0,
        (_, Some(id)) => id,
        (_, None) => {
            return Err(CodecError::MalformedPacket(
                "publish above QoS 0 needs a message id",
            ));
        }
    };
    Ok(v4::Publish {
        dup: packet.dup,
        qos: qos_to_wire(packet.qos),
        retain: packet.retain,
        topic: packet.topic,
        pkid,
        payload: packet.payload,
    })
}

/// Convert a packet read by `mqttbytes`.
pub(super) fn from_wire(packet: v4::Packet) -> Packet {
    match packet {
        v4::Packet::Connect(connect) => Packet::Connect(connect_from_wire(connect)),
        v4::Packet::ConnAck(connack) => Packet::Connack(ConnackPacket {
            session_present: connack.session_present,
            return_code: return_code_from_wire(connack.code),
        }),
        v4::Packet::Publish(publish) => Packet::Publish(publish_from_wire(publish)),
        v4::Packet::PubAck(ack) => Packet::Puback(ack.pkid),
        v4::Packet::PubRec(rec) => Packet::Pubrec(rec.pkid),
        v4::Packet::PubRel(rel) => Packet::Pubrel(rel.pkid),
        v4::Packet::PubComp(comp) => Packet::Pubcomp(comp.pkid),
        v4::Packet::Subscribe(subscribe) => Packet::Subscribe(SubscribePacket {
            message_id: subscribe.pkid,
            subscriptions: subscribe
                .filters
                .into_iter()
                .map(|filter| Subscription {
                    topic: filter.path,
                    qos: qos_from_wire(filter.qos),
                })
                .collect(),
        }),
        v4::Packet::SubAck(suback) => Packet::Suback(SubackPacket {
            message_id: suback.pkid,
            granted: suback
                .return_codes
                .into_iter()
                .map(|code| match code {
                    v4::SubscribeReasonCode::Success(qos) => SubackCode::Granted(qos_from_wire(qos)),
                    v4::SubscribeReasonCode::Failure => SubackCode::Failure,
                })
                .collect(),
        }),
        v4::Packet::Unsubscribe(unsubscribe) => Packet::Unsubscribe(UnsubscribePacket {
            message_id: unsubscribe.pkid,
            unsubscriptions: unsubscribe.topics,
        }),
        v4::Packet::UnsubAck(unsuback) => Packet::Unsuback(unsuback.pkid),
        v4::Packet::PingReq => Packet::Pingreq,
        v4::Packet::PingResp => Packet::Pingresp,
        v4::Packet::Disconnect => Packet::Disconnect,
    }
}

/// Serialize `packet` into `dst` with the matching `mqttbytes` writer.
pub(super) fn write(packet: Packet, dst: &mut BytesMut) -> Result<usize, CodecError> {
    let written = match packet {
        Packet::Connect(connect) => connect_to_wire(connect)?.write(dst),
        Packet::Connack(connack) => v4::ConnAck {
            session_present: connack.session_present,
            code: return_code_to_wire(connack.return_code),
        }
        .write(dst),
        Packet::Publish(publish) => publish_to_wire(publish)?.write(dst),
        Packet::Puback(id) => v4::PubAck::new(id).write(dst),
        Packet::Pubrec(id) => v4::PubRec::new(id).write(dst),
        Packet::Pubrel(id) => v4::PubRel::new(id).write(dst),
        Packet::Pubcomp(id) => v4::PubComp::new(id).write(dst),
        Packet::Subscribe(subscribe) => v4::Subscribe {
            pkid: subscribe.message_id,
            filters: subscribe
                .subscriptions
                .into_iter()
                .map(|sub| v4::SubscribeFilter::new(sub.topic, qos_to_wire(sub.qos)))
                .collect(),
        }
        .write(dst),
        Packet::Suback(suback) => v4::SubAck::new(
            suback.message_id,
            suback
                .granted
                .into_iter()
                .map(|code| match code {
                    SubackCode::Granted(qos) => v4::SubscribeReasonCode::Success(qos_to_wire(qos)),
                    SubackCode::Failure => v4::SubscribeReasonCode::Failure,
                })
                .collect(),
        )
        .write(dst),
        Packet::Unsubscribe(unsubscribe) => v4::Unsubscribe {
            pkid: unsubscribe.message_id,
            topics: unsubscribe.unsubscriptions,
        }
        .write(dst),
        Packet::Unsuback(id) => v4::UnsubAck::new(id).write(dst),
        Packet::Pingreq => v4::PingReq.write(dst),
        Packet::Pingresp => v4::PingResp.write(dst),
        Packet::Disconnect => v4::Disconnect.write(dst),
    };
    written.map_err(CodecError::Mqtt)
}
