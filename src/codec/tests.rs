//! Tests for the MQTT Tokio codec.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use rstest::{fixture, rstest};
use tokio_util::codec::{Decoder, Encoder};

use super::*;

#[fixture]
fn codec() -> MqttCodec { MqttCodec::new() }

/// CONNECT from client `c1` with username `u` and password `p`.
const CONNECT_WITH_CREDENTIALS: &[u8] = &[
    0x10, 0x14, // header
    0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, // protocol
    0xC2, 0x00, 0x3C, // flags, keep-alive
    0x00, 0x02, b'c', b'1', // client id
    0x00, 0x01, b'u', // username
    0x00, 0x01, b'p', // password
];

/// QoS 1 PUBLISH of `hi` to `a/b` with message id 10.
const PUBLISH_QOS1: &[u8] = &[
    0x32, 0x09, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x0A, b'h', b'i',
];

fn decode_all(codec: &mut MqttCodec, bytes: &[u8]) -> Result<Option<Packet>, CodecError> {
    let mut buf = BytesMut::from(bytes);
    codec.decode(&mut buf)
}

fn publish_qos1() -> Packet {
    Packet::Publish(PublishPacket {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic: "a/b".to_owned(),
        message_id: Some(10),
        payload: Bytes::from_static(b"hi"),
    })
}

#[rstest]
fn decodes_connect_with_credentials(mut codec: MqttCodec) {
    let packet = decode_all(&mut codec, CONNECT_WITH_CREDENTIALS)
        .expect("decode should succeed")
        .expect("should produce packet");

    let Packet::Connect(connect) = packet else {
        panic!("expected connect, got {packet:?}");
    };
    assert!(connect.clean_session);
    assert_eq!(connect.keep_alive, 60);
    assert_eq!(connect.client_id, "c1");
    assert_eq!(connect.username.as_deref(), Some("u"));
    assert_eq!(connect.password, Some(Bytes::from_static(b"p")));
    assert!(connect.will.is_none());
}

#[rstest]
fn decodes_publish_with_message_id(mut codec: MqttCodec) {
    let packet = decode_all(&mut codec, PUBLISH_QOS1)
        .expect("decode should succeed")
        .expect("should produce packet");

    assert_eq!(packet, publish_qos1());
}

#[rstest]
#[case::pingreq(&[0xC0, 0x00], Packet::Pingreq)]
#[case::disconnect(&[0xE0, 0x00], Packet::Disconnect)]
#[case::pubrel(&[0x62, 0x02, 0x01, 0x00], Packet::Pubrel(256))]
#[case::qos0_publish(
    &[0x30, 0x03, 0x00, 0x01, b't'],
    Packet::Publish(PublishPacket {
        dup: false,
        qos: QoS::AtMostOnce,
        retain: false,
        topic: "t".to_owned(),
        message_id: None,
        payload: Bytes::new(),
    }),
)]
#[case::subscribe(
    &[0x82, 0x08, 0x00, 0x07, 0x00, 0x03, b'a', b'/', b'#', 0x01],
    Packet::Subscribe(SubscribePacket {
        message_id: 7,
        subscriptions: vec![Subscription { topic: "a/#".to_owned(), qos: QoS::AtLeastOnce }],
    }),
)]
fn converts_decoded_packets(mut codec: MqttCodec, #[case] bytes: &[u8], #[case] expected: Packet) {
    let packet = decode_all(&mut codec, bytes)
        .expect("decode should succeed")
        .expect("should produce packet");

    assert_eq!(packet, expected);
}

#[rstest]
#[case::header_only(2)]
#[case::inside_body(7)]
#[case::one_byte_short(PUBLISH_QOS1.len() - 1)]
fn returns_none_for_partial_frame(mut codec: MqttCodec, #[case] available: usize) {
    let mut buf = BytesMut::from(&PUBLISH_QOS1[..available]);

    assert!(codec.decode(&mut buf).expect("partial frame is not an error").is_none());
    assert_eq!(buf.len(), available);
}

#[rstest]
fn decodes_back_to_back_frames(mut codec: MqttCodec) {
    let mut buf = BytesMut::from(&[0xC0, 0x00][..]);
    buf.extend_from_slice(PUBLISH_QOS1);

    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(Packet::Pingreq));
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(publish_qos1()));
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[rstest]
fn surfaces_library_errors(mut codec: MqttCodec) {
    let err = decode_all(&mut codec, &[0x00, 0x00]).expect_err("decode should fail");

    assert!(matches!(err, CodecError::Mqtt(_)), "unexpected error {err:?}");
    assert!(err.to_string().starts_with("malformed packet"));
}

#[test]
fn rejects_oversize_body() {
    let mut codec = MqttCodec::with_max_packet_size(4);

    let err = decode_all(&mut codec, PUBLISH_QOS1).expect_err("decode should fail");

    assert!(matches!(err, CodecError::PacketTooLarge { max: 4, .. }), "unexpected error {err:?}");
}

#[test]
fn clamps_limit_to_protocol_maximum() {
    let codec = MqttCodec::with_max_packet_size(usize::MAX);

    assert_eq!(codec.max_packet_size(), MAX_REMAINING_LENGTH);
}

#[rstest]
fn rejects_incomplete_frame_at_eof(mut codec: MqttCodec) {
    let mut buf = BytesMut::from(&PUBLISH_QOS1[..5]);

    let err = codec.decode_eof(&mut buf).expect_err("decode should fail");

    assert!(matches!(err, CodecError::UnexpectedEof));
}

#[rstest]
fn clean_eof_yields_none(mut codec: MqttCodec) {
    let mut buf = BytesMut::new();

    assert!(codec.decode_eof(&mut buf).expect("clean eof").is_none());
}

#[rstest]
#[case::connack(
    Packet::Connack(ConnackPacket { session_present: false, return_code: ConnectReturnCode::NotAuthorized }),
    &[0x20, 0x02, 0x00, 0x05],
)]
#[case::suback(
    Packet::Suback(SubackPacket {
        message_id: 7,
        granted: vec![SubackCode::Granted(QoS::AtLeastOnce), SubackCode::Failure],
    }),
    &[0x90, 0x04, 0x00, 0x07, 0x01, 0x80],
)]
#[case::puback(Packet::Puback(10), &[0x40, 0x02, 0x00, 0x0A])]
#[case::pubrel(Packet::Pubrel(10), &[0x62, 0x02, 0x00, 0x0A])]
#[case::unsuback(Packet::Unsuback(3), &[0xB0, 0x02, 0x00, 0x03])]
#[case::pingresp(Packet::Pingresp, &[0xD0, 0x00])]
#[case::publish(publish_qos1(), PUBLISH_QOS1)]
fn encodes_packets(mut codec: MqttCodec, #[case] packet: Packet, #[case] expected: &[u8]) {
    let mut buf = BytesMut::new();

    codec.encode(packet, &mut buf).expect("encode should succeed");

    assert_eq!(&buf[..], expected);
}

#[rstest]
fn connect_with_will_and_login_survives_the_wire(mut codec: MqttCodec) {
    let connect = ConnectPacket {
        keep_alive: 30,
        will: Some(LastWill {
            topic: "clients/c1".to_owned(),
            message: Bytes::from_static(b"gone"),
            qos: QoS::AtLeastOnce,
            retain: true,
        }),
        username: Some("u".to_owned()),
        password: Some(Bytes::from_static(b"p")),
        ..ConnectPacket::new("c1")
    };
    let mut buf = BytesMut::new();

    codec
        .encode(Packet::Connect(connect.clone()), &mut buf)
        .expect("encode should succeed");

    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(Packet::Connect(connect)));
}

#[rstest]
fn refuses_qos1_publish_without_message_id(mut codec: MqttCodec) {
    let packet = Packet::Publish(PublishPacket {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic: "a/b".to_owned(),
        message_id: None,
        payload: Bytes::from_static(b"hi"),
    });
    let mut buf = BytesMut::new();

    let err = codec.encode(packet, &mut buf).expect_err("encode should fail");

    assert!(matches!(err, CodecError::MalformedPacket(_)));
    assert!(buf.is_empty());
}

#[rstest]
fn refuses_non_utf8_password(mut codec: MqttCodec) {
    let packet = Packet::Connect(ConnectPacket {
        username: Some("u".to_owned()),
        password: Some(Bytes::from_static(&[0xC3, 0x28])),
        ..ConnectPacket::new("c1")
    });
    let mut buf = BytesMut::new();

    let err = codec.encode(packet, &mut buf).expect_err("encode should fail");

    assert!(matches!(err, CodecError::MalformedPacket(_)));
}

#[test]
fn refuses_packets_over_configured_limit() {
    let mut codec = MqttCodec::with_max_packet_size(4);
    let mut buf = BytesMut::from(&[0xC0, 0x00][..]);

    let err = codec.encode(publish_qos1(), &mut buf).expect_err("encode should fail");

    assert!(matches!(err, CodecError::PacketTooLarge { size: 9, max: 4 }));
    assert_eq!(&buf[..], &[0xC0, 0x00]);
}

#[rstest]
fn message_ids_skip_zero_on_wrap(mut codec: MqttCodec) {
    assert_eq!(codec.next_message_id(), 1);
    for _ in 2..u16::MAX {
        codec.next_message_id();
    }
    assert_eq!(codec.next_message_id(), u16::MAX);
    assert_eq!(codec.next_message_id(), 1);
}

proptest! {
    #[test]
    fn chunked_input_yields_the_same_packets(split in 0usize..=CONNECT_WITH_CREDENTIALS.len() + PUBLISH_QOS1.len()) {
        let mut stream = CONNECT_WITH_CREDENTIALS.to_vec();
        stream.extend_from_slice(PUBLISH_QOS1);
        let (head, tail) = stream.split_at(split);
        let mut codec = MqttCodec::new();
        let mut buf = BytesMut::new();
        let mut packets = Vec::new();

        for chunk in [head, tail] {
            buf.extend_from_slice(chunk);
            while let Some(packet) = codec.decode(&mut buf).expect("valid stream") {
                packets.push(packet);
            }
        }

        prop_assert_eq!(packets.len(), 2);
        prop_assert!(matches!(packets.first(), Some(Packet::Connect(_))));
        prop_assert_eq!(packets.get(1), Some(&publish_qos1()));
        prop_assert!(buf.is_empty());
    }
}
