//! Packet framing tests: splitting, reassembly and the on-wire header.

#![allow(clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tds_codec::{MessageAssembler, PacketFramer, TdsCodec, split_message};
use tds_protocol::login7::{Login7, OptionFlags1, OptionFlags2, OptionFlags3, TypeFlags};
use tds_protocol::{PACKET_HEADER_SIZE, PacketType, TdsVersion};
use tokio::io::AsyncReadExt;
use tokio_util::codec::{Decoder, Encoder};

fn reference_login() -> Login7 {
    Login7 {
        tds_version: TdsVersion::V7_3A,
        packet_size: 0x1000,
        client_prog_version: 0x0106_0100,
        client_pid: 100,
        connection_id: 0,
        option_flags1: OptionFlags1::from_bits_retain(0xE0),
        option_flags2: OptionFlags2::from_bits_retain(0),
        type_flags: TypeFlags::from_bits_retain(0),
        option_flags3: OptionFlags3::from_bits_retain(8),
        client_timezone: -4 * 60,
        client_lcid: 0x204,
        hostname: "subdev1".into(),
        username: "test".into(),
        password: "testpwd".into(),
        app_name: "appname".into(),
        server_name: "servername".into(),
        library_name: "library".into(),
        language: "en".into(),
        database: "database".into(),
        client_id: [0x12, 0x34, 0x56, 0x78, 0x90, 0xab],
        sspi_data: Vec::new(),
        attach_db_file: "filepath".into(),
        new_password: String::new(),
    }
}

#[tokio::test]
async fn reference_login_packet_header() {
    let payload = reference_login().encode().unwrap();
    assert_eq!(payload.len(), 214);

    let (client, mut server) = tokio::io::duplex(4096);
    let mut framer = PacketFramer::new(client);
    framer
        .write_message(PacketType::Login7, payload.clone())
        .await
        .unwrap();
    framer.shutdown().await.unwrap();

    let mut raw = Vec::new();
    server.read_to_end(&mut raw).await.unwrap();
    assert_eq!(raw.len(), 222);

    // the sequence number at offset 6 is the framer's own counter
    let mut header = raw[..PACKET_HEADER_SIZE].to_vec();
    header[6] = 0;
    assert_eq!(header, [16, 1, 0, 222, 0, 0, 0, 0]);
    assert_eq!(&raw[PACKET_HEADER_SIZE..], &payload[..]);
}

#[tokio::test]
async fn messages_in_sequence() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut client = PacketFramer::with_packet_size(client, 512);
    let mut server = PacketFramer::with_packet_size(server, 512);

    for len in [0usize, 1, 504, 505, 3000] {
        let payload = Bytes::from(vec![len as u8; len]);
        client
            .write_message(PacketType::SqlBatch, payload.clone())
            .await
            .unwrap();
        let message = server.read_message().await.unwrap().unwrap();
        assert_eq!(message.payload, payload, "payload of {len} bytes");
        assert!(!server.is_mid_message());
    }
}

proptest! {
    #[test]
    fn split_then_reassemble(
        payload in proptest::collection::vec(any::<u8>(), 0..5000),
        packet_size in 9usize..=4096,
    ) {
        let payload = Bytes::from(payload);
        let packets = split_message(PacketType::SqlBatch, payload.clone(), packet_size);

        let expected = payload.len().div_ceil(packet_size - PACKET_HEADER_SIZE).max(1);
        prop_assert_eq!(packets.len(), expected);
        prop_assert_eq!(packets.iter().filter(|p| p.is_end_of_message()).count(), 1);
        prop_assert!(packets.last().unwrap().is_end_of_message());

        let mut codec = TdsCodec::new().with_max_packet_size(packet_size);
        let mut wire = BytesMut::new();
        for packet in packets {
            codec.encode(packet, &mut wire).unwrap();
        }

        let mut assembler = MessageAssembler::new();
        let mut message = None;
        while let Some(packet) = codec.decode(&mut wire).unwrap() {
            prop_assert!(packet.total_size() <= packet_size);
            message = assembler.push(packet).unwrap();
        }
        prop_assert!(wire.is_empty());
        prop_assert_eq!(message.unwrap().payload, payload);
    }
}

#[tokio::test]
async fn packets_arriving_in_separate_reads() {
    let mock = tokio_test::io::Builder::new()
        .read(&[0x04, 0x00, 0x00, 0x0A, 0, 0, 1, 0, b'a'])
        .read(&[b'b', 0x04, 0x01, 0x00])
        .read(&[0x09, 0, 0, 2, 0, b'c'])
        .build();
    let mut framer = PacketFramer::new(mock);

    let message = framer.read_message().await.unwrap().unwrap();
    assert_eq!(message.packet_type, PacketType::TabularResult);
    assert_eq!(&message.payload[..], b"abc");
    assert!(framer.read_message().await.unwrap().is_none());
}
