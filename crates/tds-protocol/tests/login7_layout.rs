//! Login7 layout tests against a captured reference login.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use tds_protocol::codec::read_utf16_string;
use tds_protocol::login7::{
    LOGIN7_HEADER_SIZE, Login7, OptionFlags1, OptionFlags2, OptionFlags3, TypeFlags,
    deobfuscate_password,
};
use tds_protocol::version::TdsVersion;

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

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

#[test]
fn reference_login_is_byte_exact() {
    let mut expected: Vec<u8> = vec![
        214, 0, 0, 0, 3, 0, 10, 115, 0, 16, 0, 0, 0, 1, 6, 1, 100, 0, 0, 0, 0, 0, 0, 0, 224, 0,
        0, 8, 16, 255, 255, 255, 4, 2, 0, 0, 94, 0, 7, 0, 108, 0, 4, 0, 116, 0, 7, 0, 130, 0, 7,
        0, 144, 0, 10, 0, 0, 0, 0, 0, 164, 0, 7, 0, 178, 0, 2, 0, 182, 0, 8, 0, 18, 52, 86, 120,
        144, 171, 198, 0, 0, 0, 198, 0, 8, 0, 214, 0, 0, 0, 0, 0, 0, 0,
    ];
    expected.extend(utf16("subdev1"));
    expected.extend(utf16("test"));
    expected.extend([
        226, 165, 243, 165, 146, 165, 226, 165, 162, 165, 210, 165, 227, 165,
    ]);
    expected.extend(utf16("appname"));
    expected.extend(utf16("servername"));
    expected.extend(utf16("library"));
    expected.extend(utf16("en"));
    expected.extend(utf16("database"));
    expected.extend(utf16("filepath"));

    let encoded = reference_login().encode().unwrap();
    assert_eq!(encoded.len(), 214);
    assert_eq!(&encoded[..], &expected[..]);
}

#[test]
fn encoding_is_deterministic() {
    let login = reference_login();
    assert_eq!(login.encode().unwrap(), login.encode().unwrap());
}

#[test]
fn reference_strings_read_back() {
    let encoded = reference_login().encode().unwrap();

    let mut hostname = &encoded[94..108];
    assert_eq!(read_utf16_string(&mut hostname, 7).unwrap(), "subdev1");
    let mut database = &encoded[182..198];
    assert_eq!(read_utf16_string(&mut database, 8).unwrap(), "database");
    assert_eq!(deobfuscate_password(&encoded[116..130]).unwrap(), "testpwd");

    assert_eq!(Login7::decode(&encoded).unwrap(), reference_login());
}

fn offset_at(encoded: &[u8], table_pos: usize) -> (usize, usize) {
    let offset = u16::from_le_bytes([encoded[table_pos], encoded[table_pos + 1]]);
    let len = u16::from_le_bytes([encoded[table_pos + 2], encoded[table_pos + 3]]);
    (usize::from(offset), usize::from(len))
}

proptest! {
    #[test]
    fn offsets_follow_preceding_lengths(
        fields in proptest::collection::vec("\\PC{0,24}", 9),
        sspi in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let login = Login7 {
            hostname: fields[0].clone(),
            username: fields[1].clone(),
            password: fields[2].clone(),
            app_name: fields[3].clone(),
            server_name: fields[4].clone(),
            library_name: fields[5].clone(),
            language: fields[6].clone(),
            database: fields[7].clone(),
            sspi_data: sspi.clone(),
            attach_db_file: fields[8].clone(),
            ..Login7::default()
        };
        let encoded = login.encode().unwrap();

        // (table position, UTF-16 units, bytes per unit) in canonical order
        let units = |s: &str| s.encode_utf16().count();
        let layout = [
            (36, units(&fields[0]), 2),
            (40, units(&fields[1]), 2),
            (44, units(&fields[2]), 2),
            (48, units(&fields[3]), 2),
            (52, units(&fields[4]), 2),
            (60, units(&fields[5]), 2),
            (64, units(&fields[6]), 2),
            (68, units(&fields[7]), 2),
            (78, sspi.len(), 1),
            (82, units(&fields[8]), 2),
            (86, 0, 2),
        ];

        let mut expected_offset = LOGIN7_HEADER_SIZE;
        for (table_pos, len, width) in layout {
            prop_assert_eq!(offset_at(&encoded, table_pos), (expected_offset, len));
            expected_offset += len * width;
        }

        let total = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        prop_assert_eq!(total as usize, expected_offset);
        prop_assert_eq!(encoded.len(), expected_offset);
        prop_assert_eq!(offset_at(&encoded, 56), (0, 0));
    }
}
