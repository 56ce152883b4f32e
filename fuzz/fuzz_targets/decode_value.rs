#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tds_types::{Collation, TypeInfo};

#[derive(Debug, Arbitrary)]
struct Column {
    type_id: u8,
    length: Option<u32>,
    scale: Option<u8>,
    precision: Option<u8>,
    collation: Option<[u8; 5]>,
}

#[derive(Debug, Arbitrary)]
struct Input {
    column: Column,
    value: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut info = TypeInfo::new(input.column.type_id);
    info.length = input.column.length;
    info.scale = input.column.scale;
    info.precision = input.column.precision;
    info.collation = input.column.collation.map(Collation::from_bytes);

    let mut value = Bytes::from(input.value);
    let before = value.len();
    if tds_types::decode_value(&mut value, &info).is_ok() {
        assert!(value.len() <= before);
    }
});
