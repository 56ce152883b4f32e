#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::{MAX_PACKET_SIZE, PacketHeader};

fuzz_target!(|data: &[u8]| {
    // Header parsing and length validation must never panic
    let mut cursor = data;
    if let Ok(header) = PacketHeader::decode(&mut cursor) {
        let _ = header.validate_length(MAX_PACKET_SIZE);
    }
});
