#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tds_protocol::TokenDecoder;

fuzz_target!(|data: &[u8]| {
    // Feed the input in two pieces to exercise the incomplete-token path
    let split = data.first().map_or(0, |b| *b as usize).min(data.len());
    let bytes = Bytes::copy_from_slice(data);

    let mut decoder = TokenDecoder::new();
    decoder.push(bytes.slice(..split), false);
    while let Ok(Some(_)) = decoder.next_token() {}
    decoder.push(bytes.slice(split..), true);
    while let Ok(Some(_)) = decoder.next_token() {}
});
