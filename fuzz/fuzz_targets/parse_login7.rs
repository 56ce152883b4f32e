#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::Login7;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly; anything that decodes
    // must encode again.
    if let Ok(login) = Login7::decode(data) {
        let _ = login.encode();
    }
});
