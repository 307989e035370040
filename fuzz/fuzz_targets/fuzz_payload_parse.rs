#![no_main]

use libfuzzer_sys::fuzz_target;
use rollcall_token::Payload;

fuzz_target!(|data: &[u8]| {
    // Scanners hand over arbitrary decoded text.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(payload) = Payload::parse(text) else {
        return;
    };

    // Anything accepted re-encodes to a payload that parses to itself,
    // unless a field carries a character the encoder refuses.
    if let Ok(encoded) = payload.encode() {
        let reparsed = Payload::parse(&encoded).expect("re-encoded payload must parse");
        assert_eq!(reparsed, payload);
    }
});
