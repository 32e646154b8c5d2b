#![no_main]

use libfuzzer_sys::fuzz_target;

use deje_core::protocol::Message;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = Message::decode(data) else {
        return;
    };
    // Re-encoding a decoded message must decode to the same content hash.
    // Values may change representation (`1.0` is written as `1`).
    let bytes = message.encode().expect("decoded messages re-encode");
    let again = Message::decode(&bytes).expect("canonical bytes decode");
    assert_eq!(again.kind(), message.kind());
    assert_eq!(again.hash(), message.hash());
});
