#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding must reject bad input with an error, never panic.
    if let Ok(request) = chatrelay::gateway::decode_json_body(data) {
        assert!(!request.message.trim().is_empty());
        assert!(!request.session_id.trim().is_empty());
    }
});
