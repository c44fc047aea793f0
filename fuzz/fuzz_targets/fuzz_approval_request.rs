#![no_main]

use libfuzzer_sys::fuzz_target;
use quorum_core::{ApprovalRequest, RootSecret};

fuzz_target!(|data: &[u8]| {
    let Ok(request) = serde_json::from_slice::<ApprovalRequest>(data) else {
        return;
    };
    if request.validate().is_err() {
        return;
    }

    let root = RootSecret::from_bytes(&[0x42; 64]).unwrap();
    let mut payloads = Vec::new();
    for target in request.targets() {
        let Ok(key) = root.derive(target.chain(), target.derivation_index()) else {
            return;
        };
        // Serialization rejects bad input with an error, never a panic
        if let Ok(payload) = target.serialize_for(key.public()) {
            assert!(!payload.segments.is_empty());
            assert_eq!(payload.sign(&key).unwrap().len(), payload.segments.len());
            payloads.push(payload);
        }
    }

    // Digest is deterministic over whatever serialized
    assert_eq!(request.digest(&payloads), request.digest(&payloads));
});
