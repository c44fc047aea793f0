#![no_main]

use libfuzzer_sys::fuzz_target;
use quorum_core::hd::{Curve, DerivationPath, ExtendedKey};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(path) = DerivationPath::parse(text) {
        // Canonical form parses back to the same components
        let canonical = path.to_string_path();
        let reparsed = DerivationPath::parse(&canonical).unwrap();
        assert_eq!(path, reparsed);

        // Short paths are cheap enough to derive on every input
        if path.components.len() <= 6 {
            let master = ExtendedKey::master(Curve::Secp256k1, &[7u8; 64]).unwrap();
            let _ = master.derive_path(&path);

            let ed_master = ExtendedKey::master(Curve::Ed25519, &[7u8; 64]).unwrap();
            match ed_master.derive_path(&path) {
                Ok(_) => assert!(path.components.iter().all(|c| c.hardened)),
                Err(_) => assert!(path.components.iter().any(|c| !c.hardened)),
            }
        }
    }
});
