#![no_main]

use libfuzzer_sys::fuzz_target;
use quorum_core::{apply_bootstrap_reduction, DevicePublicKey, ShardingPolicy};

fuzz_target!(|data: &[u8]| {
    let Ok(policy) = serde_json::from_slice::<ShardingPolicy>(data) else {
        return;
    };
    if policy.validate().is_err() {
        return;
    }

    // Canonical encoding is a pure function of the policy
    assert_eq!(policy.canonical_bytes(), policy.canonical_bytes());

    let enrolling = policy.participants[0].participant_id.clone();
    let bootstrap = policy.participants.last().map(|p| p.participant_id.clone());
    let new_key = DevicePublicKey::new([0xEE; 32]);

    for bootstrap_id in [None, bootstrap.as_deref()] {
        // Never panics, never yields an invalid policy
        if let Ok(reduced) = apply_bootstrap_reduction(&policy, &enrolling, new_key, bootstrap_id) {
            reduced.validate().unwrap();
            assert!(reduced.threshold as usize <= reduced.participants.len());
            assert_eq!(reduced.policy_revision_guid, policy.policy_revision_guid);
        }
    }
});
