// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::fingerprint::ReducerSetFingerprint;
use crate::reducer::ReducerDescriptor;

fn descriptor(event_type: &str, version: u32) -> ReducerDescriptor {
    ReducerDescriptor {
        event_type: event_type.to_string(),
        name: event_type.to_string(),
        version,
    }
}

#[test]
fn test_fingerprint_ignores_registration_order() {
    let a = ReducerSetFingerprint::compute("Account", &[descriptor("Opened", 1), descriptor("Deposited", 1)]);
    let b = ReducerSetFingerprint::compute("Account", &[descriptor("Deposited", 1), descriptor("Opened", 1)]);

    assert_eq!(a, b);
}

#[test]
fn test_fingerprint_changes_with_reducer_set() {
    let base = ReducerSetFingerprint::compute("Account", &[descriptor("Opened", 1)]);
    let added = ReducerSetFingerprint::compute("Account", &[descriptor("Opened", 1), descriptor("Closed", 1)]);
    let bumped = ReducerSetFingerprint::compute("Account", &[descriptor("Opened", 2)]);
    let other_model = ReducerSetFingerprint::compute("Ledger", &[descriptor("Opened", 1)]);

    assert_ne!(base, added);
    assert_ne!(base, bumped);
    assert_ne!(base, other_model);
}

#[test]
fn test_fingerprint_hex_roundtrip() {
    let fp = ReducerSetFingerprint::compute("Account", &[descriptor("Opened", 1)]);
    let hex = fp.to_hex();

    assert_eq!(hex.len(), 64);
    assert_eq!(ReducerSetFingerprint::from_hex(&hex), Some(fp));
    assert_eq!(ReducerSetFingerprint::from_hex("zz"), None);
    assert_eq!(fp.short().len(), 16);
}
