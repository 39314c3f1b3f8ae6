// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::position::{BrookPosition, ExpectedVersion};

#[test]
fn test_position_sentinel_and_validation() {
    assert_eq!(BrookPosition::default(), BrookPosition::NOT_SET);
    assert!(!BrookPosition::NOT_SET.is_set());
    assert!(BrookPosition::new(0).unwrap().is_set());
    assert_eq!(BrookPosition::new(-2), Err(KernelError::InvalidPosition(-2)));
}

#[test]
fn test_position_ordering() {
    let a = BrookPosition::new(3).unwrap();
    let b = BrookPosition::new(7).unwrap();

    assert!(b.is_newer_than(a));
    assert!(!a.is_newer_than(b));
    assert!(!a.is_newer_than(a));
    assert!(a.is_newer_than(BrookPosition::NOT_SET));
    assert!(a < b);
}

#[test]
fn test_advance_from_empty() {
    let head = BrookPosition::NOT_SET.advance(3).unwrap();
    assert_eq!(head.value(), 2);
    assert_eq!(head.next().unwrap().value(), 3);
    assert_eq!(BrookPosition::ZERO.previous(), BrookPosition::NOT_SET);
    assert_eq!(BrookPosition::NOT_SET.previous(), BrookPosition::NOT_SET);
}

#[test]
fn test_advance_overflow() {
    let near_max = BrookPosition::new(i64::MAX - 1).unwrap();
    assert_eq!(near_max.advance(2), Err(KernelError::PositionOverflow));
    assert_eq!(BrookPosition::ZERO.advance(u64::MAX), Err(KernelError::PositionOverflow));
}

#[test]
fn test_expected_version_matching() {
    let head = BrookPosition::new(2).unwrap();

    assert!(ExpectedVersion::Any.matches(head));
    assert!(ExpectedVersion::from(head).matches(head));
    assert!(!ExpectedVersion::EMPTY.matches(head));
    assert!(ExpectedVersion::EMPTY.matches(BrookPosition::NOT_SET));
}

#[test]
fn test_position_deserialization_rejects_invalid() {
    let ok: BrookPosition = serde_json::from_str("-1").unwrap();
    assert_eq!(ok, BrookPosition::NOT_SET);

    let bad: Result<BrookPosition, _> = serde_json::from_str("-5");
    assert!(bad.is_err());
}
