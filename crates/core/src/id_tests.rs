// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn request_ids_are_monotonic() {
    let source = RequestIdSource::new();
    let a = source.next();
    let b = source.next();
    let c = source.next();
    assert!(a < b && b < c);
}

#[test]
fn cloned_source_shares_the_counter() {
    let source = RequestIdSource::new();
    let clone = source.clone();
    let a = source.next();
    let b = clone.next();
    assert!(b > a);
}

#[test]
fn request_id_display_and_serde() {
    let id = RequestId(42);
    assert_eq!(id.to_string(), "42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "42");
    let back: RequestId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn max_request_id_fits_53_bits() {
    assert_eq!(MAX_REQUEST_ID, 9_007_199_254_740_991);
}

#[test]
fn worker_id_generate_uses_prefix() {
    let id = WorkerId::generate();
    assert!(id.as_str().starts_with(WorkerId::PREFIX));
    assert_ne!(id, WorkerId::generate());
}

#[test]
fn worker_id_compares_with_str() {
    let id = WorkerId::new("wkr-fixed");
    assert_eq!(id, *"wkr-fixed");
    assert_eq!(id.to_string(), "wkr-fixed");
}
