//! End-to-end reconciliation scenarios on a single partition.

use msgcache_core::{
    Clock, FingerprintVariant, ManualClock, PartitionLog, Reconciler, DEFAULT_PENDING_TTL,
};
use msgcache_testkit::prelude::*;
use std::time::Duration;

const P: PartitionId = PartitionId(7);

#[test]
fn echo_of_own_write_replaces_it() {
    let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);
    let draft = Entry::new(EntryId::new(-1), P)
        .with_content("hi")
        .with_position(10.0)
        .with_created_at(0);
    log.insert_tentative(draft, 0).unwrap();

    let echo = Entry::new(EntryId::new(501), P)
        .with_content("hi")
        .with_position(10.0)
        .with_sequence(900);
    let outcome = Reconciler::new().reconcile(&mut log, &[echo], 1_000);

    let snapshot = log.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, EntryId::new(501));
    assert_eq!(snapshot[0].content.as_deref(), Some("hi"));
    assert_eq!(outcome.discarded, vec![EntryId::new(-1)]);
}

#[test]
fn rapid_identical_images_keep_their_captions() {
    let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);
    let url = "https://cdn/u/photo.jpg";
    let a = image_entry(-1, P, "a", url).with_position(1.0).with_created_at(10);
    let b = image_entry(-2, P, "b", url).with_position(2.0).with_created_at(11);
    log.insert_tentative(a.clone(), 11).unwrap();
    log.insert_tentative(b.clone(), 11).unwrap();

    let first = confirm(&a, 601, 1).with_position(30.0);
    let second = confirm(&b, 602, 2).with_position(31.0);
    let outcome = Reconciler::new().reconcile(&mut log, &[first, second], 20);

    let pairs: Vec<(EntryId, EntryId)> = outcome
        .matches
        .iter()
        .map(|m| (m.tentative_id, m.confirmed_id))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (EntryId::new(-1), EntryId::new(601)),
            (EntryId::new(-2), EntryId::new(602)),
        ]
    );
    assert_eq!(
        log.get(EntryId::new(601)).unwrap().content.as_deref(),
        Some("a")
    );
    assert_eq!(
        log.get(EntryId::new(602)).unwrap().content.as_deref(),
        Some("b")
    );
}

#[test]
fn refetched_entry_with_new_annotations_merges() {
    let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);
    let stored = text_entry(40, P, "deploy done")
        .with_sequence(12)
        .with_position(12.0)
        .with_annotations(["ops"]);
    Reconciler::new().reconcile(&mut log, &[stored.clone()], 0);

    let mut refetched = stored.clone();
    refetched.annotations = Some(["ops".to_string(), "resolved".to_string()].into());
    let outcome = Reconciler::new().reconcile(&mut log, &[refetched], 0);

    assert_eq!(outcome.merged, 1);
    assert_eq!(outcome.inserted, 0);
    assert_eq!(log.len(), 1);

    let merged = log.get(EntryId::new(40)).unwrap();
    assert_eq!(merged.annotations.as_ref().unwrap().len(), 2);
    let mut expected = stored;
    expected.annotations = merged.annotations.clone();
    assert_eq!(*merged, expected);
}

#[test]
fn stale_tentative_is_not_matched() {
    let clock = ManualClock::new(1_700_000_000_000);
    let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);
    let draft = text_entry(-1, P, "anyone here?")
        .with_position(5.0)
        .with_created_at(clock.now_ms());
    log.insert_tentative(draft.clone(), clock.now_ms()).unwrap();

    clock.advance(Duration::from_secs(11 * 60));
    let late = confirm(&draft, 777, 50);
    let outcome = Reconciler::new().reconcile(&mut log, &[late], clock.now_ms());

    assert!(outcome.matches.is_empty());
    assert!(outcome.discarded.is_empty());
    assert_eq!(log.len(), 2);
    assert!(log.contains(EntryId::new(-1)));
    assert!(log.contains(EntryId::new(777)));
}

#[test]
fn tentative_survives_hydration_and_still_matches() {
    let draft = text_entry(-3, P, "offline note")
        .with_position(2.0)
        .with_created_at(1_000);
    let stored = vec![draft.clone(), text_entry(9, P, "older").with_sequence(1)];

    let mut log = PartitionLog::hydrate(P, stored, DEFAULT_PENDING_TTL, 2_000);
    let outcome = Reconciler::new().reconcile(&mut log, &[confirm(&draft, 10, 2)], 3_000);

    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].variant, FingerprintVariant::Exact);
    assert!(!log.contains(EntryId::new(-3)));
}
