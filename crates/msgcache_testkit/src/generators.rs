//! Property-based test generators using proptest.
//!
//! Strategies produce entries that respect the identity rules: confirmed
//! entries carry positive ids, drafts carry none of the server-assigned
//! fields.

use msgcache_core::{Entry, EntryId, EntryKind, PartitionId};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for entry kinds.
pub fn entry_kind_strategy() -> impl Strategy<Value = EntryKind> {
    prop_oneof![
        4 => Just(EntryKind::Text),
        1 => Just(EntryKind::Image),
        1 => Just(EntryKind::Audio),
        1 => Just(EntryKind::File),
        1 => Just(EntryKind::Choice),
    ]
}

/// Strategy for short message bodies.
pub fn content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ]{1,12}").expect("Invalid regex")
}

/// Strategy for finite positions, including frequent ties.
pub fn position_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        (0u32..20).prop_map(f64::from),
        (-1.0e6..1.0e6f64),
    ]
}

/// Strategy for a confirmed entry in `partition`.
pub fn confirmed_entry_strategy(partition: PartitionId) -> impl Strategy<Value = Entry> {
    (
        1i64..500,
        1u64..10_000,
        position_strategy(),
        entry_kind_strategy(),
        content_strategy(),
        prop::option::of(prop::collection::btree_set("[a-z]{1,6}", 0..3)),
    )
        .prop_map(move |(id, sequence, position, kind, content, annotations)| {
            let mut entry = Entry::new(EntryId::new(id), partition)
                .with_sequence(sequence)
                .with_position(position)
                .with_kind(kind)
                .with_author("user-1")
                .with_content(content);
            if kind.is_media() {
                entry = entry.with_payload_field("url", format!("https://cdn/{id}.bin"));
            }
            entry.annotations = annotations;
            entry
        })
}

/// Strategy for a batch of confirmed entries, ids possibly repeated.
pub fn confirmed_batch_strategy(
    partition: PartitionId,
    max_len: usize,
) -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(confirmed_entry_strategy(partition), 0..max_len)
}

/// Strategy for a batch of confirmed entries with distinct ids.
pub fn unique_confirmed_batch_strategy(
    partition: PartitionId,
    max_len: usize,
) -> impl Strategy<Value = Vec<Entry>> {
    confirmed_batch_strategy(partition, max_len).prop_map(|batch| {
        batch
            .into_iter()
            .map(|e| (e.id, e))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    })
}

/// Strategy for write/echo scripts.
///
/// Produces `(contents, echo_order)`: one local draft per content and the
/// order in which their confirmations arrive, as a permutation of indices.
pub fn write_echo_script_strategy(max_len: usize) -> impl Strategy<Value = (Vec<String>, Vec<usize>)> {
    prop::collection::vec(content_strategy(), 1..max_len).prop_flat_map(|contents| {
        let order: Vec<usize> = (0..contents.len()).collect();
        (Just(contents), Just(order).prop_shuffle())
    })
}
