//! Property tests for the reconciliation engine.

use msgcache_core::{PartitionLog, Reconciler, DEFAULT_PENDING_TTL};
use msgcache_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;

const P: PartitionId = PartitionId(7);

fn is_sorted(entries: &[Entry]) -> bool {
    entries
        .windows(2)
        .all(|pair| pair[0].order_cmp(&pair[1]).is_le())
}

proptest! {
    #[test]
    fn reapplying_a_batch_changes_nothing(
        batch in confirmed_batch_strategy(P, 20),
        repeats in 1usize..4,
    ) {
        let reconciler = Reconciler::new();
        let mut once = PartitionLog::new(P, DEFAULT_PENDING_TTL);
        reconciler.reconcile(&mut once, &batch, 0);

        let mut many = PartitionLog::new(P, DEFAULT_PENDING_TTL);
        for _ in 0..repeats {
            reconciler.reconcile(&mut many, &batch, 0);
        }
        prop_assert_eq!(once.sorted_entries(), many.sorted_entries());

        let again = reconciler.reconcile(&mut many, &batch, 0);
        prop_assert!(again.is_noop());
    }

    #[test]
    fn snapshot_is_always_ordered(
        batches in prop::collection::vec(confirmed_batch_strategy(P, 10), 1..5),
    ) {
        let reconciler = Reconciler::new();
        let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);
        for batch in &batches {
            reconciler.reconcile(&mut log, batch, 0);
            prop_assert!(is_sorted(&log.snapshot()));
        }
    }

    #[test]
    fn each_confirmed_id_is_stored_once(
        (contents, order) in write_echo_script_strategy(12),
    ) {
        let reconciler = Reconciler::new();
        let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);

        let drafts: Vec<Entry> = contents
            .iter()
            .enumerate()
            .map(|(n, content)| {
                let n = i64::try_from(n).unwrap();
                text_entry(-(n + 1), P, content)
                    .with_position((n + 1) as f64)
                    .with_created_at(n)
            })
            .collect();
        for draft in &drafts {
            log.insert_tentative(draft.clone(), 100).unwrap();
        }

        for &index in &order {
            let id = 1_000 + i64::try_from(index).unwrap();
            let echo = confirm(&drafts[index], id, u64::try_from(id).unwrap());
            reconciler.reconcile(&mut log, &[echo.clone()], 200);
            // at-least-once delivery
            reconciler.reconcile(&mut log, &[echo], 200);
        }

        let snapshot = log.snapshot();
        prop_assert_eq!(snapshot.len(), drafts.len());
        let ids: HashSet<EntryId> = snapshot.iter().map(|e| e.id).collect();
        prop_assert_eq!(ids.len(), drafts.len());
        prop_assert!(snapshot.iter().all(|e| e.id.is_confirmed()));
        prop_assert!(log.index().is_empty());
    }

    #[test]
    fn absent_fields_survive_merge(
        original in confirmed_entry_strategy(P),
        new_content in content_strategy(),
    ) {
        let reconciler = Reconciler::new();
        let mut log = PartitionLog::new(P, DEFAULT_PENDING_TTL);
        reconciler.reconcile(&mut log, &[original.clone()], 0);

        let partial = Entry::new(original.id, P).with_content(new_content.clone());
        reconciler.reconcile(&mut log, &[partial], 0);

        let stored = log.get(original.id).unwrap();
        prop_assert_eq!(stored.content.as_deref(), Some(new_content.as_str()));
        prop_assert_eq!(stored.sequence, original.sequence);
        prop_assert_eq!(stored.position, original.position);
        prop_assert_eq!(&stored.annotations, &original.annotations);
        prop_assert_eq!(stored.kind, original.kind);
    }
}
