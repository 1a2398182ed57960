mod common;

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use teamforge_core::orchestration::{ArchiveTarget, ProcessStatus};
use teamforge_core::session::InMemoryDirectory;

/// Team ids for `count` items, with the indices in `missing` left unseeded
fn scenario(count: usize, missing: &HashSet<usize>) -> (Arc<InMemoryDirectory>, Vec<ArchiveTarget>) {
    let directory = Arc::new(InMemoryDirectory::new());
    let targets = (0..count)
        .map(|i| {
            let id = format!("team-{i:03}");
            if !missing.contains(&i) {
                directory.seed_team(&id, "Class");
            }
            ArchiveTarget::new(id)
        })
        .collect();
    (directory, targets)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: every submitted item ends up in exactly one outcome list
    #[test]
    fn every_item_has_exactly_one_outcome(
        count in 0usize..40,
        missing in proptest::collection::hash_set(0usize..40, 0..10),
        batch_size in 1usize..8,
        max_concurrency in 1usize..4,
        continue_on_error in any::<bool>(),
        acceptable in 0.0f64..=100.0,
    ) {
        let result = tokio_test::block_on(async {
            let (directory, targets) = scenario(count, &missing);
            let orchestrator = orchestrator(directory);
            let options = options()
                .with_batch_size(batch_size)
                .with_max_concurrency(max_concurrency)
                .with_continue_on_error(continue_on_error)
                .with_acceptable_error_percentage(acceptable);
            let process_id = orchestrator
                .start_team_archival(targets, &token(), options, ADMIN)
                .await
                .unwrap();
            orchestrator.wait_for_completion(process_id).await.unwrap()
        });

        let expected_failures = missing.iter().filter(|i| **i < count).count();
        prop_assert_eq!(result.outcome_count(), count);
        prop_assert_eq!(result.summary.total, count);
        prop_assert!(result.errors.len() <= expected_failures);

        let mut seen = HashSet::new();
        for id in result
            .successes
            .iter()
            .map(|s| &s.entity_id)
            .chain(result.errors.iter().map(|e| &e.entity_id))
            .chain(result.skipped.iter().map(|s| &s.entity_id))
        {
            prop_assert!(seen.insert(id.clone()), "duplicate outcome for {}", id);
        }

        if expected_failures == 0 {
            prop_assert_eq!(result.status, ProcessStatus::Completed);
            prop_assert!(result.skipped.is_empty());
        }
        if result.status.is_success() {
            prop_assert!(result.skipped.is_empty());
            prop_assert!(result.summary.failure_percentage <= acceptable);
        }
    }
}
