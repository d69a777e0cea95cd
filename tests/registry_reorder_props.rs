// tests/registry_reorder_props.rs

use std::sync::Arc;

use proptest::prelude::*;

use gomander::errors::GomanderError;
use gomander::fs::mock::MockFileSystem;
use gomander::project::ProjectStore;
use gomander::registry::CommandRegistry;
use gomander_test_utils::builders::ProjectBuilder;

fn registry(n: usize) -> (Arc<MockFileSystem>, CommandRegistry) {
    let mut builder = ProjectBuilder::new("props");
    for i in 0..n {
        builder = builder.command(&format!("c{i}"), "true");
    }
    let project = builder.build();
    let fs = Arc::new(MockFileSystem::new());
    let store = ProjectStore::new(fs.clone(), "/data");
    store.save(&project).unwrap();
    (fs, CommandRegistry::new(project, store))
}

fn ids_by_position(reg: &CommandRegistry) -> Vec<String> {
    reg.ordered_commands().iter().map(|c| c.id.clone()).collect()
}

// A command count plus a shuffled prefix of its ids.
fn order_strategy() -> impl Strategy<Value = (usize, Vec<String>)> {
    (1..8usize).prop_flat_map(|n| {
        let ids: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
        (Just(ids).prop_shuffle(), 0..=n).prop_map(move |(shuffled, k)| {
            (n, shuffled.into_iter().take(k).collect())
        })
    })
}

proptest! {
    #[test]
    fn listed_ids_come_first_then_the_rest_in_old_order((n, order) in order_strategy()) {
        let (_fs, mut reg) = registry(n);
        let before = ids_by_position(&reg);

        reg.reorder_commands(&order).unwrap();
        let after = ids_by_position(&reg);

        let mut expected = order.clone();
        expected.extend(before.into_iter().filter(|id| !order.contains(id)));
        prop_assert_eq!(&after, &expected);

        let mut positions: Vec<u32> = reg.ordered_commands().iter().map(|c| c.position).collect();
        positions.sort();
        prop_assert_eq!(positions, (0..n as u32).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_order_changes_nothing((n, mut order) in order_strategy(), unknown in any::<bool>()) {
        let (_fs, mut reg) = registry(n);
        let before = reg.project().clone();

        if unknown || order.is_empty() {
            order.push("does-not-exist".to_string());
            prop_assert!(
                matches!(reg.reorder_commands(&order), Err(GomanderError::NotFound { .. })),
                "unknown ids are NotFound"
            );
        } else {
            order.push(order[0].clone());
            prop_assert!(
                matches!(reg.reorder_commands(&order), Err(GomanderError::Validation(_))),
                "duplicates are a validation error"
            );
        }
        prop_assert_eq!(reg.project(), &before);
    }

    #[test]
    fn failed_save_keeps_previous_order((n, order) in order_strategy()) {
        let (fs, mut reg) = registry(n);
        let before = ids_by_position(&reg);

        fs.set_fail_writes(true);
        let res = reg.reorder_commands(&order);
        prop_assert!(res.is_err());
        prop_assert_eq!(ids_by_position(&reg), before);
    }
}
