//! Property-based tests for the reorder computation.
//!
//! Uses proptest to verify:
//! 1. After a changed reorder, group keys equal `(position + 1) * STEP`.
//! 2. Dropping an item before its current successor never changes anything.
//! 3. Items outside the group are never modified.
//! 4. The reorder is a permutation of the previous group order.
//! 5. Head allocation always sorts before every existing key.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tasklane_proto::order::{
    STEP, allocate_head_key, compute_reorder, group_order, sort_key_for_position,
};
use tasklane_proto::task::{Priority, Task, TaskStatus};

/// Strategy for a status, biased towards a small set so groups collide.
fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        3 => Just(TaskStatus::Next),
        2 => Just(TaskStatus::Ongoing),
        1 => Just(TaskStatus::Finished),
    ]
}

/// Strategy for a collection of tasks with unique ids and valid key invariants.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec((arb_status(), -50i64..50, any::<bool>()), 0..12).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (status, key, deleted))| {
                let id = i64::try_from(i).unwrap_or_default() + 1;
                let orderable = status.is_orderable() && !deleted;
                Task {
                    id,
                    title: format!("task {id}"),
                    status,
                    priority: Priority::default(),
                    // Unique per id so the group order is total.
                    sort_index: orderable.then_some(key * 100 + id),
                    created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
                    deleted_at: deleted.then(|| Utc.timestamp_opt(1_800_000_000, 0).unwrap()),
                }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn changed_reorder_renumbers_group(
        tasks in arb_tasks(),
        source in 1i64..13,
        target in prop::option::of(1i64..13),
    ) {
        let outcome = compute_reorder(&tasks, &TaskStatus::Next, source, target);
        if let Some(items) = outcome.items {
            let order = group_order(&items, &TaskStatus::Next);
            prop_assert_eq!(&order, &outcome.order);
            for (position, id) in order.iter().enumerate() {
                let item = items.iter().find(|t| t.id == *id).unwrap();
                prop_assert_eq!(item.sort_index, Some(sort_key_for_position(position)));
            }
        } else {
            prop_assert!(!outcome.changed);
            prop_assert_eq!(outcome.order, outcome.previous_order);
        }
    }

    #[test]
    fn drop_before_successor_is_noop(tasks in arb_tasks(), pick in any::<prop::sample::Index>()) {
        let order = group_order(&tasks, &TaskStatus::Next);
        prop_assume!(order.len() >= 2);
        let i = pick.index(order.len() - 1);
        let outcome = compute_reorder(&tasks, &TaskStatus::Next, order[i], Some(order[i + 1]));
        prop_assert!(!outcome.changed);
    }

    #[test]
    fn other_groups_untouched(
        tasks in arb_tasks(),
        source in 1i64..13,
        target in prop::option::of(1i64..13),
    ) {
        let outcome = compute_reorder(&tasks, &TaskStatus::Next, source, target);
        if let Some(items) = outcome.items {
            for (before, after) in tasks.iter().zip(&items) {
                if before.status != TaskStatus::Next || before.deleted_at.is_some() {
                    prop_assert_eq!(before, after);
                }
            }
        }
    }

    #[test]
    fn reorder_is_permutation(
        tasks in arb_tasks(),
        source in 1i64..13,
        target in prop::option::of(1i64..13),
    ) {
        let outcome = compute_reorder(&tasks, &TaskStatus::Ongoing, source, target);
        let mut before = outcome.previous_order.clone();
        let mut after = outcome.order.clone();
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn head_key_precedes_all(keys in prop::collection::vec(-1000i64..1000, 0..20)) {
        let head = allocate_head_key(keys.iter().copied());
        prop_assert!(keys.iter().all(|&k| head < k));
        prop_assert_eq!(head % STEP == 0, keys.iter().min().is_none_or(|m| m % STEP == 0));
    }
}
