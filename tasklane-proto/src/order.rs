//! Pure reorder computation shared by tasks and subtasks.
//!
//! The same functions drive tasks-within-status and subtasks-within-task;
//! the entity specifics are injected through [`Orderable`]. Nothing here
//! performs I/O, and nothing here fails for data-shape reasons: missing ids
//! and tiny groups produce an unchanged [`ReorderOutcome`].

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::task::{Subtask, Task, TaskStatus};

/// Gap between consecutive sort keys after a full renumbering.
pub const STEP: i64 = 10;

/// An item that lives in an ordering group.
pub trait Orderable: Clone {
    /// The ordering scope (a status for tasks, an owning task for subtasks).
    type Group: Clone + Eq + Debug;

    /// Stable identifier.
    fn order_id(&self) -> i64;

    /// The group this item currently belongs to.
    fn group(&self) -> Self::Group;

    /// Whether this item takes part in the ordering of `group`.
    fn is_eligible(&self, group: &Self::Group) -> bool;

    /// Current sort key.
    fn sort_index(&self) -> Option<i64>;

    /// Replaces the sort key.
    fn set_sort_index(&mut self, sort_index: Option<i64>);
}

impl Orderable for Task {
    type Group = TaskStatus;

    fn order_id(&self) -> i64 {
        self.id
    }

    fn group(&self) -> TaskStatus {
        self.status
    }

    fn is_eligible(&self, group: &TaskStatus) -> bool {
        self.status == *group && self.is_orderable()
    }

    fn sort_index(&self) -> Option<i64> {
        self.sort_index
    }

    fn set_sort_index(&mut self, sort_index: Option<i64>) {
        self.sort_index = sort_index;
    }
}

impl Orderable for Subtask {
    type Group = i64;

    fn order_id(&self) -> i64 {
        self.id
    }

    fn group(&self) -> i64 {
        self.task_id
    }

    fn is_eligible(&self, group: &i64) -> bool {
        self.task_id == *group && !self.is_deleted()
    }

    fn sort_index(&self) -> Option<i64> {
        self.sort_index
    }

    fn set_sort_index(&mut self, sort_index: Option<i64>) {
        self.sort_index = sort_index;
    }
}

/// The key for a zero-based display position: `(position + 1) * STEP`.
#[must_use]
pub fn sort_key_for_position(position: usize) -> i64 {
    i64::try_from(position)
        .unwrap_or(i64::MAX)
        .saturating_add(1)
        .saturating_mul(STEP)
}

/// The key that places a new item before every existing key.
///
/// An empty group yields `0`; otherwise one `STEP` below the current minimum.
pub fn allocate_head_key(existing: impl IntoIterator<Item = i64>) -> i64 {
    existing.into_iter().min().unwrap_or(STEP) - STEP
}

/// Ids of the eligible members of `group`, in display order.
///
/// Members are sorted by sort key ascending; members without a key go last.
/// The sort is stable, so ties keep collection order.
pub fn group_order<T: Orderable>(items: &[T], group: &T::Group) -> Vec<i64> {
    let mut members: Vec<&T> = items.iter().filter(|i| i.is_eligible(group)).collect();
    members.sort_by_key(|i| (i.sort_index().is_none(), i.sort_index()));
    members.iter().map(|i| i.order_id()).collect()
}

/// Moves `source` to sit immediately before `target`.
///
/// A `None` or unknown target appends `source` at the end. An unknown
/// source returns the order unchanged.
#[must_use]
pub fn move_before(order: &[i64], source: i64, target: Option<i64>) -> Vec<i64> {
    if !order.contains(&source) {
        return order.to_vec();
    }
    let mut next: Vec<i64> = order.iter().copied().filter(|&id| id != source).collect();
    let insert_at = target
        .and_then(|t| next.iter().position(|&id| id == t))
        .unwrap_or(next.len());
    next.insert(insert_at, source);
    next
}

/// Result of [`compute_reorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderOutcome<T> {
    /// Group order before the move.
    pub previous_order: Vec<i64>,
    /// Group order after the move (equal to `previous_order` when unchanged).
    pub order: Vec<i64>,
    /// Whether any member changed position.
    pub changed: bool,
    /// New key per group member. Empty when unchanged.
    pub sort_keys: BTreeMap<i64, i64>,
    /// The full collection with new keys applied. `None` when unchanged.
    pub items: Option<Vec<T>>,
}

impl<T> ReorderOutcome<T> {
    fn unchanged(order: Vec<i64>) -> Self {
        Self {
            previous_order: order.clone(),
            order,
            changed: false,
            sort_keys: BTreeMap::new(),
            items: None,
        }
    }
}

/// Computes the new order after moving `source_id` before `target_id`.
///
/// `target_id = None` moves the source to the end of the group. Items outside
/// the group are carried through untouched.
pub fn compute_reorder<T: Orderable>(
    items: &[T],
    group: &T::Group,
    source_id: i64,
    target_id: Option<i64>,
) -> ReorderOutcome<T> {
    let previous = group_order(items, group);

    if previous.len() < 2 || !previous.contains(&source_id) || target_id == Some(source_id) {
        return ReorderOutcome::unchanged(previous);
    }

    let order = move_before(&previous, source_id, target_id);
    if order == previous {
        return ReorderOutcome::unchanged(previous);
    }

    let sort_keys: BTreeMap<i64, i64> = order
        .iter()
        .enumerate()
        .map(|(position, &id)| (id, sort_key_for_position(position)))
        .collect();

    let updated = items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if item.is_eligible(group) {
                if let Some(&key) = sort_keys.get(&item.order_id()) {
                    item.set_sort_index(Some(key));
                }
            }
            item
        })
        .collect();

    ReorderOutcome {
        previous_order: previous,
        order,
        changed: true,
        sort_keys,
        items: Some(updated),
    }
}
