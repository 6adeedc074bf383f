//! Reducer-owned collection state.
//!
//! All local changes to the task and subtask lists go through
//! [`CollectionStore::dispatch`]. The drag engine, the reorder queues, and
//! the lifecycle glue never hold a mutable reference to the rows.

use parking_lot::RwLock;
use tasklane_proto::order::{Orderable, compute_reorder};

/// A change to a collection.
pub enum Action<T> {
    /// Replace the whole collection.
    Set(Vec<T>),
    /// Derive the next collection from the current one.
    Update(Box<dyn FnOnce(&[T]) -> Vec<T> + Send>),
}

impl<T> Action<T> {
    /// Wraps an updater function.
    pub fn update(f: impl FnOnce(&[T]) -> Vec<T> + Send + 'static) -> Self {
        Self::Update(Box::new(f))
    }
}

struct State<T> {
    items: Vec<T>,
    version: u64,
}

/// A shared, versioned list of entities.
pub struct CollectionStore<T> {
    state: RwLock<State<T>>,
}

impl<T: Clone> CollectionStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(State {
                items: Vec::new(),
                version: 0,
            }),
        }
    }

    /// Applies an action and bumps the version.
    pub fn dispatch(&self, action: Action<T>) {
        let mut state = self.state.write();
        state.items = match action {
            Action::Set(items) => items,
            Action::Update(f) => f(&state.items),
        };
        state.version += 1;
    }

    /// A copy of the current collection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.state.read().items.clone()
    }

    /// Number of dispatched actions so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }
}

impl<T: Clone> Default for CollectionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Orderable + Send + 'static> CollectionStore<T> {
    /// Looks up a row by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<T> {
        self.state
            .read()
            .items
            .iter()
            .find(|item| item.order_id() == id)
            .cloned()
    }

    /// Replaces the row with the same id, or appends it.
    pub fn upsert(&self, item: T) {
        self.dispatch(Action::update(move |items: &[T]| {
            let mut next = items.to_vec();
            match next.iter_mut().find(|i| i.order_id() == item.order_id()) {
                Some(slot) => *slot = item,
                None => next.push(item),
            }
            next
        }));
    }

    /// Drops the row with `id`.
    pub fn remove(&self, id: i64) {
        self.dispatch(Action::update(move |items: &[T]| {
            items.iter().filter(|i| i.order_id() != id).cloned().collect()
        }));
    }

    /// Moves `source` before `target` (or to the end) within `group`,
    /// computed against the rows current at the time of the call.
    ///
    /// Returns the group's new full order, or `None` if nothing moved; in
    /// that case the version is not bumped.
    pub fn reorder(&self, group: &T::Group, source: i64, target: Option<i64>) -> Option<Vec<i64>> {
        let mut state = self.state.write();
        let outcome = compute_reorder(&state.items, group, source, target);
        state.items = outcome.items?;
        state.version += 1;
        Some(outcome.order)
    }
}
