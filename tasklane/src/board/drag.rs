//! Drag-and-drop state machine shared by tasks and subtasks.
//!
//! The engine knows nothing about entity kinds. A [`DragAdapter`] supplies
//! the current rows, the draggability rule, and the two side effects of a
//! committed reorder: applying it to the local rows and handing the new
//! order to persistence. Cross-group drops never reorder; they come
//! back to the caller as [`DropOutcome::Transfer`] for the status-change path.
//!
//! Events are plain method calls, so any front end (terminal, GUI, tests)
//! can drive it.

use tasklane_proto::order::Orderable;

/// Group type of an adapter's items.
pub type GroupOf<A> = <<A as DragAdapter>::Item as Orderable>::Group;

/// Strategy injected into a [`DragEngine`].
pub trait DragAdapter {
    /// The entity being dragged.
    type Item: Orderable;

    /// Current rows, in any order.
    fn items(&self) -> Vec<Self::Item>;

    /// Whether a drag may start on `item`.
    fn is_draggable(&self, item: &Self::Item) -> bool;

    /// Moves `source` before `target` (or to the end) within `group`,
    /// recomputed against the current local rows. Returns the new full
    /// order, or `None` if nothing moved.
    fn apply_reorder(
        &self,
        group: &GroupOf<Self>,
        source: i64,
        target: Option<i64>,
    ) -> Option<Vec<i64>>;

    /// Persists the full order of `group`.
    fn persist_reorder(&self, group: &GroupOf<Self>, ordered_ids: Vec<i64>);
}

/// Whether the hovered element accepts the drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEffect {
    /// Dropping here moves the item.
    Move,
    /// Dropping here is disallowed.
    None,
}

/// Engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState<G> {
    /// No drag in progress.
    Idle,
    /// An item is being dragged within `group`.
    Dragging {
        /// The dragged item.
        item_id: i64,
        /// The group the drag is scoped to.
        group: G,
        /// The same-group item currently under the pointer.
        hover: Option<i64>,
    },
}

/// What a drop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome<G> {
    /// No drag was in progress.
    Ignored,
    /// The drop was legal but nothing moved, or it was rejected.
    Unchanged,
    /// The group was reordered, applied locally, and queued for persistence.
    Reordered {
        /// The reordered group.
        group: G,
        /// Its new full order.
        order: Vec<i64>,
    },
    /// The item was dropped on a different group.
    Transfer {
        /// The dragged item.
        item_id: i64,
        /// The destination group.
        to: G,
    },
}

/// Generic drag-and-drop engine.
pub struct DragEngine<A: DragAdapter> {
    adapter: A,
    state: DragState<GroupOf<A>>,
}

impl<A: DragAdapter> DragEngine<A> {
    /// Creates an idle engine.
    pub const fn new(adapter: A) -> Self {
        Self {
            adapter,
            state: DragState::Idle,
        }
    }

    /// The injected adapter.
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Current state.
    pub const fn state(&self) -> &DragState<GroupOf<A>> {
        &self.state
    }

    /// Whether a drag is in progress.
    pub const fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// The current hover target, if any.
    pub const fn hover(&self) -> Option<i64> {
        match &self.state {
            DragState::Dragging { hover, .. } => *hover,
            DragState::Idle => None,
        }
    }

    fn find(&self, id: i64) -> Option<A::Item> {
        self.adapter.items().into_iter().find(|i| i.order_id() == id)
    }

    /// Starts dragging `item_id`. Returns `false` and leaves the state alone
    /// if the item is unknown or not draggable.
    pub fn drag_start(&mut self, item_id: i64) -> bool {
        let Some(item) = self.find(item_id) else {
            return false;
        };
        let group = item.group();
        if !self.adapter.is_draggable(&item) || !item.is_eligible(&group) {
            tracing::trace!(item_id, "drag start ignored");
            return false;
        }
        self.state = DragState::Dragging {
            item_id,
            group,
            hover: None,
        };
        true
    }

    /// Pointer entered an item.
    pub fn drag_enter(&mut self, item_id: i64) -> DropEffect {
        self.drag_over(item_id)
    }

    /// Pointer is over an item. Only items of the dragged group accept the
    /// drop; anything else clears the hover target.
    pub fn drag_over(&mut self, item_id: i64) -> DropEffect {
        let target = self.find(item_id);
        let DragState::Dragging {
            item_id: source,
            group,
            hover,
        } = &mut self.state
        else {
            return DropEffect::None;
        };
        match target {
            Some(target) if target.is_eligible(group) => {
                *hover = (item_id != *source).then_some(item_id);
                DropEffect::Move
            }
            _ => {
                *hover = None;
                DropEffect::None
            }
        }
    }

    /// Pointer left an item. `still_inside` is true when it only moved
    /// between children of the same item.
    pub fn drag_leave(&mut self, item_id: i64, still_inside: bool) {
        if still_inside {
            return;
        }
        if let DragState::Dragging { hover, .. } = &mut self.state
            && *hover == Some(item_id)
        {
            *hover = None;
        }
    }

    /// Drops on an item: the dragged item moves to just before it.
    pub fn drop_on_item(&mut self, target_id: i64) -> DropOutcome<GroupOf<A>> {
        let DragState::Dragging { item_id, group, .. } = self.take() else {
            return DropOutcome::Ignored;
        };
        if item_id == target_id {
            return DropOutcome::Unchanged;
        }
        match self.find(target_id) {
            Some(target) if target.is_eligible(&group) => self.commit(item_id, group, Some(target_id)),
            _ => DropOutcome::Unchanged,
        }
    }

    /// Drops on empty space below the list of `active_group`: the dragged
    /// item moves to the end. Ignored for drags from another group.
    pub fn drop_on_container(&mut self, active_group: &GroupOf<A>) -> DropOutcome<GroupOf<A>> {
        let DragState::Dragging { item_id, group, .. } = self.take() else {
            return DropOutcome::Ignored;
        };
        if group != *active_group {
            return DropOutcome::Unchanged;
        }
        self.commit(item_id, group, None)
    }

    /// Pointer is over a whole group (e.g. a status tab).
    pub fn drag_over_group(&self, group: &GroupOf<A>) -> DropEffect {
        match &self.state {
            DragState::Dragging { group: from, .. } if from != group => DropEffect::Move,
            _ => DropEffect::None,
        }
    }

    /// Drops on a whole group. Legal only for a different group; the caller
    /// performs the transfer.
    pub fn drop_on_group(&mut self, group: &GroupOf<A>) -> DropOutcome<GroupOf<A>> {
        let DragState::Dragging { item_id, group: from, .. } = self.take() else {
            return DropOutcome::Ignored;
        };
        if from == *group {
            return DropOutcome::Unchanged;
        }
        DropOutcome::Transfer {
            item_id,
            to: group.clone(),
        }
    }

    /// Drag finished without a drop.
    pub fn drag_end(&mut self) {
        self.state = DragState::Idle;
    }

    /// External reset, e.g. the visible group changed.
    pub fn reset(&mut self) {
        self.state = DragState::Idle;
    }

    fn take(&mut self) -> DragState<GroupOf<A>> {
        std::mem::replace(&mut self.state, DragState::Idle)
    }

    fn commit(
        &self,
        source: i64,
        group: GroupOf<A>,
        target: Option<i64>,
    ) -> DropOutcome<GroupOf<A>> {
        let Some(order) = self.adapter.apply_reorder(&group, source, target) else {
            return DropOutcome::Unchanged;
        };
        tracing::debug!(source, ?target, ?group, "drop reordered group");
        self.adapter.persist_reorder(&group, order.clone());
        DropOutcome::Reordered { group, order }
    }
}
