//! Lifecycle glue: optimistic local state reconciled with the server.
//!
//! The local collections are a cache. Every successful mutation overwrites
//! the affected row with the server's copy; every failure discards local
//! state, reloads from the server, and emits a [`BoardWarning`].

use std::sync::Arc;
use std::time::Duration;

use tasklane_proto::api::{CreateTaskRequest, ReorderTasksRequest, UpdateTaskRequest};
use tasklane_proto::order::{Orderable, allocate_head_key, group_order};
use tasklane_proto::task::{Priority, Subtask, Task, TaskStatus, fallback_cmp};
use tokio::sync::mpsc;

use super::drag::{DragAdapter, DragEngine, DropOutcome};
use super::queue::{ReorderPayload, ReorderQueue, ReorderSink};
use super::store::{Action, CollectionStore};
use crate::api::{ClientError, TaskApi};

/// Warning surfaced to the user after a failed server call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardWarning {
    /// A reorder was rejected; the affected collection was reloaded.
    ReorderFailed {
        /// Human-readable group, e.g. `status next`.
        scope: String,
        /// Description of the error.
        reason: String,
    },
    /// A lifecycle request failed; the collection was reloaded.
    RequestFailed {
        /// The operation that failed.
        operation: &'static str,
        /// Description of the error.
        reason: String,
    },
    /// Reloading after a failure failed too; local state may be stale.
    ReloadFailed {
        /// Description of the error.
        reason: String,
    },
}

impl std::fmt::Display for BoardWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReorderFailed { scope, reason } => {
                write!(f, "could not save order of {scope}: {reason}")
            }
            Self::RequestFailed { operation, reason } => write!(f, "{operation} failed: {reason}"),
            Self::ReloadFailed { reason } => write!(f, "reload failed: {reason}"),
        }
    }
}

/// Tunables for a [`Board`].
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Delay before each reorder send.
    pub reorder_debounce: Duration,
    /// Capacity of the warning channel.
    pub warning_buffer: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            reorder_debounce: Duration::ZERO,
            warning_buffer: 32,
        }
    }
}

/// State shared between the board, its sinks, and its drag adapters.
struct Shared<A> {
    api: A,
    tasks: CollectionStore<Task>,
    subtasks: CollectionStore<Subtask>,
    warning_tx: mpsc::Sender<BoardWarning>,
}

impl<A: TaskApi> Shared<A> {
    fn warn(&self, warning: BoardWarning) {
        tracing::warn!(%warning, "board warning");
        // Best-effort: a full channel drops the warning.
        let _ = self.warning_tx.try_send(warning);
    }

    async fn reload_tasks(&self) -> Result<(), ClientError> {
        let tasks = self.api.list_tasks().await?;
        tracing::debug!(count = tasks.len(), "tasks reloaded");
        self.tasks.dispatch(Action::Set(tasks));
        Ok(())
    }

    async fn reload_subtasks(&self, task_id: i64) -> Result<(), ClientError> {
        let fresh = self.api.list_subtasks(task_id).await?;
        self.subtasks.dispatch(Action::update(move |items: &[Subtask]| {
            items
                .iter()
                .filter(|s| s.task_id != task_id)
                .cloned()
                .chain(fresh)
                .collect()
        }));
        Ok(())
    }

    /// Reloads tasks after `error` and surfaces both.
    async fn fail(&self, operation: &'static str, error: &ClientError) {
        self.warn(BoardWarning::RequestFailed {
            operation,
            reason: error.to_string(),
        });
        if let Err(e) = self.reload_tasks().await {
            self.warn(BoardWarning::ReloadFailed {
                reason: e.to_string(),
            });
        }
    }

    async fn fail_subtasks(&self, operation: &'static str, task_id: i64, error: &ClientError) {
        self.warn(BoardWarning::RequestFailed {
            operation,
            reason: error.to_string(),
        });
        if let Err(e) = self.reload_subtasks(task_id).await {
            self.warn(BoardWarning::ReloadFailed {
                reason: e.to_string(),
            });
        }
    }
}

/// Sends task orders for one status group.
pub struct TaskOrderSink<A> {
    shared: Arc<Shared<A>>,
}

impl<A: TaskApi + 'static> ReorderSink for TaskOrderSink<A> {
    type Group = TaskStatus;

    async fn send(&self, payload: &ReorderPayload<TaskStatus>) -> Result<(), ClientError> {
        let request = ReorderTasksRequest {
            status: payload.group,
            ordered_task_ids: payload.ordered_ids.clone(),
        };
        self.shared.api.reorder_tasks(&request).await.map(|_| ())
    }

    /// One reload covers every status, discarded ones included.
    async fn recover(&self, group: &TaskStatus, discarded: &[TaskStatus], error: ClientError) {
        tracing::debug!(?discarded, "dropping unsent task orders");
        self.shared.warn(BoardWarning::ReorderFailed {
            scope: format!("status {group}"),
            reason: error.to_string(),
        });
        if let Err(e) = self.shared.reload_tasks().await {
            self.shared.warn(BoardWarning::ReloadFailed {
                reason: e.to_string(),
            });
        }
    }
}

/// Sends subtask orders for one owning task.
pub struct SubtaskOrderSink<A> {
    shared: Arc<Shared<A>>,
}

impl<A: TaskApi + 'static> ReorderSink for SubtaskOrderSink<A> {
    type Group = i64;

    async fn send(&self, payload: &ReorderPayload<i64>) -> Result<(), ClientError> {
        self.shared
            .api
            .reorder_subtasks(payload.group, &payload.ordered_ids)
            .await
            .map(|_| ())
    }

    async fn recover(&self, task_id: &i64, discarded: &[i64], error: ClientError) {
        self.shared.warn(BoardWarning::ReorderFailed {
            scope: format!("subtasks of task {task_id}"),
            reason: error.to_string(),
        });
        let mut owners = vec![*task_id];
        for owner in discarded {
            if !owners.contains(owner) {
                owners.push(*owner);
            }
        }
        for owner in owners {
            if let Err(e) = self.shared.reload_subtasks(owner).await {
                self.shared.warn(BoardWarning::ReloadFailed {
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Drag adapter over the board's tasks.
pub struct TaskDrag<A: TaskApi + 'static> {
    shared: Arc<Shared<A>>,
    queue: ReorderQueue<TaskOrderSink<A>>,
}

impl<A: TaskApi + 'static> DragAdapter for TaskDrag<A> {
    type Item = Task;

    fn items(&self) -> Vec<Task> {
        self.shared.tasks.snapshot()
    }

    fn is_draggable(&self, item: &Task) -> bool {
        item.is_orderable()
    }

    fn apply_reorder(&self, group: &TaskStatus, source: i64, target: Option<i64>) -> Option<Vec<i64>> {
        self.shared.tasks.reorder(group, source, target)
    }

    fn persist_reorder(&self, group: &TaskStatus, ordered_ids: Vec<i64>) {
        self.queue.submit(*group, ordered_ids);
    }
}

/// Drag adapter over the board's subtasks.
pub struct SubtaskDrag<A: TaskApi + 'static> {
    shared: Arc<Shared<A>>,
    queue: ReorderQueue<SubtaskOrderSink<A>>,
}

impl<A: TaskApi + 'static> DragAdapter for SubtaskDrag<A> {
    type Item = Subtask;

    fn items(&self) -> Vec<Subtask> {
        self.shared.subtasks.snapshot()
    }

    fn is_draggable(&self, item: &Subtask) -> bool {
        !item.is_deleted()
    }

    fn apply_reorder(&self, task_id: &i64, source: i64, target: Option<i64>) -> Option<Vec<i64>> {
        self.shared.subtasks.reorder(task_id, source, target)
    }

    fn persist_reorder(&self, task_id: &i64, ordered_ids: Vec<i64>) {
        self.queue.submit(*task_id, ordered_ids);
    }
}

/// Client-side task board.
pub struct Board<A: TaskApi + 'static> {
    shared: Arc<Shared<A>>,
    task_queue: ReorderQueue<TaskOrderSink<A>>,
    subtask_queue: ReorderQueue<SubtaskOrderSink<A>>,
}

impl<A: TaskApi + 'static> Board<A> {
    /// Creates an empty board over `api`.
    ///
    /// Returns the board and a receiver for [`BoardWarning`] events.
    #[must_use]
    pub fn new(api: A, config: &BoardConfig) -> (Self, mpsc::Receiver<BoardWarning>) {
        let (warning_tx, warning_rx) = mpsc::channel(config.warning_buffer.max(1));
        let shared = Arc::new(Shared {
            api,
            tasks: CollectionStore::new(),
            subtasks: CollectionStore::new(),
            warning_tx,
        });
        let task_queue = ReorderQueue::new(
            TaskOrderSink {
                shared: Arc::clone(&shared),
            },
            config.reorder_debounce,
        );
        let subtask_queue = ReorderQueue::new(
            SubtaskOrderSink {
                shared: Arc::clone(&shared),
            },
            config.reorder_debounce,
        );
        let board = Self {
            shared,
            task_queue,
            subtask_queue,
        };
        (board, warning_rx)
    }

    /// The API client.
    pub fn api(&self) -> &A {
        &self.shared.api
    }

    /// The task reorder queue.
    pub const fn task_queue(&self) -> &ReorderQueue<TaskOrderSink<A>> {
        &self.task_queue
    }

    /// The subtask reorder queue.
    pub const fn subtask_queue(&self) -> &ReorderQueue<SubtaskOrderSink<A>> {
        &self.subtask_queue
    }

    /// Number of local task state changes so far.
    pub fn task_version(&self) -> u64 {
        self.shared.tasks.version()
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Every cached task.
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.tasks.snapshot()
    }

    /// A cached task.
    pub fn task(&self, id: i64) -> Option<Task> {
        self.shared.tasks.get(id)
    }

    /// Live tasks of `status` in display order.
    ///
    /// Orderable statuses sort by key; `finished` falls back to priority and
    /// recency.
    pub fn column(&self, status: TaskStatus) -> Vec<Task> {
        let tasks = self.shared.tasks.snapshot();
        if status.is_orderable() {
            return group_order(&tasks, &status)
                .into_iter()
                .filter_map(|id| tasks.iter().find(|t| t.id == id).cloned())
                .collect();
        }
        let mut column: Vec<Task> = tasks
            .into_iter()
            .filter(|t| t.status == status && !t.is_deleted())
            .collect();
        column.sort_by(fallback_cmp);
        column
    }

    /// Soft-deleted tasks, by priority then recency.
    pub fn trash(&self) -> Vec<Task> {
        let mut trash: Vec<Task> = self
            .shared
            .tasks
            .snapshot()
            .into_iter()
            .filter(Task::is_deleted)
            .collect();
        trash.sort_by(fallback_cmp);
        trash
    }

    /// Live subtasks of `task_id` in display order.
    pub fn subtasks(&self, task_id: i64) -> Vec<Subtask> {
        let subtasks = self.shared.subtasks.snapshot();
        group_order(&subtasks, &task_id)
            .into_iter()
            .filter_map(|id| subtasks.iter().find(|s| s.id == id).cloned())
            .collect()
    }

    /// Every cached subtask of `task_id`, deleted ones included.
    pub fn all_subtasks(&self, task_id: i64) -> Vec<Subtask> {
        self.shared
            .subtasks
            .snapshot()
            .into_iter()
            .filter(|s| s.task_id == task_id)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replaces the cached tasks with the server's.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the list call; the cache is untouched.
    pub async fn reload(&self) -> Result<(), ClientError> {
        self.shared.reload_tasks().await
    }

    /// Replaces the cached subtasks of `task_id` with the server's.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the list call.
    pub async fn load_subtasks(&self, task_id: i64) -> Result<(), ClientError> {
        self.shared.reload_subtasks(task_id).await
    }

    /// Waits until both reorder queues are idle.
    pub async fn settle(&self) {
        self.task_queue.wait_idle().await;
        self.subtask_queue.wait_idle().await;
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    /// A drag engine over this board's tasks.
    pub fn task_drag(&self) -> DragEngine<TaskDrag<A>> {
        DragEngine::new(TaskDrag {
            shared: Arc::clone(&self.shared),
            queue: self.task_queue.clone(),
        })
    }

    /// A drag engine over this board's subtasks.
    pub fn subtask_drag(&self) -> DragEngine<SubtaskDrag<A>> {
        DragEngine::new(SubtaskDrag {
            shared: Arc::clone(&self.shared),
            queue: self.subtask_queue.clone(),
        })
    }

    /// Moves a task before `before` (or to the end) within its status.
    ///
    /// Applies the new order locally and queues it. Returns whether anything
    /// moved.
    pub fn move_task(&self, id: i64, before: Option<i64>) -> bool {
        let Some(status) = self.shared.tasks.get(id).map(|t| t.status) else {
            return false;
        };
        let Some(order) = self.shared.tasks.reorder(&status, id, before) else {
            return false;
        };
        self.task_queue.submit(status, order);
        true
    }

    /// Moves a subtask before `before` (or to the end) within its task.
    pub fn move_subtask(&self, id: i64, before: Option<i64>) -> bool {
        let Some(task_id) = self.shared.subtasks.get(id).map(|s| s.task_id) else {
            return false;
        };
        let Some(order) = self.shared.subtasks.reorder(&task_id, id, before) else {
            return false;
        };
        self.subtask_queue.submit(task_id, order);
        true
    }

    /// Completes a task drop: transfers go through [`Self::change_status`].
    ///
    /// # Errors
    ///
    /// Returns the status change's error, after the board has reloaded.
    pub async fn complete_drop(&self, outcome: DropOutcome<TaskStatus>) -> Result<(), ClientError> {
        if let DropOutcome::Transfer { item_id, to } = outcome {
            self.change_status(item_id, to).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Creates a task and caches the server's copy.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn create_task(
        &self,
        title: &str,
        status: Option<TaskStatus>,
        priority: Option<Priority>,
    ) -> Result<Task, ClientError> {
        let request = CreateTaskRequest {
            title: title.to_string(),
            status,
            priority: priority.map(i64::from),
        };
        match self.shared.api.create_task(&request).await {
            Ok(task) => {
                self.shared.tasks.upsert(task.clone());
                Ok(task)
            }
            Err(e) => {
                self.shared.fail("create task", &e).await;
                Err(e)
            }
        }
    }

    /// Edits title and/or priority.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn update_task(
        &self,
        id: i64,
        title: Option<&str>,
        priority: Option<Priority>,
    ) -> Result<Task, ClientError> {
        let request = UpdateTaskRequest {
            title: title.map(str::to_string),
            priority: priority.map(i64::from),
        };
        match self.shared.api.update_task(id, &request).await {
            Ok(task) => {
                self.shared.tasks.upsert(task.clone());
                Ok(task)
            }
            Err(e) => {
                self.shared.fail("update task", &e).await;
                Err(e)
            }
        }
    }

    /// Moves a task to another status.
    ///
    /// The local row first takes a guessed key (head of the destination, or
    /// none for `finished`); the server's row then replaces the guess.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn change_status(&self, id: i64, status: TaskStatus) -> Result<Task, ClientError> {
        self.shared.tasks.dispatch(Action::update(move |items: &[Task]| {
            let guess = status.is_orderable().then(|| {
                allocate_head_key(
                    items
                        .iter()
                        .filter(|t| t.id != id && t.is_eligible(&status))
                        .filter_map(|t| t.sort_index),
                )
            });
            items
                .iter()
                .map(|t| {
                    let mut t = t.clone();
                    if t.id == id {
                        t.status = status;
                        t.sort_index = guess;
                    }
                    t
                })
                .collect()
        }));

        match self.shared.api.change_status(id, status).await {
            Ok(task) => {
                tracing::debug!(task_id = id, status = %status, sort_index = ?task.sort_index, "status change confirmed");
                self.shared.tasks.upsert(task.clone());
                Ok(task)
            }
            Err(e) => {
                self.shared.fail("change status", &e).await;
                Err(e)
            }
        }
    }

    /// Soft-deletes a task.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn delete_task(&self, id: i64) -> Result<Task, ClientError> {
        match self.shared.api.delete_task(id).await {
            Ok(task) => {
                self.shared.tasks.upsert(task.clone());
                Ok(task)
            }
            Err(e) => {
                self.shared.fail("delete task", &e).await;
                Err(e)
            }
        }
    }

    /// Restores a soft-deleted task to the head of its status.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn restore_task(&self, id: i64) -> Result<Task, ClientError> {
        match self.shared.api.restore_task(id).await {
            Ok(task) => {
                self.shared.tasks.upsert(task.clone());
                Ok(task)
            }
            Err(e) => {
                self.shared.fail("restore task", &e).await;
                Err(e)
            }
        }
    }

    /// Removes a task and its cached subtasks.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn purge_task(&self, id: i64) -> Result<(), ClientError> {
        match self.shared.api.purge_task(id).await {
            Ok(()) => {
                self.shared.tasks.remove(id);
                self.shared.subtasks.dispatch(Action::update(move |items: &[Subtask]| {
                    items.iter().filter(|s| s.task_id != id).cloned().collect()
                }));
                Ok(())
            }
            Err(e) => {
                self.shared.fail("purge task", &e).await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Subtask lifecycle
    // -----------------------------------------------------------------------

    /// Creates a subtask at the head of its task.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading the task's subtasks.
    pub async fn create_subtask(&self, task_id: i64, title: &str) -> Result<Subtask, ClientError> {
        match self.shared.api.create_subtask(task_id, title).await {
            Ok(subtask) => {
                self.shared.subtasks.upsert(subtask.clone());
                Ok(subtask)
            }
            Err(e) => {
                self.shared.fail_subtasks("create subtask", task_id, &e).await;
                Err(e)
            }
        }
    }

    /// Soft-deletes a subtask.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn delete_subtask(&self, id: i64) -> Result<Subtask, ClientError> {
        let owner = self.shared.subtasks.get(id).map(|s| s.task_id);
        match self.shared.api.delete_subtask(id).await {
            Ok(subtask) => {
                self.shared.subtasks.upsert(subtask.clone());
                Ok(subtask)
            }
            Err(e) => {
                self.subtask_failure("delete subtask", owner, &e).await;
                Err(e)
            }
        }
    }

    /// Restores a soft-deleted subtask to the head of its task.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn restore_subtask(&self, id: i64) -> Result<Subtask, ClientError> {
        let owner = self.shared.subtasks.get(id).map(|s| s.task_id);
        match self.shared.api.restore_subtask(id).await {
            Ok(subtask) => {
                self.shared.subtasks.upsert(subtask.clone());
                Ok(subtask)
            }
            Err(e) => {
                self.subtask_failure("restore subtask", owner, &e).await;
                Err(e)
            }
        }
    }

    /// Removes a subtask for good.
    ///
    /// # Errors
    ///
    /// Returns the server's error after reloading.
    pub async fn purge_subtask(&self, id: i64) -> Result<(), ClientError> {
        let owner = self.shared.subtasks.get(id).map(|s| s.task_id);
        match self.shared.api.purge_subtask(id).await {
            Ok(()) => {
                self.shared.subtasks.remove(id);
                Ok(())
            }
            Err(e) => {
                self.subtask_failure("purge subtask", owner, &e).await;
                Err(e)
            }
        }
    }

    async fn subtask_failure(&self, operation: &'static str, owner: Option<i64>, error: &ClientError) {
        match owner {
            Some(task_id) => self.shared.fail_subtasks(operation, task_id, error).await,
            None => self.shared.warn(BoardWarning::RequestFailed {
                operation,
                reason: error.to_string(),
            }),
        }
    }
}
