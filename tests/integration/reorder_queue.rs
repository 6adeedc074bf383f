//! Integration tests for latest-wins reorder persistence.
//!
//! A counting wrapper around the HTTP client observes exactly which
//! requests reach the live server:
//! - Bursts before the first send collapse into one request
//! - Payloads submitted during a send wait, one per status
//! - A failed send reloads exactly once and is not retried
//! - Payloads queued behind a failed send are discarded with it

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tasklane::api::{ClientError, HttpTaskApi, TaskApi};
use tasklane::board::{Board, BoardConfig, BoardWarning};
use tasklane_proto::api::{CreateTaskRequest, ReorderResponse, ReorderTasksRequest, UpdateTaskRequest};
use tasklane_proto::task::{Subtask, Task, TaskStatus};
use tokio::sync::Semaphore;

async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = tasklane_server::routes::start_memory_server()
        .await
        .expect("failed to start server");
    (format!("http://{addr}"), handle)
}

/// Delegates to the server, recording reorder traffic and list calls.
struct Counting {
    inner: HttpTaskApi,
    reorders: Mutex<Vec<Vec<i64>>>,
    subtask_reorders: Mutex<Vec<Vec<i64>>>,
    lists: AtomicUsize,
    fail_reorders: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl Counting {
    fn new(url: &str, gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            inner: HttpTaskApi::new(url, Duration::from_secs(5)).unwrap(),
            reorders: Mutex::new(Vec::new()),
            subtask_reorders: Mutex::new(Vec::new()),
            lists: AtomicUsize::new(0),
            fail_reorders: AtomicBool::new(false),
            gate,
        }
    }
}

impl TaskApi for Counting {
    async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_tasks().await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, ClientError> {
        self.inner.create_task(request).await
    }

    async fn update_task(&self, id: i64, request: &UpdateTaskRequest) -> Result<Task, ClientError> {
        self.inner.update_task(id, request).await
    }

    async fn reorder_tasks(&self, request: &ReorderTasksRequest) -> Result<ReorderResponse, ClientError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.reorders.lock().push(request.ordered_task_ids.clone());
        if self.fail_reorders.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        self.inner.reorder_tasks(request).await
    }

    async fn change_status(&self, id: i64, status: TaskStatus) -> Result<Task, ClientError> {
        self.inner.change_status(id, status).await
    }

    async fn restore_task(&self, id: i64) -> Result<Task, ClientError> {
        self.inner.restore_task(id).await
    }

    async fn delete_task(&self, id: i64) -> Result<Task, ClientError> {
        self.inner.delete_task(id).await
    }

    async fn purge_task(&self, id: i64) -> Result<(), ClientError> {
        self.inner.purge_task(id).await
    }

    async fn list_subtasks(&self, task_id: i64) -> Result<Vec<Subtask>, ClientError> {
        self.inner.list_subtasks(task_id).await
    }

    async fn create_subtask(&self, task_id: i64, title: &str) -> Result<Subtask, ClientError> {
        self.inner.create_subtask(task_id, title).await
    }

    async fn reorder_subtasks(&self, task_id: i64, ordered_ids: &[i64]) -> Result<ReorderResponse, ClientError> {
        self.subtask_reorders.lock().push(ordered_ids.to_vec());
        self.inner.reorder_subtasks(task_id, ordered_ids).await
    }

    async fn restore_subtask(&self, id: i64) -> Result<Subtask, ClientError> {
        self.inner.restore_subtask(id).await
    }

    async fn delete_subtask(&self, id: i64) -> Result<Subtask, ClientError> {
        self.inner.delete_subtask(id).await
    }

    async fn purge_subtask(&self, id: i64) -> Result<(), ClientError> {
        self.inner.purge_subtask(id).await
    }
}

/// Board with three `next` tasks displayed as `[a, b, c]` (keys 10, 20, 30).
async fn seeded_board(
    url: &str,
    gate: Option<Arc<Semaphore>>,
) -> (Board<Counting>, tokio::sync::mpsc::Receiver<BoardWarning>, [i64; 3]) {
    let (board, rx) = Board::new(Counting::new(url, gate), &BoardConfig::default());
    let c = board.create_task("c", Some(TaskStatus::Next), None).await.unwrap();
    let b = board.create_task("b", Some(TaskStatus::Next), None).await.unwrap();
    let a = board.create_task("a", Some(TaskStatus::Next), None).await.unwrap();
    let ids = [a.id, b.id, c.id];
    board
        .api()
        .inner
        .reorder_tasks(&ReorderTasksRequest {
            status: TaskStatus::Next,
            ordered_task_ids: ids.to_vec(),
        })
        .await
        .unwrap();
    board.reload().await.unwrap();
    (board, rx, ids)
}

fn column_ids(board: &Board<Counting>) -> Vec<i64> {
    board.column(TaskStatus::Next).iter().map(|t| t.id).collect()
}

/// Live ids of `status` as the server stores them, top first.
async fn server_ids(board: &Board<Counting>, status: TaskStatus) -> Vec<i64> {
    let mut tasks: Vec<Task> = board
        .api()
        .inner
        .list_tasks()
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.status == status && !t.is_deleted())
        .collect();
    tasks.sort_by_key(|t| t.sort_index);
    tasks.iter().map(|t| t.id).collect()
}

#[tokio::test]
async fn burst_sends_only_latest_order() {
    let (url, _handle) = start_server().await;
    let (board, mut rx, [a, b, c]) = seeded_board(&url, None).await;

    assert!(board.move_task(c, Some(a)));
    assert!(board.move_task(b, Some(c)));
    assert_eq!(column_ids(&board), vec![b, c, a]);
    board.settle().await;

    assert_eq!(*board.api().reorders.lock(), vec![vec![b, c, a]]);
    assert_eq!(board.task_queue().sent(), 1);
    assert_eq!(board.task_queue().coalesced(), 1);
    assert!(rx.try_recv().is_err());

    board.reload().await.unwrap();
    assert_eq!(column_ids(&board), vec![b, c, a]);
}

#[tokio::test]
async fn failed_burst_reloads_exactly_once() {
    let (url, _handle) = start_server().await;
    let (board, mut rx, [a, b, c]) = seeded_board(&url, None).await;
    board.api().fail_reorders.store(true, Ordering::SeqCst);
    let lists_before = board.api().lists.load(Ordering::SeqCst);

    assert!(board.move_task(c, Some(a)));
    assert!(board.move_task(b, Some(c)));
    board.settle().await;

    assert_eq!(*board.api().reorders.lock(), vec![vec![b, c, a]]);
    assert_eq!(board.api().lists.load(Ordering::SeqCst), lists_before + 1);
    assert_eq!(board.task_queue().failed(), 1);

    // The reload restored the server's order and nothing was retried.
    assert_eq!(column_ids(&board), vec![a, b, c]);
    let warning = rx.try_recv().unwrap();
    assert_eq!(
        warning,
        BoardWarning::ReorderFailed {
            scope: "status next".to_string(),
            reason: "server returned 503: unavailable".to_string()
        }
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn orders_submitted_in_flight_wait_for_completion() {
    let (url, _handle) = start_server().await;
    let gate = Arc::new(Semaphore::new(0));
    let (board, _rx, [a, b, c]) = seeded_board(&url, Some(Arc::clone(&gate))).await;

    assert!(board.move_task(c, Some(a)));
    // Let the drain task start the first send and block on the gate.
    tokio::task::yield_now().await;
    assert!(board.task_queue().is_busy());

    assert!(board.move_task(a, None));
    assert!(board.move_task(b, None));
    gate.add_permits(2);
    board.settle().await;

    assert_eq!(*board.api().reorders.lock(), vec![vec![c, a, b], vec![c, a, b]]);
    assert_eq!(board.task_queue().sent(), 2);
    assert_eq!(board.task_queue().coalesced(), 1);
}

#[tokio::test]
async fn failure_discards_orders_queued_during_flight() {
    let (url, _handle) = start_server().await;
    let gate = Arc::new(Semaphore::new(0));
    let (board, mut rx, [a, b, c]) = seeded_board(&url, Some(Arc::clone(&gate))).await;
    board.api().fail_reorders.store(true, Ordering::SeqCst);

    assert!(board.move_task(c, Some(a)));
    tokio::task::yield_now().await;
    assert!(board.move_task(b, Some(c)));
    gate.add_permits(2);
    board.settle().await;

    assert_eq!(*board.api().reorders.lock(), vec![vec![c, a, b]]);
    assert_eq!(column_ids(&board), vec![a, b, c]);
    assert_eq!(server_ids(&board, TaskStatus::Next).await, column_ids(&board));
    assert!(matches!(
        rx.try_recv().unwrap(),
        BoardWarning::ReorderFailed { .. }
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn pending_orders_of_other_statuses_are_kept() {
    let (url, _handle) = start_server().await;
    let gate = Arc::new(Semaphore::new(0));
    let (board, _rx, [a, b, c]) = seeded_board(&url, Some(Arc::clone(&gate))).await;
    let o2 = board.create_task("o2", Some(TaskStatus::Ongoing), None).await.unwrap();
    let o1 = board.create_task("o1", Some(TaskStatus::Ongoing), None).await.unwrap();

    assert!(board.move_task(c, Some(a)));
    tokio::task::yield_now().await;
    assert!(board.move_task(a, None));
    assert!(board.move_task(o2.id, Some(o1.id)));
    gate.add_permits(3);
    board.settle().await;

    assert_eq!(
        *board.api().reorders.lock(),
        vec![vec![c, a, b], vec![c, b, a], vec![o2.id, o1.id]]
    );
    assert_eq!(server_ids(&board, TaskStatus::Next).await, vec![c, b, a]);
    assert_eq!(server_ids(&board, TaskStatus::Ongoing).await, vec![o2.id, o1.id]);
}

#[tokio::test]
async fn task_and_subtask_queues_are_independent() {
    let (url, _handle) = start_server().await;
    let (board, _rx, [a, b, _]) = seeded_board(&url, None).await;
    let s1 = board.create_subtask(a, "s1").await.unwrap();
    let s2 = board.create_subtask(a, "s2").await.unwrap();

    assert!(board.move_task(b, Some(a)));
    assert!(board.move_subtask(s1.id, Some(s2.id)));
    board.settle().await;

    assert_eq!(board.api().reorders.lock().len(), 1);
    assert_eq!(*board.api().subtask_reorders.lock(), vec![vec![s1.id, s2.id]]);
}
