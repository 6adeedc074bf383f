//! Integration tests for the task lifecycle against a live server.
//!
//! Validates that every mutation folds the server's row into the board:
//! - Creation and restore allocate the head of the group
//! - Manual reorders persist as `(position + 1) * 10`
//! - Status changes allocate the destination head and leave the source alone
//! - Soft delete clears the key; finished tasks carry none
//! - Failed requests reload and surface a warning

use std::time::Duration;

use tasklane::api::HttpTaskApi;
use tasklane::board::{Board, BoardConfig, BoardWarning};
use tasklane_proto::task::{Priority, Task, TaskStatus};

/// Start the server in-process over a fresh in-memory database.
async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = tasklane_server::routes::start_memory_server()
        .await
        .expect("failed to start server");
    (format!("http://{addr}"), handle)
}

fn connect(url: &str) -> (Board<HttpTaskApi>, tokio::sync::mpsc::Receiver<BoardWarning>) {
    let api = HttpTaskApi::new(url, Duration::from_secs(5)).unwrap();
    Board::new(api, &BoardConfig::default())
}

fn ids(tasks: &[Task]) -> Vec<i64> {
    tasks.iter().map(|t| t.id).collect()
}

fn keys(tasks: &[Task]) -> Vec<Option<i64>> {
    tasks.iter().map(|t| t.sort_index).collect()
}

async fn create(board: &Board<HttpTaskApi>, title: &str, status: TaskStatus) -> Task {
    board.create_task(title, Some(status), None).await.unwrap()
}

#[tokio::test]
async fn creation_allocates_descending_head_keys() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let a = create(&board, "a", TaskStatus::Next).await;
    let b = create(&board, "b", TaskStatus::Next).await;
    let c = create(&board, "c", TaskStatus::Next).await;

    assert_eq!(keys(&[a.clone(), b.clone(), c.clone()]), vec![Some(0), Some(-10), Some(-20)]);
    assert_eq!(ids(&board.column(TaskStatus::Next)), vec![c.id, b.id, a.id]);
}

#[tokio::test]
async fn head_after_renumbered_group() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let a = create(&board, "a", TaskStatus::Inbox).await;
    let b = create(&board, "b", TaskStatus::Inbox).await;
    let c = create(&board, "c", TaskStatus::Inbox).await;
    // Renumber to a=10, b=20, c=30.
    assert!(board.move_task(a.id, Some(c.id)));
    assert!(board.move_task(b.id, Some(c.id)));
    board.settle().await;
    board.reload().await.unwrap();
    assert_eq!(keys(&board.column(TaskStatus::Inbox)), vec![Some(10), Some(20), Some(30)]);
    assert_eq!(ids(&board.column(TaskStatus::Inbox)), vec![a.id, b.id, c.id]);

    let d = create(&board, "d", TaskStatus::Inbox).await;
    let e = create(&board, "e", TaskStatus::Inbox).await;
    assert_eq!(d.sort_index, Some(0));
    assert_eq!(e.sort_index, Some(-10));
}

#[tokio::test]
async fn reorder_persists_across_clients() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let a = create(&board, "a", TaskStatus::Next).await;
    let b = create(&board, "b", TaskStatus::Next).await;
    let c = create(&board, "c", TaskStatus::Next).await;
    // Display order is c, b, a. Move a to the top.
    assert!(board.move_task(a.id, Some(c.id)));
    board.settle().await;
    assert_eq!(board.task_queue().sent(), 1);

    let (other, _rx) = connect(&url);
    other.reload().await.unwrap();
    let column = other.column(TaskStatus::Next);
    assert_eq!(ids(&column), vec![a.id, c.id, b.id]);
    assert_eq!(keys(&column), vec![Some(10), Some(20), Some(30)]);
}

#[tokio::test]
async fn status_change_takes_destination_head() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let n1 = create(&board, "n1", TaskStatus::Next).await;
    let n2 = create(&board, "n2", TaskStatus::Next).await;
    let n3 = create(&board, "n3", TaskStatus::Next).await;
    assert!(board.move_task(n1.id, Some(n3.id)));
    board.settle().await;
    // next: n1=10, n3=20, n2=30.
    let o1 = create(&board, "o1", TaskStatus::Ongoing).await;
    let o2 = create(&board, "o2", TaskStatus::Ongoing).await;
    assert!(board.move_task(o2.id, None));
    board.settle().await;
    // ongoing: o1=10, o2=20.

    let moved = board.change_status(n3.id, TaskStatus::Ongoing).await.unwrap();
    assert_eq!(moved.sort_index, Some(0));
    assert_eq!(ids(&board.column(TaskStatus::Ongoing)), vec![n3.id, o1.id, o2.id]);

    board.reload().await.unwrap();
    assert_eq!(board.task(n1.id).unwrap().sort_index, Some(10));
    assert_eq!(board.task(n2.id).unwrap().sort_index, Some(30));
}

#[tokio::test]
async fn finishing_clears_key_and_reopening_allocates_head() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let a = create(&board, "a", TaskStatus::Next).await;
    let b = create(&board, "b", TaskStatus::Next).await;

    let done = board.change_status(a.id, TaskStatus::Finished).await.unwrap();
    assert_eq!(done.sort_index, None);
    assert_eq!(ids(&board.column(TaskStatus::Finished)), vec![a.id]);

    let reopened = board.change_status(a.id, TaskStatus::Next).await.unwrap();
    assert_eq!(reopened.sort_index, Some(b.sort_index.unwrap() - 10));
}

#[tokio::test]
async fn finished_tasks_fall_back_to_priority_order() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let low = board
        .create_task("low", Some(TaskStatus::Finished), Some(Priority::LOWEST))
        .await
        .unwrap();
    let high = board
        .create_task("high", Some(TaskStatus::Finished), Some(Priority::HIGHEST))
        .await
        .unwrap();
    assert_eq!(low.sort_index, None);
    assert_eq!(ids(&board.column(TaskStatus::Finished)), vec![high.id, low.id]);
}

#[tokio::test]
async fn delete_clears_key_and_restore_returns_to_top() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let a = board
        .create_task("a", Some(TaskStatus::Waiting), Some(Priority::HIGHEST))
        .await
        .unwrap();
    let b = create(&board, "b", TaskStatus::Waiting).await;
    let c = create(&board, "c", TaskStatus::Waiting).await;

    let deleted = board.delete_task(a.id).await.unwrap();
    assert!(deleted.is_deleted());
    assert_eq!(deleted.sort_index, None);
    assert_eq!(deleted.priority, Priority::default());
    assert_eq!(ids(&board.trash()), vec![a.id]);

    let restored = board.restore_task(a.id).await.unwrap();
    assert_eq!(restored.sort_index, Some(c.sort_index.unwrap() - 10));
    assert_eq!(ids(&board.column(TaskStatus::Waiting)), vec![a.id, c.id, b.id]);
}

#[tokio::test]
async fn purge_removes_task_and_subtasks() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let task = create(&board, "a", TaskStatus::Next).await;
    board.create_subtask(task.id, "s").await.unwrap();
    board.purge_task(task.id).await.unwrap();

    assert!(board.task(task.id).is_none());
    assert!(board.all_subtasks(task.id).is_empty());
    board.reload().await.unwrap();
    assert!(board.tasks().is_empty());
}

#[tokio::test]
async fn subtask_lifecycle() {
    let (url, _handle) = start_server().await;
    let (board, _rx) = connect(&url);

    let task = create(&board, "parent", TaskStatus::Next).await;
    let other = create(&board, "other", TaskStatus::Next).await;
    let s1 = board.create_subtask(task.id, "s1").await.unwrap();
    let s2 = board.create_subtask(task.id, "s2").await.unwrap();
    let s3 = board.create_subtask(task.id, "s3").await.unwrap();
    let foreign = board.create_subtask(other.id, "x").await.unwrap();
    assert_eq!(s1.sort_index, Some(0));
    assert_eq!(s3.sort_index, Some(-20));

    // s3, s2, s1 -> s1, s3, s2
    assert!(board.move_subtask(s1.id, Some(s3.id)));
    board.settle().await;
    board.load_subtasks(task.id).await.unwrap();
    let ordered: Vec<_> = board
        .subtasks(task.id)
        .iter()
        .map(|s| (s.id, s.sort_index))
        .collect();
    assert_eq!(ordered, vec![(s1.id, Some(10)), (s3.id, Some(20)), (s2.id, Some(30))]);

    board.load_subtasks(other.id).await.unwrap();
    assert_eq!(board.subtasks(other.id)[0].sort_index, foreign.sort_index);

    let deleted = board.delete_subtask(s3.id).await.unwrap();
    assert_eq!(deleted.sort_index, None);
    let restored = board.restore_subtask(s3.id).await.unwrap();
    assert_eq!(restored.sort_index, Some(0));
    assert_eq!(board.subtasks(task.id)[0].id, s3.id);

    board.purge_subtask(s2.id).await.unwrap();
    board.load_subtasks(task.id).await.unwrap();
    assert_eq!(board.subtasks(task.id).len(), 2);
}

#[tokio::test]
async fn rejected_request_reloads_and_warns() {
    let (url, _handle) = start_server().await;
    let (board, mut rx) = connect(&url);
    create(&board, "a", TaskStatus::Next).await;

    let err = board
        .create_task("   ", Some(TaskStatus::Next), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"));

    let err = board.restore_task(999).await.unwrap_err();
    assert!(err.is_not_found());

    assert!(matches!(
        rx.try_recv().unwrap(),
        BoardWarning::RequestFailed { operation: "create task", .. }
    ));
    assert!(matches!(
        rx.try_recv().unwrap(),
        BoardWarning::RequestFailed { operation: "restore task", .. }
    ));
    assert_eq!(board.tasks().len(), 1);
}
