//! Integration tests for drag-and-drop over a live board.
//!
//! Drives the generic engine through both adapters and checks what the
//! server ends up storing.

use std::time::Duration;

use tasklane::api::HttpTaskApi;
use tasklane::board::{Board, BoardConfig, DragState, DropEffect, DropOutcome};
use tasklane_proto::task::TaskStatus;

async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = tasklane_server::routes::start_memory_server()
        .await
        .expect("failed to start server");
    (format!("http://{addr}"), handle)
}

/// Board with `next` displayed as `[a, b, c]` and `ongoing` as `[d]`.
async fn seeded(url: &str) -> (Board<HttpTaskApi>, [i64; 4]) {
    let api = HttpTaskApi::new(url, Duration::from_secs(5)).unwrap();
    let (board, _rx) = Board::new(api, &BoardConfig::default());
    let c = board.create_task("c", Some(TaskStatus::Next), None).await.unwrap();
    let b = board.create_task("b", Some(TaskStatus::Next), None).await.unwrap();
    let a = board.create_task("a", Some(TaskStatus::Next), None).await.unwrap();
    let d = board.create_task("d", Some(TaskStatus::Ongoing), None).await.unwrap();
    (board, [a.id, b.id, c.id, d.id])
}

async fn server_order(url: &str, status: TaskStatus) -> Vec<(i64, Option<i64>)> {
    let api = HttpTaskApi::new(url, Duration::from_secs(5)).unwrap();
    let (fresh, _rx) = Board::new(api, &BoardConfig::default());
    fresh.reload().await.unwrap();
    fresh
        .column(status)
        .iter()
        .map(|t| (t.id, t.sort_index))
        .collect()
}

#[tokio::test]
async fn drop_on_item_persists_full_order() {
    let (url, _handle) = start_server().await;
    let (board, [a, b, c, _]) = seeded(&url).await;

    let mut drag = board.task_drag();
    assert!(drag.drag_start(c));
    assert_eq!(drag.drag_enter(a), DropEffect::Move);
    let outcome = drag.drop_on_item(a);
    assert_eq!(
        outcome,
        DropOutcome::Reordered {
            group: TaskStatus::Next,
            order: vec![c, a, b]
        }
    );
    board.settle().await;

    assert_eq!(
        server_order(&url, TaskStatus::Next).await,
        vec![(c, Some(10)), (a, Some(20)), (b, Some(30))]
    );
}

#[tokio::test]
async fn drop_on_self_sends_nothing() {
    let (url, _handle) = start_server().await;
    let (board, [_, b, _, _]) = seeded(&url).await;

    let mut drag = board.task_drag();
    assert!(drag.drag_start(b));
    assert_eq!(drag.drop_on_item(b), DropOutcome::Unchanged);
    board.settle().await;
    assert_eq!(board.task_queue().sent(), 0);
}

#[tokio::test]
async fn container_drop_moves_to_end() {
    let (url, _handle) = start_server().await;
    let (board, [a, b, c, _]) = seeded(&url).await;

    let mut drag = board.task_drag();
    assert!(drag.drag_start(a));
    drag.drop_on_container(&TaskStatus::Next);
    board.settle().await;

    assert_eq!(
        server_order(&url, TaskStatus::Next).await,
        vec![(b, Some(10)), (c, Some(20)), (a, Some(30))]
    );
}

#[tokio::test]
async fn hovering_other_status_is_rejected() {
    let (url, _handle) = start_server().await;
    let (board, [a, _, _, d]) = seeded(&url).await;

    let mut drag = board.task_drag();
    assert!(drag.drag_start(a));
    assert_eq!(drag.drag_over(d), DropEffect::None);
    assert_eq!(drag.drop_on_item(d), DropOutcome::Unchanged);
    assert_eq!(*drag.state(), DragState::Idle);
    board.settle().await;
    assert_eq!(board.task_queue().sent(), 0);
}

#[tokio::test]
async fn drop_on_status_transfers_to_head() {
    let (url, _handle) = start_server().await;
    let (board, [a, b, c, d]) = seeded(&url).await;

    let mut drag = board.task_drag();
    assert!(drag.drag_start(b));
    assert_eq!(drag.drag_over_group(&TaskStatus::Ongoing), DropEffect::Move);
    let outcome = drag.drop_on_group(&TaskStatus::Ongoing);
    board.complete_drop(outcome).await.unwrap();
    board.settle().await;

    assert_eq!(board.task_queue().sent(), 0, "transfers never reorder");
    let ongoing = server_order(&url, TaskStatus::Ongoing).await;
    assert_eq!(ongoing, vec![(b, Some(-10)), (d, Some(0))]);
    let next = server_order(&url, TaskStatus::Next).await;
    assert_eq!(next, vec![(a, Some(-20)), (c, Some(0))]);
}

#[tokio::test]
async fn finished_and_deleted_tasks_cannot_be_dragged() {
    let (url, _handle) = start_server().await;
    let (board, [a, b, _, _]) = seeded(&url).await;
    board.change_status(a, TaskStatus::Finished).await.unwrap();
    board.delete_task(b).await.unwrap();

    let mut drag = board.task_drag();
    assert!(!drag.drag_start(a));
    assert!(!drag.drag_start(b));
    assert!(!drag.is_dragging());
}

#[tokio::test]
async fn subtask_drag_stays_within_owner() {
    let (url, _handle) = start_server().await;
    let (board, [a, b, _, _]) = seeded(&url).await;
    let s2 = board.create_subtask(a, "s2").await.unwrap();
    let s1 = board.create_subtask(a, "s1").await.unwrap();
    let foreign = board.create_subtask(b, "x").await.unwrap();

    let mut drag = board.subtask_drag();
    assert!(drag.drag_start(s1.id));
    assert_eq!(drag.drag_over(foreign.id), DropEffect::None);
    assert_eq!(drag.drop_on_item(foreign.id), DropOutcome::Unchanged);

    assert!(drag.drag_start(s1.id));
    drag.drop_on_container(&a);
    board.settle().await;

    board.load_subtasks(a).await.unwrap();
    let order: Vec<_> = board
        .subtasks(a)
        .iter()
        .map(|s| (s.id, s.sort_index))
        .collect();
    assert_eq!(order, vec![(s2.id, Some(10)), (s1.id, Some(20))]);

    board.load_subtasks(b).await.unwrap();
    assert_eq!(board.subtasks(b)[0].sort_index, foreign.sort_index);
}
