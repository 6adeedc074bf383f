//! HTTP routes: shared state, handlers, and error mapping.
//!
//! Handlers validate request bodies, lock the store for the duration of one
//! store call, and return the affected entity so clients can fold the
//! server's version into their local state.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch};
use tasklane_proto::api::{
    CreateSubtaskRequest, CreateTaskRequest, ErrorBody, ReorderResponse, ReorderSubtasksRequest,
    ReorderTasksRequest, StatusChangeRequest, UpdateTaskRequest,
};
use tasklane_proto::task::{Priority, Subtask, Task};
use tokio::sync::Mutex;

use crate::store::{StoreError, TaskStore};

/// Errors returned to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rejected before any store mutation.
    #[error("{0}")]
    Validation(String),

    /// The addressed entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Store failure; the mutation was rolled back.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(_) | StoreError::SubtaskNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            StoreError::Invalid(_)
            | StoreError::TerminalGroup(_)
            | StoreError::EmptyOrder
            | StoreError::DuplicateId(_) => Self::Validation(err.to_string()),
            StoreError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(reason) => {
                tracing::error!(error = %reason, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Shared server state.
pub struct AppState {
    /// The single store connection. One request mutates at a time.
    pub store: Mutex<TaskStore>,
}

impl AppState {
    /// Wraps a store for sharing across handlers.
    #[must_use]
    pub fn new(store: TaskStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/reorder", patch(reorder_tasks))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/tasks/{id}/status", patch(change_status))
        .route("/tasks/{id}/restore", patch(restore_task))
        .route("/tasks/{id}/permanent", delete(purge_task))
        .route("/tasks/{id}/subtasks", get(list_subtasks).post(create_subtask))
        .route("/tasks/{id}/subtasks/reorder", patch(reorder_subtasks))
        .route("/subtasks/{id}", delete(delete_subtask))
        .route("/subtasks/{id}/restore", patch(restore_subtask))
        .route("/subtasks/{id}/permanent", delete(purge_subtask))
        .with_state(state)
}

fn priority_from(raw: Option<i64>) -> Result<Option<Priority>, ApiError> {
    raw.map(Priority::new)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.store.lock().await.list_tasks()?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let priority = priority_from(body.priority)?.unwrap_or_default();
    let status = body.status.unwrap_or_default();
    let task = state
        .store
        .lock()
        .await
        .create_task(&body.title, status, priority)?;
    tracing::info!(task_id = task.id, status = %task.status, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let priority = priority_from(body.priority)?;
    let task = state
        .store
        .lock()
        .await
        .update_task(id, body.title.as_deref(), priority)?;
    Ok(Json(task))
}

async fn reorder_tasks(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReorderTasksRequest>,
) -> Result<Json<ReorderResponse>, ApiError> {
    let updated = state
        .store
        .lock()
        .await
        .reorder_tasks(body.status, &body.ordered_task_ids)?;
    tracing::info!(
        status = %body.status,
        count = body.ordered_task_ids.len(),
        updated,
        "tasks reordered"
    );
    Ok(Json(ReorderResponse { updated }))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<StatusChangeRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state.store.lock().await.change_status(id, body.status)?;
    tracing::info!(task_id = id, status = %task.status, sort_index = ?task.sort_index, "task status changed");
    Ok(Json(task))
}

async fn restore_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    let task = state.store.lock().await.restore_task(id)?;
    tracing::info!(task_id = id, "task restored");
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    let task = state.store.lock().await.soft_delete_task(id)?;
    tracing::info!(task_id = id, "task deleted");
    Ok(Json(task))
}

async fn purge_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.lock().await.hard_delete_task(id)?;
    tracing::info!(task_id = id, "task purged");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subtasks(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<Subtask>>, ApiError> {
    let subtasks = state.store.lock().await.list_subtasks(task_id)?;
    Ok(Json(subtasks))
}

async fn create_subtask(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Json(body): Json<CreateSubtaskRequest>,
) -> Result<(StatusCode, Json<Subtask>), ApiError> {
    let subtask = state
        .store
        .lock()
        .await
        .create_subtask(task_id, &body.title)?;
    tracing::info!(task_id, subtask_id = subtask.id, "subtask created");
    Ok((StatusCode::CREATED, Json(subtask)))
}

async fn reorder_subtasks(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Json(body): Json<ReorderSubtasksRequest>,
) -> Result<Json<ReorderResponse>, ApiError> {
    let updated = state
        .store
        .lock()
        .await
        .reorder_subtasks(task_id, &body.ordered_subtask_ids)?;
    tracing::info!(task_id, updated, "subtasks reordered");
    Ok(Json(ReorderResponse { updated }))
}

async fn restore_subtask(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Subtask>, ApiError> {
    let subtask = state.store.lock().await.restore_subtask(id)?;
    Ok(Json(subtask))
}

async fn delete_subtask(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Subtask>, ApiError> {
    let subtask = state.store.lock().await.soft_delete_subtask(id)?;
    Ok(Json(subtask))
}

async fn purge_subtask(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.lock().await.hard_delete_subtask(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Starts the HTTP server over the given state.
///
/// Returns the bound address (useful with port `0`) and the server task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts a server over a fresh in-memory store on an OS-assigned port.
///
/// # Errors
///
/// Returns an error if the store cannot be created or the listener cannot bind.
pub async fn start_memory_server() -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let store = TaskStore::open_memory()?;
    start_server_with_state("127.0.0.1:0", Arc::new(AppState::new(store))).await
}
