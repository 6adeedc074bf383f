//! Request and response bodies for the Tasklane HTTP interface.
//!
//! All bodies are JSON with camelCase field names.

use serde::{Deserialize, Serialize};

use crate::task::TaskStatus;

/// `POST /tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Task title.
    pub title: String,
    /// Initial status, defaults to [`TaskStatus::Inbox`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Initial priority (1..=5), defaults to 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// `PATCH /tasks/{id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New priority (1..=5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// `PATCH /tasks/reorder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderTasksRequest {
    /// The status group being reordered.
    pub status: TaskStatus,
    /// Full desired order, index 0 at the top.
    pub ordered_task_ids: Vec<i64>,
}

/// `PATCH /tasks/{id}/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    /// Destination status.
    pub status: TaskStatus,
}

/// `POST /tasks/{taskId}/subtasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubtaskRequest {
    /// Subtask title.
    pub title: String,
}

/// `PATCH /tasks/{taskId}/subtasks/reorder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderSubtasksRequest {
    /// Full desired order, index 0 at the top.
    pub ordered_subtask_ids: Vec<i64>,
}

/// Response to both reorder endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderResponse {
    /// Rows whose sort key actually changed. Diagnostic only.
    pub updated: usize,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}
