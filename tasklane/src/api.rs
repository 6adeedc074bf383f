//! Client side of the Tasklane HTTP interface.
//!
//! [`TaskApi`] is the seam the board talks through. [`HttpTaskApi`] is the
//! reqwest implementation; tests substitute in-process fakes.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tasklane_proto::api::{
    CreateSubtaskRequest, CreateTaskRequest, ErrorBody, ReorderResponse, ReorderSubtasksRequest,
    ReorderTasksRequest, StatusChangeRequest, UpdateTaskRequest,
};
use tasklane_proto::task::{Subtask, Task, TaskStatus};

/// Errors returned by [`TaskApi`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, decode).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The server's `error` message, or the status reason.
        message: String,
    },
}

impl ClientError {
    /// Whether the server reported the entity as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Async access to the task server.
///
/// Every mutating call returns the server's version of the entity so the
/// caller can overwrite its local copy.
pub trait TaskApi: Send + Sync {
    /// All tasks, including finished and deleted ones.
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>, ClientError>> + Send;

    /// Creates a task at the head of its status group.
    fn create_task(
        &self,
        request: &CreateTaskRequest,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send;

    /// Edits title and/or priority.
    fn update_task(
        &self,
        id: i64,
        request: &UpdateTaskRequest,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send;

    /// Applies a full order to one status group.
    fn reorder_tasks(
        &self,
        request: &ReorderTasksRequest,
    ) -> impl Future<Output = Result<ReorderResponse, ClientError>> + Send;

    /// Moves a task to another status.
    fn change_status(
        &self,
        id: i64,
        status: TaskStatus,
    ) -> impl Future<Output = Result<Task, ClientError>> + Send;

    /// Restores a soft-deleted task.
    fn restore_task(&self, id: i64) -> impl Future<Output = Result<Task, ClientError>> + Send;

    /// Soft-deletes a task.
    fn delete_task(&self, id: i64) -> impl Future<Output = Result<Task, ClientError>> + Send;

    /// Removes a task and its subtasks for good.
    fn purge_task(&self, id: i64) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// All subtasks of a task, including deleted ones.
    fn list_subtasks(
        &self,
        task_id: i64,
    ) -> impl Future<Output = Result<Vec<Subtask>, ClientError>> + Send;

    /// Creates a subtask at the head of its task's list.
    fn create_subtask(
        &self,
        task_id: i64,
        title: &str,
    ) -> impl Future<Output = Result<Subtask, ClientError>> + Send;

    /// Applies a full order to one task's subtasks.
    fn reorder_subtasks(
        &self,
        task_id: i64,
        ordered_ids: &[i64],
    ) -> impl Future<Output = Result<ReorderResponse, ClientError>> + Send;

    /// Restores a soft-deleted subtask.
    fn restore_subtask(&self, id: i64) -> impl Future<Output = Result<Subtask, ClientError>> + Send;

    /// Soft-deletes a subtask.
    fn delete_subtask(&self, id: i64) -> impl Future<Output = Result<Subtask, ClientError>> + Send;

    /// Removes a subtask for good.
    fn purge_subtask(&self, id: i64) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// [`TaskApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskApi {
    /// Creates a client for the server at `base_url` (e.g. `http://127.0.0.1:3000`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The server base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{path}", self.base_url))
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn empty(builder: RequestBuilder) -> Result<(), ClientError> {
        check(builder.send().await?).await?;
        Ok(())
    }
}

/// Turns a non-2xx response into [`ClientError::Status`].
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    tracing::debug!(status = status.as_u16(), error = %message, "request rejected");
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

impl TaskApi for HttpTaskApi {
    async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        Self::json(self.request(Method::GET, "/tasks")).await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, ClientError> {
        Self::json(self.request(Method::POST, "/tasks").json(request)).await
    }

    async fn update_task(&self, id: i64, request: &UpdateTaskRequest) -> Result<Task, ClientError> {
        Self::json(self.request(Method::PATCH, &format!("/tasks/{id}")).json(request)).await
    }

    async fn reorder_tasks(
        &self,
        request: &ReorderTasksRequest,
    ) -> Result<ReorderResponse, ClientError> {
        Self::json(self.request(Method::PATCH, "/tasks/reorder").json(request)).await
    }

    async fn change_status(&self, id: i64, status: TaskStatus) -> Result<Task, ClientError> {
        let body = StatusChangeRequest { status };
        Self::json(self.request(Method::PATCH, &format!("/tasks/{id}/status")).json(&body)).await
    }

    async fn restore_task(&self, id: i64) -> Result<Task, ClientError> {
        Self::json(self.request(Method::PATCH, &format!("/tasks/{id}/restore"))).await
    }

    async fn delete_task(&self, id: i64) -> Result<Task, ClientError> {
        Self::json(self.request(Method::DELETE, &format!("/tasks/{id}"))).await
    }

    async fn purge_task(&self, id: i64) -> Result<(), ClientError> {
        Self::empty(self.request(Method::DELETE, &format!("/tasks/{id}/permanent"))).await
    }

    async fn list_subtasks(&self, task_id: i64) -> Result<Vec<Subtask>, ClientError> {
        Self::json(self.request(Method::GET, &format!("/tasks/{task_id}/subtasks"))).await
    }

    async fn create_subtask(&self, task_id: i64, title: &str) -> Result<Subtask, ClientError> {
        let body = CreateSubtaskRequest {
            title: title.to_string(),
        };
        Self::json(
            self.request(Method::POST, &format!("/tasks/{task_id}/subtasks"))
                .json(&body),
        )
        .await
    }

    async fn reorder_subtasks(
        &self,
        task_id: i64,
        ordered_ids: &[i64],
    ) -> Result<ReorderResponse, ClientError> {
        let body = ReorderSubtasksRequest {
            ordered_subtask_ids: ordered_ids.to_vec(),
        };
        Self::json(
            self.request(Method::PATCH, &format!("/tasks/{task_id}/subtasks/reorder"))
                .json(&body),
        )
        .await
    }

    async fn restore_subtask(&self, id: i64) -> Result<Subtask, ClientError> {
        Self::json(self.request(Method::PATCH, &format!("/subtasks/{id}/restore"))).await
    }

    async fn delete_subtask(&self, id: i64) -> Result<Subtask, ClientError> {
        Self::json(self.request(Method::DELETE, &format!("/subtasks/{id}"))).await
    }

    async fn purge_subtask(&self, id: i64) -> Result<(), ClientError> {
        Self::empty(self.request(Method::DELETE, &format!("/subtasks/{id}/permanent"))).await
    }
}
