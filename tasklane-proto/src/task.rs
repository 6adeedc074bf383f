//! Task and subtask data model shared by the server and the client.
//!
//! Both entities carry a nullable `sort_index`. A key is present only while
//! the item is live (not soft-deleted) and, for tasks, not in the terminal
//! [`TaskStatus::Finished`] status. Items without a key render in
//! [`fallback_cmp`] order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed title length in characters.
pub const MAX_TITLE_LENGTH: usize = 256;

/// Priority assigned to new tasks and forced on soft delete.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Errors raised when validating task fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Title is empty or whitespace only.
    #[error("title cannot be empty")]
    TitleEmpty,
    /// Title exceeds [`MAX_TITLE_LENGTH`].
    #[error("title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Priority outside `1..=5`.
    #[error("invalid priority {0} (expected 1..=5)")]
    InvalidPriority(i64),
    /// Status string did not match any known status.
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

/// Workflow status of a task. Each status is its own ordering group.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Captured but not triaged.
    #[default]
    Inbox,
    /// Up next.
    Next,
    /// Being worked on.
    Ongoing,
    /// Blocked on someone else.
    Waiting,
    /// Planned for a specific date.
    Scheduled,
    /// Parked ideas.
    Someday,
    /// Terminal. Finished tasks never carry a sort key.
    Finished,
}

impl TaskStatus {
    /// Every status in display order.
    pub const ALL: [Self; 7] = [
        Self::Inbox,
        Self::Next,
        Self::Ongoing,
        Self::Waiting,
        Self::Scheduled,
        Self::Someday,
        Self::Finished,
    ];

    /// Whether tasks in this status participate in manual ordering.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        !matches!(self, Self::Finished)
    }

    /// The snake_case name used on the wire and in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Next => "next",
            Self::Ongoing => "ongoing",
            Self::Waiting => "waiting",
            Self::Scheduled => "scheduled",
            Self::Someday => "someday",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TaskError::UnknownStatus(s.to_string()))
    }
}

/// Task priority, 1 (highest) through 5 (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    /// Highest priority.
    pub const HIGHEST: Self = Self(1);
    /// Lowest priority, also the default.
    pub const LOWEST: Self = Self(DEFAULT_PRIORITY);

    /// Creates a priority, rejecting values outside `1..=5`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidPriority`] for out-of-range values.
    pub fn new(value: i64) -> Result<Self, TaskError> {
        match u8::try_from(value) {
            Ok(v @ 1..=DEFAULT_PRIORITY) => Ok(Self(v)),
            _ => Err(TaskError::InvalidPriority(value)),
        }
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl TryFrom<i64> for Priority {
    type Error = TaskError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        Self::from(p.0)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Trims and validates a title.
///
/// # Errors
///
/// Returns [`TaskError::TitleEmpty`] or [`TaskError::TitleTooLong`].
pub fn validate_title(title: &str) -> Result<String, TaskError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    Ok(trimmed.to_string())
}

/// A top-level task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Database row id.
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Workflow status; also the ordering group.
    pub status: TaskStatus,
    /// 1 (highest) through 5.
    pub priority: Priority,
    /// Position within the status group, `None` when finished or deleted.
    pub sort_index: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Soft-delete time.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the task has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the task takes part in manual ordering.
    #[must_use]
    pub const fn is_orderable(&self) -> bool {
        !self.is_deleted() && self.status.is_orderable()
    }
}

/// A checklist item owned by a task. The owner never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Database row id.
    pub id: i64,
    /// Owning task id.
    pub task_id: i64,
    /// Display title.
    pub title: String,
    /// Position within the owning task, `None` when deleted.
    pub sort_index: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Soft-delete time.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subtask {
    /// Whether the subtask has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Ordering for tasks without a sort key: priority, then most recent first.
#[must_use]
pub fn fallback_cmp(a: &Task, b: &Task) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}
