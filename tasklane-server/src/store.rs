//! SQLite-backed task store.
//!
//! [`TaskStore`] owns the connection and implements the task and subtask
//! lifecycle: create, edit, reorder, status change, soft delete, restore,
//! and hard delete. Sort-key writes go through [`crate::keys`], except the
//! status change, which moves a task and allocates its key in one statement.
//! Every multi-statement mutation runs in a single transaction.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tasklane_proto::order::STEP;
use tasklane_proto::task::{DEFAULT_PRIORITY, Priority, Subtask, Task, TaskError, TaskStatus};

use crate::keys::{self, Entity, OrderGroup};
use crate::schema;

/// Errors raised by the task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A field failed validation.
    #[error(transparent)]
    Invalid(#[from] TaskError),

    /// No task with this id.
    #[error("task {0} not found")]
    TaskNotFound(i64),

    /// No subtask with this id.
    #[error("subtask {0} not found")]
    SubtaskNotFound(i64),

    /// Attempted to reorder a group that carries no sort keys.
    #[error("cannot reorder {0}")]
    TerminalGroup(String),

    /// Reorder request without ids.
    #[error("ordered id list is empty")]
    EmptyOrder,

    /// Reorder request naming an id twice.
    #[error("duplicate id {0} in ordered id list")]
    DuplicateId(i64),
}

/// Column list matching [`task_from_row`].
const TASK_COLUMNS: &str = "id, title, status, priority, sort_index, created_at, deleted_at";

/// Column list matching [`subtask_from_row`].
const SUBTASK_COLUMNS: &str = "id, task_id, title, sort_index, created_at, deleted_at";

/// Formats a timestamp the way it is stored. Fixed width, so text order is
/// chronological.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, Type::Text, e))
    })
    .transpose()
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(2)?;
    let priority: i64 = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        status: status
            .parse()
            .map_err(|e| conversion_error(2, Type::Text, e))?,
        priority: Priority::new(priority).map_err(|e| conversion_error(3, Type::Integer, e))?,
        sort_index: row.get(4)?,
        created_at: time_at(row, 5)?,
        deleted_at: optional_time_at(row, 6)?,
    })
}

fn subtask_from_row(row: &Row<'_>) -> rusqlite::Result<Subtask> {
    Ok(Subtask {
        id: row.get(0)?,
        task_id: row.get(1)?,
        title: row.get(2)?,
        sort_index: row.get(3)?,
        created_at: time_at(row, 4)?,
        deleted_at: optional_time_at(row, 5)?,
    })
}

fn fetch_task(conn: &Connection, id: i64) -> Result<Task, StoreError> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        params![id],
        task_from_row,
    )
    .optional()?
    .ok_or(StoreError::TaskNotFound(id))
}

fn fetch_subtask(conn: &Connection, id: i64) -> Result<Subtask, StoreError> {
    conn.query_row(
        &format!("SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE id = ?1"),
        params![id],
        subtask_from_row,
    )
    .optional()?
    .ok_or(StoreError::SubtaskNotFound(id))
}

/// Persistent task store over a single SQLite connection.
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    /// Opens (or creates) a database file and brings its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the file cannot be opened or the
    /// migration fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, migrating any legacy schema it holds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the migration fails.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Direct access to the connection, for diagnostics and tests.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// All tasks, including deleted and finished ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY status, sort_index IS NULL, sort_index, id"
        ))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// A single task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if absent.
    pub fn get_task(&self, id: i64) -> Result<Task, StoreError> {
        fetch_task(&self.conn, id)
    }

    /// Creates a task at the head of its status group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a bad title.
    pub fn create_task(
        &self,
        title: &str,
        status: TaskStatus,
        priority: Priority,
    ) -> Result<Task, StoreError> {
        let title = tasklane_proto::task::validate_title(title)?;
        let tx = self.conn.unchecked_transaction()?;
        let group = OrderGroup::Status(status);
        let sort_index = if group.is_orderable() {
            Some(keys::allocate_head(&tx, group, None)?)
        } else {
            None
        };
        tx.execute(
            "INSERT INTO tasks (title, status, priority, sort_index, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                title,
                status.as_str(),
                i64::from(priority),
                sort_index,
                timestamp(Utc::now())
            ],
        )?;
        let task = fetch_task(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        tracing::debug!(task_id = task.id, status = %status, sort_index = ?task.sort_index, "task created");
        Ok(task)
    }

    /// Edits a task's title and/or priority. Never touches ordering.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or [`StoreError::Invalid`].
    pub fn update_task(
        &self,
        id: i64,
        title: Option<&str>,
        priority: Option<Priority>,
    ) -> Result<Task, StoreError> {
        let title = title.map(tasklane_proto::task::validate_title).transpose()?;
        let tx = self.conn.unchecked_transaction()?;
        fetch_task(&tx, id)?;
        if let Some(title) = title {
            tx.execute("UPDATE tasks SET title = ?1 WHERE id = ?2", params![title, id])?;
        }
        if let Some(priority) = priority {
            tx.execute(
                "UPDATE tasks SET priority = ?1 WHERE id = ?2",
                params![i64::from(priority), id],
            )?;
        }
        let task = fetch_task(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Applies a full desired order to a status group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TerminalGroup`] for `finished`, and the
    /// validation errors of [`keys::apply_full_order`].
    pub fn reorder_tasks(&self, status: TaskStatus, ordered_ids: &[i64]) -> Result<usize, StoreError> {
        keys::apply_full_order(&self.conn, OrderGroup::Status(status), ordered_ids)
    }

    /// Moves a task to another status.
    ///
    /// Status and key are written by one statement: the head of the
    /// destination group if it is orderable, otherwise `NULL`. The source
    /// group is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if absent.
    pub fn change_status(&self, id: i64, status: TaskStatus) -> Result<Task, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = fetch_task(&tx, id)?;
        if current.status == status {
            return Ok(current);
        }
        tx.execute(
            "UPDATE tasks SET status = ?1, sort_index = CASE \
                 WHEN ?2 AND deleted_at IS NULL THEN ( \
                     SELECT COALESCE(MIN(t.sort_index), ?3) - ?3 FROM tasks t \
                     WHERE t.status = ?1 AND t.deleted_at IS NULL \
                     AND t.sort_index IS NOT NULL AND t.id != ?4) \
                 ELSE NULL END \
             WHERE id = ?4",
            params![status.as_str(), status.is_orderable(), STEP, id],
        )?;
        let task = fetch_task(&tx, id)?;
        tx.commit()?;
        tracing::debug!(
            task_id = id,
            from = %current.status,
            to = %status,
            sort_index = ?task.sort_index,
            "task status changed"
        );
        Ok(task)
    }

    /// Soft-deletes a task: clears its key and resets its priority.
    ///
    /// Deleting an already-deleted task returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if absent.
    pub fn soft_delete_task(&self, id: i64) -> Result<Task, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = fetch_task(&tx, id)?;
        if current.is_deleted() {
            return Ok(current);
        }
        keys::clear(&tx, Entity::Task, id)?;
        tx.execute(
            "UPDATE tasks SET deleted_at = ?1, priority = ?2 WHERE id = ?3",
            params![timestamp(Utc::now()), i64::from(DEFAULT_PRIORITY), id],
        )?;
        let task = fetch_task(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Restores a soft-deleted task to the head of its current status group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if absent.
    pub fn restore_task(&self, id: i64) -> Result<Task, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = fetch_task(&tx, id)?;
        if !current.is_deleted() {
            return Ok(current);
        }
        let group = OrderGroup::Status(current.status);
        let sort_index = if group.is_orderable() {
            Some(keys::allocate_head(&tx, group, Some(id))?)
        } else {
            None
        };
        tx.execute(
            "UPDATE tasks SET deleted_at = NULL, sort_index = ?1 WHERE id = ?2",
            params![sort_index, id],
        )?;
        let task = fetch_task(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Permanently removes a task and its subtasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if absent.
    pub fn hard_delete_task(&self, id: i64) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subtasks
    // -----------------------------------------------------------------------

    /// All subtasks of a task, including deleted ones, in display order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the owner is absent.
    pub fn list_subtasks(&self, task_id: i64) -> Result<Vec<Subtask>, StoreError> {
        fetch_task(&self.conn, task_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE task_id = ?1 \
             ORDER BY sort_index IS NULL, sort_index, id"
        ))?;
        let subtasks = stmt
            .query_map(params![task_id], subtask_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subtasks)
    }

    /// Creates a subtask at the head of its owner's list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or [`StoreError::Invalid`].
    pub fn create_subtask(&self, task_id: i64, title: &str) -> Result<Subtask, StoreError> {
        let title = tasklane_proto::task::validate_title(title)?;
        let tx = self.conn.unchecked_transaction()?;
        fetch_task(&tx, task_id)?;
        let sort_index = keys::allocate_head(&tx, OrderGroup::Subtasks(task_id), None)?;
        tx.execute(
            "INSERT INTO subtasks (task_id, title, sort_index, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, title, sort_index, timestamp(Utc::now())],
        )?;
        let subtask = fetch_subtask(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        Ok(subtask)
    }

    /// Applies a full desired order to a task's subtasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] and the validation errors of
    /// [`keys::apply_full_order`].
    pub fn reorder_subtasks(&self, task_id: i64, ordered_ids: &[i64]) -> Result<usize, StoreError> {
        fetch_task(&self.conn, task_id)?;
        keys::apply_full_order(&self.conn, OrderGroup::Subtasks(task_id), ordered_ids)
    }

    /// Soft-deletes a subtask and clears its key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SubtaskNotFound`] if absent.
    pub fn soft_delete_subtask(&self, id: i64) -> Result<Subtask, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = fetch_subtask(&tx, id)?;
        if current.is_deleted() {
            return Ok(current);
        }
        keys::clear(&tx, Entity::Subtask, id)?;
        tx.execute(
            "UPDATE subtasks SET deleted_at = ?1 WHERE id = ?2",
            params![timestamp(Utc::now()), id],
        )?;
        let subtask = fetch_subtask(&tx, id)?;
        tx.commit()?;
        Ok(subtask)
    }

    /// Restores a subtask to the head of its owner's list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SubtaskNotFound`] if absent.
    pub fn restore_subtask(&self, id: i64) -> Result<Subtask, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = fetch_subtask(&tx, id)?;
        if !current.is_deleted() {
            return Ok(current);
        }
        let sort_index = keys::allocate_head(&tx, OrderGroup::Subtasks(current.task_id), Some(id))?;
        tx.execute(
            "UPDATE subtasks SET deleted_at = NULL, sort_index = ?1 WHERE id = ?2",
            params![sort_index, id],
        )?;
        let subtask = fetch_subtask(&tx, id)?;
        tx.commit()?;
        Ok(subtask)
    }

    /// Permanently removes a subtask.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SubtaskNotFound`] if absent.
    pub fn hard_delete_subtask(&self, id: i64) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM subtasks WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::SubtaskNotFound(id));
        }
        Ok(())
    }
}
