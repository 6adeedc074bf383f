//! Sort-key primitives over the `tasks` and `subtasks` tables.
//!
//! Apart from the status-change statement in [`crate::store`], these are the
//! only writers of `sort_index`. They take a plain
//! [`Connection`] so callers can run them inside an open transaction (a
//! [`rusqlite::Transaction`] derefs to a connection).

use std::collections::HashSet;
use std::fmt;

use rusqlite::types::Value;
use rusqlite::{Connection, params};
use tasklane_proto::order::{STEP, sort_key_for_position};
use tasklane_proto::task::TaskStatus;

use crate::store::StoreError;

/// Which table a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// Row in `tasks`.
    Task,
    /// Row in `subtasks`.
    Subtask,
}

impl Entity {
    const fn table(self) -> &'static str {
        match self {
            Self::Task => "tasks",
            Self::Subtask => "subtasks",
        }
    }
}

/// An ordering scope: all tasks in one status, or all subtasks of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderGroup {
    /// Tasks sharing a status.
    Status(TaskStatus),
    /// Subtasks owned by a task.
    Subtasks(i64),
}

impl OrderGroup {
    /// The table holding the group's rows.
    #[must_use]
    pub const fn entity(self) -> Entity {
        match self {
            Self::Status(_) => Entity::Task,
            Self::Subtasks(_) => Entity::Subtask,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Subtasks(_) => "task_id",
        }
    }

    fn scope(self) -> Value {
        match self {
            Self::Status(status) => Value::Text(status.as_str().to_string()),
            Self::Subtasks(task_id) => Value::Integer(task_id),
        }
    }

    /// Whether rows in this group carry sort keys at all.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        match self {
            Self::Status(status) => status.is_orderable(),
            Self::Subtasks(_) => true,
        }
    }
}

impl fmt::Display for OrderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "status {status}"),
            Self::Subtasks(task_id) => write!(f, "subtasks of task {task_id}"),
        }
    }
}

/// Key that places a row before every live, keyed member of `group`.
///
/// `exclude` leaves one row out of the minimum, for rows moving into the
/// group. Keys may go negative; only relative order matters.
pub fn allocate_head(
    conn: &Connection,
    group: OrderGroup,
    exclude: Option<i64>,
) -> rusqlite::Result<i64> {
    let sql = format!(
        "SELECT COALESCE(MIN(sort_index), ?1) - ?1 FROM {} \
         WHERE {} = ?2 AND deleted_at IS NULL AND sort_index IS NOT NULL \
         AND (?3 IS NULL OR id != ?3)",
        group.entity().table(),
        group.column()
    );
    conn.query_row(&sql, params![STEP, group.scope(), exclude], |row| row.get(0))
}

/// Live members of `group` in current display order.
pub fn member_ids(conn: &Connection, group: OrderGroup) -> rusqlite::Result<Vec<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} = ?1 AND deleted_at IS NULL \
         ORDER BY sort_index IS NULL, sort_index, id",
        group.entity().table(),
        group.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params![group.scope()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Writes `(index + 1) * STEP` for each id, returning how many keys changed.
///
/// Callers must already hold a transaction and have filtered `ids` to the
/// group.
pub fn write_order(conn: &Connection, entity: Entity, ids: &[i64]) -> rusqlite::Result<usize> {
    let sql = format!(
        "UPDATE {} SET sort_index = ?1 WHERE id = ?2 AND sort_index IS NOT ?1",
        entity.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut updated = 0;
    for (position, id) in ids.iter().enumerate() {
        updated += stmt.execute(params![sort_key_for_position(position), id])?;
    }
    Ok(updated)
}

/// Applies a full desired order to `group` in one transaction.
///
/// Ids not currently in the group are skipped. Live members missing from
/// `ordered_ids` keep their relative order and follow the listed ids.
///
/// # Errors
///
/// Rejects the terminal group, an empty list, and duplicate ids before
/// touching the store. Any statement failure rolls the whole group back.
pub fn apply_full_order(
    conn: &Connection,
    group: OrderGroup,
    ordered_ids: &[i64],
) -> Result<usize, StoreError> {
    if !group.is_orderable() {
        return Err(StoreError::TerminalGroup(group.to_string()));
    }
    if ordered_ids.is_empty() {
        return Err(StoreError::EmptyOrder);
    }
    let mut seen = HashSet::with_capacity(ordered_ids.len());
    if let Some(dup) = ordered_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(StoreError::DuplicateId(*dup));
    }

    let tx = conn.unchecked_transaction()?;
    let members = member_ids(&tx, group)?;
    let member_set: HashSet<i64> = members.iter().copied().collect();

    let mut order: Vec<i64> = ordered_ids
        .iter()
        .copied()
        .filter(|id| member_set.contains(id))
        .collect();
    let skipped = ordered_ids.len() - order.len();
    if skipped > 0 {
        tracing::warn!(%group, skipped, "reorder list named ids outside the group");
    }
    order.extend(members.iter().copied().filter(|id| !seen.contains(id)));

    let updated = write_order(&tx, group.entity(), &order)?;
    tx.commit()?;
    Ok(updated)
}

/// Drops a row's sort key.
pub fn clear(conn: &Connection, entity: Entity, id: i64) -> rusqlite::Result<usize> {
    let sql = format!("UPDATE {} SET sort_index = NULL WHERE id = ?1", entity.table());
    conn.execute(&sql, params![id])
}
