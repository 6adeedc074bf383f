//! Schema creation and migration.
//!
//! Version history (tracked in `PRAGMA user_version`):
//! - 1: tasks and subtasks without ordering.
//! - 2: nullable `sort_index` on both tables, backfilled on upgrade.

use rusqlite::{Connection, params};
use tasklane_proto::task::TaskStatus;

use crate::keys::{self, OrderGroup};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 2;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'inbox',
    priority INTEGER NOT NULL DEFAULT 5,
    sort_index INTEGER,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE TABLE IF NOT EXISTS subtasks (
    id INTEGER PRIMARY KEY,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    sort_index INTEGER,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);";

const CREATE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_tasks_status_sort ON tasks(status, sort_index);
CREATE INDEX IF NOT EXISTS idx_subtasks_task_sort ON subtasks(task_id, sort_index);";

/// Brings a connection's schema up to [`SCHEMA_VERSION`].
///
/// Legacy version-1 tables gain a `sort_index` column, and every ordering
/// group with unkeyed live rows is backfilled. The upgrade runs in one
/// transaction.
///
/// # Errors
///
/// Returns the first SQLite failure; nothing is committed in that case.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(CREATE_TABLES)?;
    for table in ["tasks", "subtasks"] {
        if !has_column(&tx, table, "sort_index")? {
            tracing::info!(table, "adding sort_index column");
            tx.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN sort_index INTEGER;"))?;
        }
    }
    tx.execute_batch(CREATE_INDEXES)?;

    let tasks = backfill_tasks(&tx)?;
    let subtasks = backfill_subtasks(&tx)?;
    if tasks + subtasks > 0 {
        tracing::info!(tasks, subtasks, "backfilled sort keys");
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    tracing::debug!(from = version, to = SCHEMA_VERSION, "schema migrated");
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether a group has live rows without a key.
fn needs_backfill(conn: &Connection, sql: &str, scope: &dyn rusqlite::ToSql) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(sql, [scope], |row| row.get(0))?;
    Ok(count > 0)
}

/// Renumbers each orderable status group by priority, then newest first,
/// with the same formula a manual reorder uses.
fn backfill_tasks(conn: &Connection) -> rusqlite::Result<usize> {
    let mut written = 0;
    for status in TaskStatus::ALL.into_iter().filter(|s| s.is_orderable()) {
        if !needs_backfill(
            conn,
            "SELECT COUNT(*) FROM tasks WHERE status = ?1 AND deleted_at IS NULL AND sort_index IS NULL",
            &status.as_str(),
        )? {
            continue;
        }
        let mut stmt = conn.prepare(
            "SELECT id FROM tasks WHERE status = ?1 AND deleted_at IS NULL \
             ORDER BY priority ASC, created_at DESC, id DESC",
        )?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        written += keys::write_order(conn, OrderGroup::Status(status).entity(), &ids)?;
    }
    Ok(written)
}

/// Renumbers each task's subtasks in creation order.
fn backfill_subtasks(conn: &Connection) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT task_id FROM subtasks WHERE deleted_at IS NULL AND sort_index IS NULL",
    )?;
    let owners = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    let mut written = 0;
    for task_id in owners {
        let mut stmt = conn.prepare(
            "SELECT id FROM subtasks WHERE task_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![task_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        written += keys::write_order(conn, OrderGroup::Subtasks(task_id).entity(), &ids)?;
    }
    Ok(written)
}
