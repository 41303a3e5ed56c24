use log::info;
use rusqlite::Connection;

use crate::error::Result;
use crate::model::{ListId, TaskId};
use crate::reconcile;

const TABLES: &str = "
CREATE TABLE IF NOT EXISTS lists (
    id         INTEGER PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE CHECK(length(name) > 0),
    owner      TEXT NOT NULL DEFAULT '',
    revision   INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY,
    list_id      INTEGER NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
    content      TEXT NOT NULL CHECK(length(content) > 0),
    is_done      INTEGER NOT NULL DEFAULT 0,
    parent_id    INTEGER,
    level        INTEGER NOT NULL DEFAULT 0 CHECK(level >= 0),
    path         TEXT NOT NULL DEFAULT '',
    position     INTEGER NOT NULL DEFAULT 0 CHECK(position >= 0),
    global_order INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    UNIQUE (id, list_id),
    FOREIGN KEY (parent_id, list_id) REFERENCES tasks(id, list_id) ON DELETE CASCADE,
    CHECK (parent_id IS NULL OR parent_id != id)
);
";

const INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_tasks_parent_id ON tasks(list_id, parent_id, position);
CREATE INDEX IF NOT EXISTS idx_tasks_level ON tasks(level);
CREATE INDEX IF NOT EXISTS idx_tasks_path ON tasks(path);
CREATE INDEX IF NOT EXISTS idx_tasks_global_order ON tasks(list_id, global_order);
";

/// Columns the hierarchy needs, with the definition used when an older
/// position-only database lacks them.
const TASK_COLUMNS: &[(&str, &str)] = &[
    ("parent_id", "INTEGER"),
    ("level", "INTEGER NOT NULL DEFAULT 0"),
    ("path", "TEXT NOT NULL DEFAULT ''"),
    ("global_order", "INTEGER NOT NULL DEFAULT 0"),
    ("updated_at", "TEXT NOT NULL DEFAULT ''"),
];

const LIST_COLUMNS: &[(&str, &str)] = &[
    ("owner", "TEXT NOT NULL DEFAULT ''"),
    ("revision", "INTEGER NOT NULL DEFAULT 0"),
];

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    set_pragmas(&conn)?;
    Ok(conn)
}

/// Create the schema, upgrading an older layout first when one is found.
/// Lists inherited from a layout without owners are handed to `owner`.
pub fn init(conn: &Connection, owner: &str) -> Result<()> {
    conn.execute_batch(TABLES)?;
    migrate(conn, owner)?;
    conn.execute_batch(INDEXES)?;
    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn add_missing_columns(
    conn: &Connection,
    table: &str,
    wanted: &[(&'static str, &'static str)],
) -> Result<Vec<&'static str>> {
    let present = column_names(conn, table)?;
    let mut added = Vec::new();
    for &(name, definition) in wanted {
        if !present.iter().any(|c| c == name) {
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {name} {definition}"))?;
            added.push(name);
        }
    }
    Ok(added)
}

/// Upgrade a database written by an older layout.
///
/// Without `path` the old tasks were a flat list: each becomes a root whose
/// path is its own id. Without `global_order` the stored positions were
/// list-wide, so they are renumbered densely within each sibling group and
/// the display order is rebuilt. Running it on an up-to-date database is a
/// no-op.
pub fn migrate(conn: &Connection, owner: &str) -> Result<()> {
    let added_list = add_missing_columns(conn, "lists", LIST_COLUMNS)?;
    let added_task = add_missing_columns(conn, "tasks", TASK_COLUMNS)?;
    if added_list.contains(&"owner") {
        let adopted = conn.execute("UPDATE lists SET owner = ?1", [owner])?;
        info!("migrated lists table: {adopted} list(s) now owned by '{owner}'");
    } else if !added_list.is_empty() {
        info!("migrated lists table: added {}", added_list.join(", "));
    }
    if added_task.contains(&"path") {
        conn.execute(
            "UPDATE tasks SET parent_id = NULL, level = 0, path = CAST(id AS TEXT)",
            [],
        )?;
    }
    if added_task.contains(&"global_order") {
        renumber_sibling_positions(conn)?;
        let mut stmt = conn.prepare("SELECT id FROM lists")?;
        let lists = stmt
            .query_map([], |row| row.get::<_, ListId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for list_id in lists {
            reconcile::reconcile(conn, list_id)?;
        }
    }
    if !added_task.is_empty() {
        info!(
            "migrated tasks table to hierarchy layout: added {}",
            added_task.join(", ")
        );
    }
    Ok(())
}

/// Dense `0..n` positions within each `(list_id, parent_id)` group, keeping
/// the old relative order.
fn renumber_sibling_positions(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, list_id, parent_id FROM tasks
         ORDER BY list_id, parent_id IS NOT NULL, parent_id, position, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, TaskId>(0)?,
                row.get::<_, ListId>(1)?,
                row.get::<_, Option<TaskId>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut update = conn.prepare_cached("UPDATE tasks SET position = ?1 WHERE id = ?2")?;
    let mut group = None;
    let mut next = 0i64;
    for (id, list_id, parent_id) in rows {
        if group != Some((list_id, parent_id)) {
            group = Some((list_id, parent_id));
            next = 0;
        }
        update.execute(rusqlite::params![next, id])?;
        next += 1;
    }
    Ok(())
}

/// In-memory database with the schema applied; used by tests.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    set_pragmas(&conn)?;
    init(&conn, "")?;
    Ok(conn)
}
