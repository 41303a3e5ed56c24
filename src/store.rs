//! Hierarchy store: point and bulk access to persisted task records.
//!
//! The store checks referential integrity (a parent must exist in the same
//! list) but does not maintain the tree invariants on its own; that is the
//! engine's job. Bulk reads always come back in global order.

use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Missing, Result};
use crate::model::{List, ListId, Task, TaskId, TaskPath};

const TASK_COLUMNS: &str = "id, list_id, content, is_done, parent_id, level, path, position, \
     global_order, created_at, updated_at";

const LIST_COLUMNS: &str = "id, name, owner, revision, created_at";

fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let path: String = row.get(6)?;
    let path = path
        .parse::<TaskPath>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    Ok(Task {
        id: row.get(0)?,
        list_id: row.get(1)?,
        content: row.get(2)?,
        is_done: row.get::<_, i64>(3)? != 0,
        parent_id: row.get(4)?,
        level: row.get(5)?,
        path,
        position: row.get(7)?,
        global_order: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn read_list_row(row: &rusqlite::Row) -> rusqlite::Result<List> {
    Ok(List {
        id: row.get(0)?,
        name: row.get(1)?,
        owner: row.get(2)?,
        revision: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// A task record about to be written. The store appends the new id to
/// `parent_path` to form the materialized path.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub list_id: ListId,
    pub content: &'a str,
    pub is_done: bool,
    pub parent_id: Option<TaskId>,
    pub parent_path: Option<&'a TaskPath>,
    pub level: u32,
    pub position: i64,
    pub global_order: i64,
}

/// Field changes for [`update`]. `None` leaves a column untouched;
/// `parent_id: Some(None)` clears the parent.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub content: Option<String>,
    pub is_done: Option<bool>,
    pub parent_id: Option<Option<TaskId>>,
    pub level: Option<u32>,
    pub path: Option<TaskPath>,
    pub position: Option<i64>,
    pub global_order: Option<i64>,
}

impl TaskUpdate {
    fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.is_done.is_none()
            && self.parent_id.is_none()
            && self.level.is_none()
            && self.path.is_none()
            && self.position.is_none()
            && self.global_order.is_none()
    }
}

/// Reject a parent reference that is missing or lives in another list.
fn require_parent(conn: &Connection, list_id: ListId, parent: TaskId) -> Result<()> {
    let parent_list: Option<ListId> = conn
        .query_row("SELECT list_id FROM tasks WHERE id = ?1", [parent], |row| {
            row.get(0)
        })
        .optional()?;
    match parent_list {
        None => Err(Error::NotFound(Missing::Task {
            id: parent,
            list_id: Some(list_id),
        })),
        Some(parent_list) if parent_list != list_id => Err(Error::OwnershipMismatch {
            parent,
            parent_list,
            list_id,
        }),
        Some(_) => Ok(()),
    }
}

pub fn insert(conn: &Connection, task: &NewTask) -> Result<TaskId> {
    require_list(conn, task.list_id)?;
    if let Some(parent) = task.parent_id {
        require_parent(conn, task.list_id, parent)?;
    }
    conn.execute(
        "INSERT INTO tasks (list_id, content, is_done, parent_id, level, position, global_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            task.list_id,
            task.content,
            task.is_done,
            task.parent_id,
            task.level,
            task.position,
            task.global_order,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let path = match task.parent_path {
        Some(parent_path) => parent_path.child(id),
        None => TaskPath::root(id),
    };
    conn.execute(
        "UPDATE tasks SET path = ?1 WHERE id = ?2",
        params![path.encode(), id],
    )?;
    Ok(id)
}

pub fn find(conn: &Connection, id: TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            read_task_row,
        )
        .optional()?;
    Ok(task)
}

pub fn fetch_one(conn: &Connection, id: TaskId) -> Result<Task> {
    find(conn, id)?.ok_or(Error::NotFound(Missing::Task { id, list_id: None }))
}

/// Fetch a task that must belong to `list_id`; a task from another list is
/// reported as absent.
pub fn fetch_in_list(conn: &Connection, list_id: ListId, id: TaskId) -> Result<Task> {
    match find(conn, id)? {
        Some(task) if task.list_id == list_id => Ok(task),
        _ => Err(Error::NotFound(Missing::Task {
            id,
            list_id: Some(list_id),
        })),
    }
}

/// Every task of a list, sorted by global order.
pub fn fetch_all(conn: &Connection, list_id: ListId) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE list_id = ?1 ORDER BY global_order, id"
    ))?;
    let tasks = stmt
        .query_map([list_id], read_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Direct children of `parent` (roots when `None`), by sibling position.
pub fn children(conn: &Connection, list_id: ListId, parent: Option<TaskId>) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE list_id = ?1 AND parent_id IS ?2
         ORDER BY position, id"
    ))?;
    let tasks = stmt
        .query_map(params![list_id, parent], read_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

pub fn child_count(conn: &Connection, list_id: ListId, parent: Option<TaskId>) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE list_id = ?1 AND parent_id IS ?2",
        params![list_id, parent],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn task_count(conn: &Connection, list_id: ListId) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE list_id = ?1",
        [list_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// How many levels of descendants hang below `task` (0 for a leaf).
pub fn subtree_height(conn: &Connection, task: &Task) -> Result<u32> {
    let deepest: Option<u32> = conn.query_row(
        "SELECT MAX(level) FROM tasks WHERE list_id = ?1 AND path LIKE ?2",
        params![task.list_id, task.path.descendant_pattern()],
        |row| row.get(0),
    )?;
    Ok(deepest.map_or(0, |d| d.saturating_sub(task.level)))
}

pub fn update(conn: &Connection, id: TaskId, fields: &TaskUpdate) -> Result<()> {
    let current = fetch_one(conn, id)?;
    if fields.is_empty() {
        return Ok(());
    }
    if let Some(Some(parent)) = fields.parent_id {
        require_parent(conn, current.list_id, parent)?;
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(content) = &fields.content {
        sets.push("content = ?");
        values.push(Value::Text(content.clone()));
    }
    if let Some(done) = fields.is_done {
        sets.push("is_done = ?");
        values.push(Value::Integer(i64::from(done)));
    }
    if let Some(parent) = fields.parent_id {
        sets.push("parent_id = ?");
        values.push(parent.map_or(Value::Null, Value::Integer));
    }
    if let Some(level) = fields.level {
        sets.push("level = ?");
        values.push(Value::Integer(i64::from(level)));
    }
    if let Some(path) = &fields.path {
        sets.push("path = ?");
        values.push(Value::Text(path.encode()));
    }
    if let Some(position) = fields.position {
        sets.push("position = ?");
        values.push(Value::Integer(position));
    }
    if let Some(order) = fields.global_order {
        sets.push("global_order = ?");
        values.push(Value::Integer(order));
    }
    values.push(Value::Integer(id));

    let sql = format!(
        "UPDATE tasks SET {}, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id = ?",
        sets.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(())
}

/// Write only the global order; used by the reconciler in a tight loop.
pub fn set_global_order(conn: &Connection, id: TaskId, order: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE tasks SET global_order = ?1 WHERE id = ?2")?;
    stmt.execute(params![order, id])?;
    Ok(())
}

/// Shift sibling positions by `delta` for every sibling at or after `from`.
pub fn shift_positions(
    conn: &Connection,
    list_id: ListId,
    parent: Option<TaskId>,
    from: i64,
    delta: i64,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE tasks SET position = position + ?1
         WHERE list_id = ?2 AND parent_id IS ?3 AND position >= ?4",
        params![delta, list_id, parent, from],
    )?;
    Ok(changed)
}

/// Delete the given tasks together with all of their descendants.
/// Returns the number of rows removed.
pub fn delete_many(conn: &Connection, ids: &[TaskId]) -> Result<usize> {
    let mut removed = 0;
    for &id in ids {
        // An earlier id may have taken this one with it.
        let Some(task) = find(conn, id)? else {
            continue;
        };
        removed += conn.execute(
            "DELETE FROM tasks WHERE list_id = ?1 AND path LIKE ?2",
            params![task.list_id, task.path.descendant_pattern()],
        )?;
        removed += conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    }
    Ok(removed)
}

// ── Lists ──────────────────────────────────────────────────────────────

pub fn create_list(conn: &Connection, name: &str, owner: &str) -> Result<ListId> {
    conn.execute(
        "INSERT INTO lists (name, owner) VALUES (?1, ?2)",
        params![name, owner],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_list(conn: &Connection, id: ListId) -> Result<List> {
    conn.query_row(
        &format!("SELECT {LIST_COLUMNS} FROM lists WHERE id = ?1"),
        [id],
        read_list_row,
    )
    .optional()?
    .ok_or(Error::NotFound(Missing::List(id)))
}

pub fn find_list_by_name(conn: &Connection, name: &str) -> Result<List> {
    conn.query_row(
        &format!("SELECT {LIST_COLUMNS} FROM lists WHERE name = ?1"),
        [name],
        read_list_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(Missing::ListNamed(name.to_string())))
}

pub fn all_lists(conn: &Connection) -> Result<Vec<List>> {
    let mut stmt = conn.prepare(&format!("SELECT {LIST_COLUMNS} FROM lists ORDER BY name"))?;
    let lists = stmt
        .query_map([], read_list_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lists)
}

fn require_list(conn: &Connection, id: ListId) -> Result<()> {
    get_list(conn, id).map(|_| ())
}

/// Bump and return the list's revision.
pub fn bump_revision(conn: &Connection, list_id: ListId) -> Result<i64> {
    let revision = conn
        .query_row(
            "UPDATE lists SET revision = revision + 1 WHERE id = ?1 RETURNING revision",
            [list_id],
            |row| row.get(0),
        )
        .optional()?;
    revision.ok_or(Error::NotFound(Missing::List(list_id)))
}
