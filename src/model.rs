use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type ListId = i64;

/// Where a moved task lands relative to its reference sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialized ancestry: every ancestor id from the root down, ending in
/// the task's own id. Stored as `/`-joined ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPath(Vec<TaskId>);

impl TaskPath {
    pub fn root(id: TaskId) -> Self {
        Self(vec![id])
    }

    /// Path of a child with `id` placed directly under this path.
    pub fn child(&self, id: TaskId) -> Self {
        let mut ids = self.0.clone();
        ids.push(id);
        Self(ids)
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.0
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.0.contains(&id)
    }

    /// Level implied by the path length (root = 0).
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// SQL `LIKE` pattern matching every strict descendant of this path.
    pub fn descendant_pattern(&self) -> String {
        format!("{}/%", self.encode())
    }
}

impl FromStr for TaskPath {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.split('/')
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<Vec<TaskId>> for TaskPath {
    fn from(ids: Vec<TaskId>) -> Self {
        Self(ids)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub list_id: ListId,
    pub content: String,
    pub is_done: bool,
    pub parent_id: Option<TaskId>,
    pub level: u32,
    pub path: TaskPath,
    pub position: i64,
    pub global_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct List {
    pub id: ListId,
    pub name: String,
    pub owner: String,
    pub revision: i64,
    pub created_at: String,
}

/// One entry of the flat, display-ordered view of a list.
///
/// Rows are already in global order, so a renderer only has to indent by
/// `level`; no recursion is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRow {
    pub id: TaskId,
    pub content: String,
    pub is_done: bool,
    pub parent_id: Option<TaskId>,
    pub level: u32,
    pub path: TaskPath,
    pub has_children: bool,
    pub global_order: i64,
}

impl TaskRow {
    pub fn icon(&self) -> &'static str {
        if self.is_done {
            "[x]"
        } else {
            "[ ]"
        }
    }

    /// True when `self` sits somewhere above `other` in the tree.
    pub fn is_ancestor_of(&self, other: &TaskRow) -> bool {
        self.id != other.id && other.path.contains(self.id)
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            content: task.content.clone(),
            is_done: task.is_done,
            parent_id: task.parent_id,
            level: task.level,
            path: task.path.clone(),
            has_children: false,
            global_order: task.global_order,
        }
    }
}

/// Authoritative ordered state of a list at one revision.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub list_id: ListId,
    pub revision: i64,
    pub rows: Vec<TaskRow>,
    /// Task the mutation that produced this snapshot created, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<TaskId>,
}

impl Snapshot {
    pub fn row(&self, id: TaskId) -> Option<&TaskRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.rows.iter().map(|r| r.id).collect()
    }
}
