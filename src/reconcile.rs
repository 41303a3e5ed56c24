//! Order reconciler: keeps `global_order` equal to a pre-order walk of the
//! forest so a renderer can simply sort by it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;
use rusqlite::Connection;

use crate::error::Result;
use crate::model::{ListId, Task, TaskId, TaskPath, TaskRow};
use crate::store;

fn children_map(tasks: &[Task]) -> HashMap<Option<TaskId>, Vec<&Task>> {
    let ids: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let mut map: HashMap<Option<TaskId>, Vec<&Task>> = HashMap::new();
    for task in tasks {
        // Tasks whose parent isn't in the set are walked as roots.
        let key = task.parent_id.filter(|p| ids.contains(p));
        map.entry(key).or_default().push(task);
    }
    for group in map.values_mut() {
        group.sort_by_key(|t| (t.position, t.id));
    }
    map
}

/// Pre-order walk: roots by position, each followed by its children by
/// position. Tasks unreachable from a root (only possible in corrupt data)
/// are left out.
pub fn preorder(tasks: &[Task]) -> Vec<TaskId> {
    let map = children_map(tasks);
    let mut order = Vec::with_capacity(tasks.len());
    let mut stack: Vec<&Task> = map
        .get(&None)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(task) = stack.pop() {
        order.push(task.id);
        if let Some(kids) = map.get(&Some(task.id)) {
            stack.extend(kids.iter().rev());
        }
    }
    order
}

/// Rewrite `global_order` for every task in the list. Returns how many rows
/// actually changed.
pub fn reconcile(conn: &Connection, list_id: ListId) -> Result<usize> {
    let tasks = store::fetch_all(conn, list_id)?;
    let mut order = preorder(&tasks);
    if order.len() < tasks.len() {
        let placed: HashSet<TaskId> = order.iter().copied().collect();
        order.extend(tasks.iter().map(|t| t.id).filter(|id| !placed.contains(id)));
    }

    let current: HashMap<TaskId, i64> = tasks.iter().map(|t| (t.id, t.global_order)).collect();
    let mut changed = 0;
    for (rank, id) in order.iter().enumerate() {
        let rank = rank as i64;
        if current.get(id) != Some(&rank) {
            store::set_global_order(conn, *id, rank)?;
            changed += 1;
        }
    }
    debug!(
        "reconciled list {list_id}: {} task(s), {changed} reordered",
        tasks.len()
    );
    Ok(changed)
}

/// Display rows for tasks already sorted by global order.
pub fn display_rows(tasks: &[Task]) -> Vec<TaskRow> {
    let parents: HashSet<TaskId> = tasks.iter().filter_map(|t| t.parent_id).collect();
    tasks
        .iter()
        .map(|task| TaskRow {
            has_children: parents.contains(&task.id),
            ..TaskRow::from(task)
        })
        .collect()
}

/// A broken tree invariant found by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingParent { task: TaskId, parent: TaskId },
    Level { task: TaskId, expected: u32, actual: u32 },
    Path { task: TaskId, expected: TaskPath, actual: TaskPath },
    Cycle { task: TaskId },
    TooDeep { task: TaskId, level: u32, max_depth: u32 },
    PositionGap { parent: Option<TaskId>, positions: Vec<i64> },
    GlobalOrder { expected: Vec<TaskId>, actual: Vec<TaskId> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParent { task, parent } => {
                write!(f, "task {task}: parent {parent} is not in the list")
            }
            Self::Level {
                task,
                expected,
                actual,
            } => write!(f, "task {task}: level {actual}, expected {expected}"),
            Self::Path {
                task,
                expected,
                actual,
            } => write!(f, "task {task}: path {actual}, expected {expected}"),
            Self::Cycle { task } => write!(f, "task {task}: path contains itself"),
            Self::TooDeep {
                task,
                level,
                max_depth,
            } => write!(f, "task {task}: level {level} exceeds limit {max_depth}"),
            Self::PositionGap { parent, positions } => {
                let group = parent.map_or_else(|| "roots".to_string(), |p| format!("children of {p}"));
                write!(f, "{group}: positions {positions:?} are not 0..{}", positions.len())
            }
            Self::GlobalOrder { expected, actual } => {
                write!(f, "global order {actual:?} differs from tree order {expected:?}")
            }
        }
    }
}

/// Check every tree invariant over one list's tasks (in global order).
pub fn verify(tasks: &[Task], max_depth: u32) -> Vec<Violation> {
    let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut violations = Vec::new();

    for task in tasks {
        let own = task.path.ids();
        if own.len() > 1 && own[..own.len() - 1].contains(&task.id) {
            violations.push(Violation::Cycle { task: task.id });
        }
        if task.level > max_depth {
            violations.push(Violation::TooDeep {
                task: task.id,
                level: task.level,
                max_depth,
            });
        }
        let (expected_level, expected_path) = match task.parent_id {
            None => (0, TaskPath::root(task.id)),
            Some(parent_id) => match by_id.get(&parent_id) {
                Some(parent) => (parent.level + 1, parent.path.child(task.id)),
                None => {
                    violations.push(Violation::MissingParent {
                        task: task.id,
                        parent: parent_id,
                    });
                    continue;
                }
            },
        };
        if task.level != expected_level {
            violations.push(Violation::Level {
                task: task.id,
                expected: expected_level,
                actual: task.level,
            });
        }
        if task.path != expected_path {
            violations.push(Violation::Path {
                task: task.id,
                expected: expected_path,
                actual: task.path.clone(),
            });
        }
    }

    let mut groups: HashMap<Option<TaskId>, Vec<i64>> = HashMap::new();
    for task in tasks {
        groups.entry(task.parent_id).or_default().push(task.position);
    }
    let mut gaps: Vec<Violation> = groups
        .into_iter()
        .filter_map(|(parent, mut positions)| {
            positions.sort_unstable();
            let dense = positions.iter().enumerate().all(|(i, &p)| p == i as i64);
            (!dense).then_some(Violation::PositionGap { parent, positions })
        })
        .collect();
    gaps.sort_by_key(|v| match v {
        Violation::PositionGap { parent, .. } => *parent,
        _ => None,
    });
    violations.extend(gaps);

    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by_key(|t| (t.global_order, t.id));
    let actual: Vec<TaskId> = sorted.iter().map(|t| t.id).collect();
    let expected = preorder(tasks);
    let dense = sorted
        .iter()
        .enumerate()
        .all(|(i, t)| t.global_order == i as i64);
    if actual != expected || !dense {
        violations.push(Violation::GlobalOrder { expected, actual });
    }

    violations
}
