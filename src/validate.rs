//! Structural rules shared by the engine (on stored tasks) and the gesture
//! classifier (on display rows), so both refuse the same targets.

use crate::error::{Error, Result, TargetError};
use crate::model::{Task, TaskId, TaskPath, TaskRow};

/// Default nesting cap: roots plus one tier of children.
pub const DEFAULT_MAX_DEPTH: u32 = 1;

/// The parts of a tree node the rules look at.
pub trait Node {
    fn id(&self) -> TaskId;
    fn level(&self) -> u32;
    fn path(&self) -> &TaskPath;
}

impl Node for Task {
    fn id(&self) -> TaskId {
        self.id
    }
    fn level(&self) -> u32 {
        self.level
    }
    fn path(&self) -> &TaskPath {
        &self.path
    }
}

impl Node for TaskRow {
    fn id(&self) -> TaskId {
        self.id
    }
    fn level(&self) -> u32 {
        self.level
    }
    fn path(&self) -> &TaskPath {
        &self.path
    }
}

/// Trim task content and refuse it when nothing is left.
pub fn validate_content(content: &str) -> Result<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidContent("task content must not be empty".into()));
    }
    Ok(trimmed)
}

/// Can `task`, whose descendants reach `height` levels below it, become a
/// child of `parent`?
pub fn check_nest<T: Node, P: Node>(
    task: &T,
    height: u32,
    parent: &P,
    max_depth: u32,
) -> std::result::Result<(), TargetError> {
    if task.id() == parent.id() {
        return Err(TargetError::SelfMove { task: task.id() });
    }
    if parent.path().contains(task.id()) {
        return Err(TargetError::Cycle {
            task: task.id(),
            parent: parent.id(),
        });
    }
    if parent.level() >= max_depth {
        return Err(TargetError::DepthCap {
            parent: parent.id(),
            max_depth,
        });
    }
    if parent.level() + 1 + height > max_depth {
        return Err(TargetError::HasChildren {
            task: task.id(),
            max_depth,
        });
    }
    Ok(())
}

/// Can `task` join the sibling group under `new_parent` (roots when `None`)?
pub fn check_placement<T: Node, P: Node>(
    task: &T,
    height: u32,
    new_parent: Option<&P>,
    max_depth: u32,
) -> std::result::Result<(), TargetError> {
    match new_parent {
        Some(parent) => check_nest(task, height, parent, max_depth),
        None => Ok(()),
    }
}
