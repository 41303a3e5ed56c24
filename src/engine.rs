//! Mutation engine: the only code that changes tree structure.
//!
//! Every public operation runs inside one savepoint. Preconditions are
//! checked before the first write; any failure rolls the whole operation
//! back. After a structural change the order reconciler runs once and the
//! list revision is bumped.

use log::{debug, info};
use rusqlite::Connection;

use crate::error::{Error, Result, TargetError};
use crate::model::{ListId, Placement, Task, TaskId, TaskPath};
use crate::reconcile;
use crate::store::{self, NewTask, TaskUpdate};
use crate::validate::{check_nest, check_placement, validate_content, DEFAULT_MAX_DEPTH};

/// Run `f` inside a savepoint: released on success, rolled back on error.
/// Works standalone and nested inside an outer transaction.
pub fn atomic<T>(conn: &Connection, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f() {
        Ok(v) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(v)
        }
        Err(e) => {
            let _ = conn.execute_batch(&format!("ROLLBACK TO {name}"));
            let _ = conn.execute_batch(&format!("RELEASE {name}"));
            Err(e)
        }
    }
}

pub struct Engine<'c> {
    conn: &'c Connection,
    max_depth: u32,
}

impl<'c> Engine<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self::with_max_depth(conn, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(conn: &'c Connection, max_depth: u32) -> Self {
        Self {
            conn,
            max_depth: max_depth.max(1),
        }
    }

    /// Append a new task as the last root of the list.
    pub fn create_root(&self, list_id: ListId, content: &str) -> Result<TaskId> {
        let content = validate_content(content)?;
        atomic(self.conn, "create_root", || {
            let position = store::child_count(self.conn, list_id, None)?;
            let global_order = store::task_count(self.conn, list_id)?;
            let id = store::insert(
                self.conn,
                &NewTask {
                    list_id,
                    content,
                    is_done: false,
                    parent_id: None,
                    parent_path: None,
                    level: 0,
                    position,
                    global_order,
                },
            )?;
            self.finish(list_id)?;
            info!("created task {id} as root {position} of list {list_id}");
            Ok(id)
        })
    }

    /// Append a new task as the last child of `parent_id`.
    pub fn create_child(&self, list_id: ListId, parent_id: TaskId, content: &str) -> Result<TaskId> {
        let content = validate_content(content)?;
        atomic(self.conn, "create_child", || {
            let parent = self.load_parent(list_id, parent_id)?;
            if parent.level >= self.max_depth {
                return Err(TargetError::DepthCap {
                    parent: parent.id,
                    max_depth: self.max_depth,
                }
                .into());
            }
            let position = store::child_count(self.conn, list_id, Some(parent.id))?;
            let global_order = store::task_count(self.conn, list_id)?;
            let id = store::insert(
                self.conn,
                &NewTask {
                    list_id,
                    content,
                    is_done: false,
                    parent_id: Some(parent.id),
                    parent_path: Some(&parent.path),
                    level: parent.level + 1,
                    position,
                    global_order,
                },
            )?;
            self.finish(list_id)?;
            info!("created task {id} as child {position} of task {parent_id}");
            Ok(id)
        })
    }

    /// Move `task_id` next to `reference` among the reference's siblings, or
    /// among the roots when there is no reference (`Before` = first root,
    /// `After` = last root).
    pub fn move_as_sibling(
        &self,
        list_id: ListId,
        task_id: TaskId,
        reference: Option<TaskId>,
        placement: Placement,
    ) -> Result<()> {
        if reference == Some(task_id) {
            return Err(TargetError::SelfMove { task: task_id }.into());
        }
        atomic(self.conn, "move_as_sibling", || {
            let task = store::fetch_in_list(self.conn, list_id, task_id)?;
            let reference = reference
                .map(|id| store::fetch_in_list(self.conn, list_id, id))
                .transpose()?;
            let new_parent = match reference.as_ref().and_then(|r| r.parent_id) {
                Some(id) => Some(store::fetch_in_list(self.conn, list_id, id)?),
                None => None,
            };
            let height = store::subtree_height(self.conn, &task)?;
            check_placement(&task, height, new_parent.as_ref(), self.max_depth)?;

            self.detach(&task)?;

            let group = new_parent.as_ref().map(|p| p.id);
            let index = match &reference {
                Some(r) => {
                    // The reference may have shifted when the task left.
                    let r = store::fetch_one(self.conn, r.id)?;
                    match placement {
                        Placement::Before => r.position,
                        Placement::After => r.position + 1,
                    }
                }
                None => match placement {
                    Placement::Before => 0,
                    Placement::After => self.group_len_without(&task, None)?,
                },
            };
            store::shift_positions(self.conn, list_id, group, index, 1)?;
            self.attach(&task, new_parent.as_ref(), index)?;
            self.finish(list_id)?;
            info!(
                "moved task {task_id} {placement} {} (position {index})",
                reference
                    .as_ref()
                    .map_or_else(|| "roots".to_string(), |r| format!("task {}", r.id))
            );
            Ok(())
        })
    }

    /// Make `task_id` the last child of `parent_id`.
    pub fn move_as_child(&self, list_id: ListId, task_id: TaskId, parent_id: TaskId) -> Result<()> {
        if task_id == parent_id {
            return Err(TargetError::SelfMove { task: task_id }.into());
        }
        atomic(self.conn, "move_as_child", || {
            let task = store::fetch_in_list(self.conn, list_id, task_id)?;
            let parent = self.load_parent(list_id, parent_id)?;
            let height = store::subtree_height(self.conn, &task)?;
            check_nest(&task, height, &parent, self.max_depth)?;

            self.detach(&task)?;
            let position = self.group_len_without(&task, Some(parent.id))?;
            self.attach(&task, Some(&parent), position)?;
            self.finish(list_id)?;
            info!("nested task {task_id} under task {parent_id} at position {position}");
            Ok(())
        })
    }

    /// Turn `task_id` into the last root of its list.
    pub fn detach_to_root(&self, list_id: ListId, task_id: TaskId) -> Result<()> {
        self.move_as_sibling(list_id, task_id, None, Placement::After)
    }

    /// Remove `task_id` and everything below it. Returns the number of
    /// tasks deleted.
    pub fn delete_subtree(&self, list_id: ListId, task_id: TaskId) -> Result<usize> {
        atomic(self.conn, "delete_subtree", || {
            let task = store::fetch_in_list(self.conn, list_id, task_id)?;
            let removed = store::delete_many(self.conn, &[task.id])?;
            store::shift_positions(self.conn, list_id, task.parent_id, task.position + 1, -1)?;
            self.finish(list_id)?;
            info!("deleted task {task_id} and {} descendant(s)", removed - 1);
            Ok(removed)
        })
    }

    pub fn edit_content(&self, list_id: ListId, task_id: TaskId, content: &str) -> Result<()> {
        let content = validate_content(content)?;
        atomic(self.conn, "edit_content", || {
            store::fetch_in_list(self.conn, list_id, task_id)?;
            store::update(
                self.conn,
                task_id,
                &TaskUpdate {
                    content: Some(content.to_string()),
                    ..TaskUpdate::default()
                },
            )?;
            store::bump_revision(self.conn, list_id)?;
            Ok(())
        })
    }

    pub fn set_done(&self, list_id: ListId, task_id: TaskId, done: bool) -> Result<()> {
        atomic(self.conn, "set_done", || {
            store::fetch_in_list(self.conn, list_id, task_id)?;
            store::update(
                self.conn,
                task_id,
                &TaskUpdate {
                    is_done: Some(done),
                    ..TaskUpdate::default()
                },
            )?;
            store::bump_revision(self.conn, list_id)?;
            Ok(())
        })
    }

    /// A parent named by the caller: absent is `NotFound`, in another list
    /// is `OwnershipMismatch`.
    fn load_parent(&self, list_id: ListId, parent_id: TaskId) -> Result<Task> {
        let parent = store::fetch_one(self.conn, parent_id)?;
        if parent.list_id != list_id {
            return Err(Error::OwnershipMismatch {
                parent: parent.id,
                parent_list: parent.list_id,
                list_id,
            });
        }
        Ok(parent)
    }

    /// Close the gap `task` leaves in its current sibling group. The task
    /// keeps its stale position until [`Self::attach`] overwrites it.
    fn detach(&self, task: &Task) -> Result<()> {
        store::shift_positions(
            self.conn,
            task.list_id,
            task.parent_id,
            task.position + 1,
            -1,
        )?;
        Ok(())
    }

    /// Size of a sibling group, not counting `task` if it was detached from it.
    fn group_len_without(&self, task: &Task, parent: Option<TaskId>) -> Result<i64> {
        let count = store::child_count(self.conn, task.list_id, parent)?;
        Ok(if task.parent_id == parent { count - 1 } else { count })
    }

    /// Put `task` at `position` under `parent` and re-derive level and path
    /// for it and its descendants.
    fn attach(&self, task: &Task, parent: Option<&Task>, position: i64) -> Result<()> {
        let (level, path) = match parent {
            Some(p) => (p.level + 1, p.path.child(task.id)),
            None => (0, TaskPath::root(task.id)),
        };
        store::update(
            self.conn,
            task.id,
            &TaskUpdate {
                parent_id: Some(parent.map(|p| p.id)),
                level: Some(level),
                path: Some(path),
                position: Some(position),
                ..TaskUpdate::default()
            },
        )?;
        if task.parent_id != parent.map(|p| p.id) {
            let moved = store::fetch_one(self.conn, task.id)?;
            self.relevel_descendants(&moved, self.max_depth)?;
        }
        Ok(())
    }

    /// Recompute level and path (not position) below `task`. Recursion is
    /// bounded by the depth cap.
    fn relevel_descendants(&self, task: &Task, budget: u32) -> Result<()> {
        if budget == 0 {
            return Ok(());
        }
        for child in store::children(self.conn, task.list_id, Some(task.id))? {
            let level = task.level + 1;
            let path = task.path.child(child.id);
            store::update(
                self.conn,
                child.id,
                &TaskUpdate {
                    level: Some(level),
                    path: Some(path.clone()),
                    ..TaskUpdate::default()
                },
            )?;
            debug!("relevelled task {} to level {level}", child.id);
            let child = Task { level, path, ..child };
            self.relevel_descendants(&child, budget - 1)?;
        }
        Ok(())
    }

    fn finish(&self, list_id: ListId) -> Result<()> {
        reconcile::reconcile(self.conn, list_id)?;
        store::bump_revision(self.conn, list_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::Missing;
    use crate::reconcile::verify;

    fn setup() -> (Connection, ListId) {
        let conn = db::open_memory().unwrap();
        let list = store::create_list(&conn, "home", "me").unwrap();
        (conn, list)
    }

    fn roots(engine: &Engine, list: ListId, names: &[&str]) -> Vec<TaskId> {
        names
            .iter()
            .map(|n| engine.create_root(list, n).unwrap())
            .collect()
    }

    fn order(conn: &Connection, list: ListId) -> Vec<TaskId> {
        store::fetch_all(conn, list)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect()
    }

    fn assert_consistent(conn: &Connection, list: ListId, max_depth: u32) {
        let tasks = store::fetch_all(conn, list).unwrap();
        let violations = verify(&tasks, max_depth);
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn create_root_appends() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b", "c"]);
        assert_eq!(order(&conn, list), ids);
        let c = store::fetch_one(&conn, ids[2]).unwrap();
        assert_eq!(c.position, 2);
        assert_eq!(c.global_order, 2);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn create_child_lands_after_parent_family() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b"]);
        let (a, b) = (ids[0], ids[1]);
        let c1 = engine.create_child(list, a, "c1").unwrap();
        let c2 = engine.create_child(list, a, "c2").unwrap();
        assert_eq!(order(&conn, list), vec![a, c1, c2, b]);
        let c2 = store::fetch_one(&conn, c2).unwrap();
        assert_eq!(c2.level, 1);
        assert_eq!(c2.position, 1);
        assert_eq!(c2.path.ids(), &[a, c2.id]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn create_child_under_child_hits_cap() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let b = engine.create_child(list, a, "b").unwrap();
        let err = engine.create_child(list, b, "c").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTarget(TargetError::DepthCap { parent, .. }) if parent == b
        ));
        assert_eq!(store::task_count(&conn, list).unwrap(), 2);
    }

    #[test]
    fn blank_content_rejected() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        assert!(matches!(
            engine.create_root(list, "  "),
            Err(Error::InvalidContent(_))
        ));
    }

    #[test]
    fn nest_last_root_under_previous() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b", "c", "d"]);
        engine.move_as_child(list, ids[3], ids[2]).unwrap();
        assert_eq!(order(&conn, list), ids);
        let d = store::fetch_one(&conn, ids[3]).unwrap();
        assert_eq!(d.level, 1);
        assert_eq!(d.parent_id, Some(ids[2]));
        assert_eq!(d.path.ids(), &[ids[2], ids[3]]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn two_nests_keep_flat_order() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b", "c", "d"]);
        engine.move_as_child(list, ids[1], ids[0]).unwrap();
        engine.move_as_child(list, ids[3], ids[2]).unwrap();
        assert_eq!(order(&conn, list), ids);
        let c = store::fetch_one(&conn, ids[2]).unwrap();
        assert_eq!(c.position, 1);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn nesting_parent_under_own_child_rejected() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let b = engine.create_child(list, a, "b").unwrap();
        let before = store::get_list(&conn, list).unwrap().revision;
        let err = engine.move_as_child(list, a, b).unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)), "{err}");
        assert_eq!(store::get_list(&conn, list).unwrap().revision, before);
        assert_eq!(order(&conn, list), vec![a, b]);
    }

    #[test]
    fn task_with_children_cannot_nest() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        engine.create_child(list, a, "b").unwrap();
        let c = engine.create_root(list, "c").unwrap();
        let err = engine.move_as_child(list, a, c).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTarget(TargetError::HasChildren { task, .. }) if task == a
        ));
    }

    #[test]
    fn deeper_cap_carries_descendants_along() {
        let (conn, list) = setup();
        let engine = Engine::with_max_depth(&conn, 2);
        let a = engine.create_root(list, "a").unwrap();
        let b = engine.create_child(list, a, "b").unwrap();
        let c = engine.create_root(list, "c").unwrap();
        engine.move_as_child(list, a, c).unwrap();
        let b = store::fetch_one(&conn, b).unwrap();
        assert_eq!(b.level, 2);
        assert_eq!(b.path.ids(), &[c, a, b.id]);
        assert_eq!(order(&conn, list), vec![c, a, b.id]);
        assert_consistent(&conn, list, 2);
    }

    #[test]
    fn nest_under_current_parent_moves_to_end() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let b = engine.create_child(list, a, "b").unwrap();
        let c = engine.create_child(list, a, "c").unwrap();
        engine.move_as_child(list, b, a).unwrap();
        assert_eq!(order(&conn, list), vec![a, c, b]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn reorder_roots_before_and_after() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b", "c", "d"]);
        engine
            .move_as_sibling(list, ids[3], Some(ids[1]), Placement::Before)
            .unwrap();
        assert_eq!(order(&conn, list), vec![ids[0], ids[3], ids[1], ids[2]]);
        engine
            .move_as_sibling(list, ids[0], Some(ids[2]), Placement::After)
            .unwrap();
        assert_eq!(order(&conn, list), vec![ids[3], ids[1], ids[2], ids[0]]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn reorder_without_reference_goes_to_an_end() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b", "c"]);
        engine
            .move_as_sibling(list, ids[2], None, Placement::Before)
            .unwrap();
        assert_eq!(order(&conn, list), vec![ids[2], ids[0], ids[1]]);
        engine
            .move_as_sibling(list, ids[2], None, Placement::After)
            .unwrap();
        assert_eq!(order(&conn, list), ids);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn reorder_moves_family_together() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let a1 = engine.create_child(list, a, "a1").unwrap();
        let b = engine.create_root(list, "b").unwrap();
        engine
            .move_as_sibling(list, a, Some(b), Placement::After)
            .unwrap();
        assert_eq!(order(&conn, list), vec![b, a, a1]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn reorder_next_to_child_reparents() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let a1 = engine.create_child(list, a, "a1").unwrap();
        let b = engine.create_root(list, "b").unwrap();
        engine
            .move_as_sibling(list, b, Some(a1), Placement::Before)
            .unwrap();
        let moved = store::fetch_one(&conn, b).unwrap();
        assert_eq!(moved.parent_id, Some(a));
        assert_eq!(moved.level, 1);
        assert_eq!(order(&conn, list), vec![a, b, a1]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn reorder_parent_among_children_rejected() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let a1 = engine.create_child(list, a, "a1").unwrap();
        let c = engine.create_root(list, "c").unwrap();
        engine.create_child(list, c, "c1").unwrap();
        let err = engine
            .move_as_sibling(list, c, Some(a1), Placement::After)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTarget(TargetError::HasChildren { .. })
        ));
    }

    #[test]
    fn reorder_relative_to_self_rejected() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let err = engine
            .move_as_sibling(list, a, Some(a), Placement::Before)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTarget(TargetError::SelfMove { .. })
        ));
    }

    #[test]
    fn nest_then_detach_round_trips() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let p = engine.create_root(list, "p").unwrap();
        let p1 = engine.create_child(list, p, "p1").unwrap();
        let x = engine.create_root(list, "x").unwrap();
        let p2 = engine.create_child(list, p, "p2").unwrap();

        engine.move_as_child(list, x, p).unwrap();
        engine.detach_to_root(list, x).unwrap();

        let x = store::fetch_one(&conn, x).unwrap();
        assert_eq!(x.level, 0);
        assert_eq!(x.path, TaskPath::root(x.id));
        let kids: Vec<_> = store::children(&conn, list, Some(p))
            .unwrap()
            .iter()
            .map(|t| (t.id, t.position))
            .collect();
        assert_eq!(kids, vec![(p1, 0), (p2, 1)]);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn detach_middle_child_compacts_siblings() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let c1 = engine.create_child(list, a, "c1").unwrap();
        let c2 = engine.create_child(list, a, "c2").unwrap();
        let c3 = engine.create_child(list, a, "c3").unwrap();
        engine.detach_to_root(list, c2).unwrap();
        assert_eq!(order(&conn, list), vec![a, c1, c3, c2]);
        assert_eq!(store::fetch_one(&conn, c3).unwrap().position, 1);
        assert_eq!(store::fetch_one(&conn, c2).unwrap().position, 1);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn delete_subtree_removes_family_and_compacts() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b", "c"]);
        let d = engine.create_child(list, ids[2], "d").unwrap();
        let e = engine.create_root(list, "e").unwrap();
        let removed = engine.delete_subtree(list, ids[2]).unwrap();
        assert_eq!(removed, 2);
        assert!(store::find(&conn, d).unwrap().is_none());
        assert_eq!(order(&conn, list), vec![ids[0], ids[1], e]);
        assert_eq!(store::fetch_one(&conn, e).unwrap().position, 2);
        assert_consistent(&conn, list, 1);
    }

    #[test]
    fn task_from_other_list_not_found() {
        let (conn, home) = setup();
        let work = store::create_list(&conn, "work", "me").unwrap();
        let engine = Engine::new(&conn);
        let a = engine.create_root(home, "a").unwrap();
        let b = engine.create_root(work, "b").unwrap();
        assert!(matches!(
            engine.delete_subtree(work, a),
            Err(Error::NotFound(Missing::Task { .. }))
        ));
        assert!(matches!(
            engine.move_as_child(work, b, a),
            Err(Error::OwnershipMismatch { parent, .. }) if parent == a
        ));
        assert_eq!(store::task_count(&conn, home).unwrap(), 1);
    }

    #[test]
    fn edits_leave_structure_alone() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let ids = roots(&engine, list, &["a", "b"]);
        engine.edit_content(list, ids[1], " bee ").unwrap();
        engine.set_done(list, ids[1], true).unwrap();
        let b = store::fetch_one(&conn, ids[1]).unwrap();
        assert_eq!(b.content, "bee");
        assert!(b.is_done);
        assert_eq!(b.position, 1);
        assert_eq!(order(&conn, list), ids);
    }

    #[test]
    fn every_commit_bumps_revision() {
        let (conn, list) = setup();
        let engine = Engine::new(&conn);
        let a = engine.create_root(list, "a").unwrap();
        let b = engine.create_root(list, "b").unwrap();
        engine.move_as_child(list, b, a).unwrap();
        engine.set_done(list, b, true).unwrap();
        engine.delete_subtree(list, a).unwrap();
        assert_eq!(store::get_list(&conn, list).unwrap().revision, 5);
    }

    #[test]
    fn atomic_rolls_back_on_error() {
        let (conn, list) = setup();
        let result: Result<()> = atomic(&conn, "doomed", || {
            Engine::new(&conn).create_root(list, "a")?;
            Err(Error::InvalidContent("stop".into()))
        });
        assert!(result.is_err());
        assert_eq!(store::task_count(&conn, list).unwrap(), 0);
        assert_eq!(store::get_list(&conn, list).unwrap().revision, 0);
    }
}
