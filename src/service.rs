//! Entry points for clients: each call is gated on list ownership, checked
//! against the revision the client last saw, run through the engine, and
//! answered with the full ordered snapshot of the list.

use log::{info, warn};
use rusqlite::Connection;

use crate::engine::{atomic, Engine};
use crate::error::{Error, Result};
use crate::gesture::Intent;
use crate::model::{List, ListId, Placement, Snapshot, Task, TaskId};
use crate::reconcile::display_rows;
use crate::store;
use crate::validate::DEFAULT_MAX_DEPTH;

/// Decides whether a requester may read or change a list.
pub trait OwnershipGate {
    fn confirm(&self, requester: &str, list: &List) -> Result<()>;
}

/// Only the recorded owner may touch a list.
pub struct ListOwnerGate;

impl OwnershipGate for ListOwnerGate {
    fn confirm(&self, requester: &str, list: &List) -> Result<()> {
        if list.owner == requester {
            Ok(())
        } else {
            Err(Error::Forbidden {
                requester: requester.to_string(),
                list_id: list.id,
            })
        }
    }
}

/// Lets everyone through.
pub struct AllowAll;

impl OwnershipGate for AllowAll {
    fn confirm(&self, _requester: &str, _list: &List) -> Result<()> {
        Ok(())
    }
}

/// Who is asking, about which list, and from which revision of it.
#[derive(Debug, Clone)]
pub struct Request {
    pub requester: String,
    pub list_id: ListId,
    /// Revision the client rendered from; `None` skips the staleness check.
    pub expected_revision: Option<i64>,
}

impl Request {
    pub fn new(requester: impl Into<String>, list_id: ListId) -> Self {
        Self {
            requester: requester.into(),
            list_id,
            expected_revision: None,
        }
    }

    pub fn at_revision(mut self, revision: i64) -> Self {
        self.expected_revision = Some(revision);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateRoot {
        content: String,
    },
    CreateChild {
        parent: TaskId,
        content: String,
    },
    MoveAsSibling {
        task: TaskId,
        reference: Option<TaskId>,
        placement: Placement,
    },
    MoveAsChild {
        task: TaskId,
        parent: TaskId,
    },
    DetachToRoot {
        task: TaskId,
    },
    DeleteSubtree {
        task: TaskId,
    },
    Edit {
        task: TaskId,
        content: String,
    },
    SetDone {
        task: TaskId,
        done: bool,
    },
}

impl From<Intent> for Mutation {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Reorder {
                task,
                reference,
                placement,
            } => Self::MoveAsSibling {
                task,
                reference: Some(reference),
                placement,
            },
            Intent::Nest { task, parent } => Self::MoveAsChild { task, parent },
        }
    }
}

pub struct TaskService<'c, G> {
    conn: &'c Connection,
    gate: G,
    max_depth: u32,
}

impl<'c, G: OwnershipGate> TaskService<'c, G> {
    pub fn new(conn: &'c Connection, gate: G) -> Self {
        Self {
            conn,
            gate,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    fn engine(&self) -> Engine<'c> {
        Engine::with_max_depth(self.conn, self.max_depth)
    }

    fn admit(&self, req: &Request) -> Result<List> {
        let list = store::get_list(self.conn, req.list_id)?;
        self.gate.confirm(&req.requester, &list)?;
        if let Some(expected) = req.expected_revision {
            if expected != list.revision {
                return Err(Error::ConcurrentMutationConflict {
                    list_id: list.id,
                    expected,
                    actual: list.revision,
                });
            }
        }
        Ok(list)
    }

    /// Apply one mutation and return the list as it now stands.
    pub fn apply(&self, req: &Request, mutation: Mutation) -> Result<Snapshot> {
        let result = atomic(self.conn, "service_apply", || {
            self.admit(req)?;
            let engine = self.engine();
            let list_id = req.list_id;
            let mut created = None;
            match &mutation {
                Mutation::CreateRoot { content } => {
                    created = Some(engine.create_root(list_id, content)?);
                }
                Mutation::CreateChild { parent, content } => {
                    created = Some(engine.create_child(list_id, *parent, content)?);
                }
                Mutation::MoveAsSibling {
                    task,
                    reference,
                    placement,
                } => engine.move_as_sibling(list_id, *task, *reference, *placement)?,
                Mutation::MoveAsChild { task, parent } => {
                    engine.move_as_child(list_id, *task, *parent)?
                }
                Mutation::DetachToRoot { task } => engine.detach_to_root(list_id, *task)?,
                Mutation::DeleteSubtree { task } => {
                    engine.delete_subtree(list_id, *task)?;
                }
                Mutation::Edit { task, content } => engine.edit_content(list_id, *task, content)?,
                Mutation::SetDone { task, done } => engine.set_done(list_id, *task, *done)?,
            }
            let mut snapshot = self.read_snapshot(list_id)?;
            snapshot.created = created;
            Ok(snapshot)
        });
        match &result {
            Ok(snapshot) => info!(
                "{} applied {mutation:?} to list {} (revision {})",
                req.requester, req.list_id, snapshot.revision
            ),
            Err(e) => warn!(
                "{} failed {mutation:?} on list {}: {e}",
                req.requester, req.list_id
            ),
        }
        result
    }

    /// Ordered rows of the list, for rendering.
    pub fn snapshot(&self, req: &Request) -> Result<Snapshot> {
        self.admit(req)?;
        self.read_snapshot(req.list_id)
    }

    /// Full task records in global order.
    pub fn tasks(&self, req: &Request) -> Result<Vec<Task>> {
        self.admit(req)?;
        store::fetch_all(self.conn, req.list_id)
    }

    fn read_snapshot(&self, list_id: ListId) -> Result<Snapshot> {
        let list = store::get_list(self.conn, list_id)?;
        let tasks = store::fetch_all(self.conn, list_id)?;
        Ok(Snapshot {
            list_id,
            revision: list.revision,
            rows: display_rows(&tasks),
            created: None,
        })
    }

    pub fn create_list(&self, name: &str, owner: &str) -> Result<List> {
        let id = store::create_list(self.conn, name, owner)?;
        info!("created list {id} '{name}' owned by {owner}");
        store::get_list(self.conn, id)
    }

    /// Resolve a list by numeric id or by name.
    pub fn resolve_list(&self, key: &str) -> Result<List> {
        match key.parse::<ListId>() {
            Ok(id) => store::get_list(self.conn, id),
            Err(_) => store::find_list_by_name(self.conn, key),
        }
    }

    pub fn lists(&self) -> Result<Vec<List>> {
        store::all_lists(self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::TargetError;

    fn setup() -> (Connection, ListId) {
        let conn = db::open_memory().unwrap();
        let list = store::create_list(&conn, "home", "ana").unwrap();
        (conn, list)
    }

    fn add(svc: &TaskService<impl OwnershipGate>, list: ListId, content: &str) -> TaskId {
        let snap = svc
            .apply(
                &Request::new("ana", list),
                Mutation::CreateRoot {
                    content: content.into(),
                },
            )
            .unwrap();
        snap.created.unwrap()
    }

    #[test]
    fn apply_returns_ordered_snapshot() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, ListOwnerGate);
        let a = add(&svc, list, "a");
        let b = add(&svc, list, "b");
        let snap = svc
            .apply(
                &Request::new("ana", list),
                Mutation::MoveAsChild { task: b, parent: a },
            )
            .unwrap();
        assert_eq!(snap.ids(), vec![a, b]);
        assert!(snap.row(a).unwrap().has_children);
        assert_eq!(snap.row(b).unwrap().level, 1);
        assert_eq!(snap.revision, 3);
    }

    #[test]
    fn stranger_is_forbidden() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, ListOwnerGate);
        let err = svc
            .apply(
                &Request::new("bob", list),
                Mutation::CreateRoot {
                    content: "x".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert_eq!(store::task_count(&conn, list).unwrap(), 0);
        assert!(svc.snapshot(&Request::new("bob", list)).is_err());
    }

    #[test]
    fn allow_all_lets_anyone_in() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, AllowAll);
        assert!(svc.snapshot(&Request::new("bob", list)).is_ok());
    }

    #[test]
    fn stale_revision_conflicts_without_writing() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, ListOwnerGate);
        let a = add(&svc, list, "a");
        let err = svc
            .apply(
                &Request::new("ana", list).at_revision(0),
                Mutation::DeleteSubtree { task: a },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConcurrentMutationConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store::task_count(&conn, list).unwrap(), 1);

        let snap = svc
            .apply(
                &Request::new("ana", list).at_revision(1),
                Mutation::DeleteSubtree { task: a },
            )
            .unwrap();
        assert!(snap.rows.is_empty());
    }

    #[test]
    fn rejected_mutation_leaves_revision_alone() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, ListOwnerGate);
        let a = add(&svc, list, "a");
        let err = svc
            .apply(
                &Request::new("ana", list),
                Mutation::MoveAsChild { task: a, parent: a },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTarget(TargetError::SelfMove { task }) if task == a
        ));
        assert_eq!(store::get_list(&conn, list).unwrap().revision, 1);
    }

    #[test]
    fn intent_maps_to_mutation() {
        assert_eq!(
            Mutation::from(Intent::Nest { task: 1, parent: 2 }),
            Mutation::MoveAsChild { task: 1, parent: 2 }
        );
        assert_eq!(
            Mutation::from(Intent::Reorder {
                task: 1,
                reference: 2,
                placement: Placement::Before
            }),
            Mutation::MoveAsSibling {
                task: 1,
                reference: Some(2),
                placement: Placement::Before
            }
        );
    }

    #[test]
    fn create_reports_new_id() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, ListOwnerGate);
        let req = Request::new("ana", list);
        let a = add(&svc, list, "a");
        let b = add(&svc, list, "b");
        // The child lands between a and b, so it is not the last row.
        let snap = svc
            .apply(
                &req,
                Mutation::CreateChild {
                    parent: a,
                    content: "a1".into(),
                },
            )
            .unwrap();
        let child = snap.created.unwrap();
        assert_eq!(snap.ids(), vec![a, child, b]);
        assert_eq!(snap.row(child).unwrap().content, "a1");

        let snap = svc.apply(&req, Mutation::SetDone { task: b, done: true }).unwrap();
        assert_eq!(snap.created, None);
        assert_eq!(svc.snapshot(&req).unwrap().created, None);
    }

    #[test]
    fn resolve_list_by_id_or_name() {
        let (conn, list) = setup();
        let svc = TaskService::new(&conn, AllowAll);
        assert_eq!(svc.resolve_list("home").unwrap().id, list);
        assert_eq!(svc.resolve_list(&list.to_string()).unwrap().name, "home");
        assert!(svc.resolve_list("work").is_err());
    }
}
