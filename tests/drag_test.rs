use tasknest::db;
use tasknest::gesture::{
    Classifier, ClassifierConfig, Hover, Intent, Mode, Phase, Point, Rect, Settlement,
};
use tasknest::model::{Placement, Snapshot, TaskId};
use tasknest::service::{ListOwnerGate, Mutation, Request, TaskService};
use tasknest::store;

const WIDTH: f64 = 80.0;
const ROW: f64 = 2.0;

fn bounds(snapshot: &Snapshot, id: TaskId) -> Rect {
    let index = snapshot.rows.iter().position(|r| r.id == id).unwrap();
    Rect {
        x: 0.0,
        y: index as f64 * ROW,
        width: WIDTH,
        height: ROW,
    }
}

fn hover(snapshot: &Snapshot, id: TaskId) -> Option<Hover<'_>> {
    Some(Hover {
        row: snapshot.row(id).unwrap(),
        bounds: bounds(snapshot, id),
    })
}

fn left_edge(snapshot: &Snapshot, id: TaskId) -> Point {
    let b = bounds(snapshot, id);
    Point {
        x: b.x + 1.0,
        y: b.y + 0.5,
    }
}

fn center(snapshot: &Snapshot, id: TaskId, lower: bool) -> Point {
    let b = bounds(snapshot, id);
    Point {
        x: b.x + b.width / 2.0,
        y: if lower { b.y + 1.5 } else { b.y + 0.5 },
    }
}

/// Drop `intent` through the service and settle the classifier.
fn commit(
    svc: &TaskService<ListOwnerGate>,
    req: &Request,
    classifier: &mut Classifier,
    snapshot: &mut Snapshot,
    intent: Intent,
) -> Settlement {
    let pinned = req.clone().at_revision(snapshot.revision);
    match svc.apply(&pinned, Mutation::from(intent)) {
        Ok(next) => {
            *snapshot = next;
            classifier.settle(Ok(()))
        }
        Err(e) => {
            let settlement = classifier.settle(Err(e.to_string()));
            *snapshot = svc.snapshot(req).unwrap();
            settlement
        }
    }
}

#[test]
fn drag_to_nest_then_reorder() {
    let conn = db::open_memory().unwrap();
    let list = store::create_list(&conn, "chores", "ana").unwrap();
    let svc = TaskService::new(&conn, ListOwnerGate);
    let req = Request::new("ana", list);
    for name in ["a", "b", "c"] {
        svc.apply(
            &req,
            Mutation::CreateRoot {
                content: name.into(),
            },
        )
        .unwrap();
    }
    let mut snapshot = svc.snapshot(&req).unwrap();
    let ids = snapshot.ids();
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    let mut classifier = Classifier::new(ClassifierConfig::default());

    // Drag C onto the left edge of A: nest.
    assert!(classifier.begin(&snapshot.rows, c));
    let mode = classifier.sample(&snapshot.rows, left_edge(&snapshot, a), hover(&snapshot, a));
    assert_eq!(mode, Mode::Hierarchy { target: a });
    let intent = classifier.drop().unwrap();
    assert_eq!(intent, Intent::Nest { task: c, parent: a });
    assert_eq!(
        commit(&svc, &req, &mut classifier, &mut snapshot, intent),
        Settlement::Done
    );
    assert_eq!(snapshot.ids(), vec![a, c, b]);
    assert_eq!(snapshot.row(c).unwrap().level, 1);

    // Drag B over the lower half of A's middle: after A, as a root.
    classifier.begin(&snapshot.rows, b);
    classifier.sample(&snapshot.rows, center(&snapshot, a, false), hover(&snapshot, a));
    let mode = classifier.sample(&snapshot.rows, center(&snapshot, a, true), hover(&snapshot, a));
    assert_eq!(
        mode,
        Mode::Reorder {
            reference: a,
            placement: Placement::After
        }
    );
    let intent = classifier.drop().unwrap();
    commit(&svc, &req, &mut classifier, &mut snapshot, intent);
    // B sits right after A among the roots, so after A's family.
    assert_eq!(snapshot.ids(), vec![a, c, b]);
    assert_eq!(classifier.phase(), &Phase::Idle);
}

#[test]
fn edge_of_child_falls_back_to_reorder() {
    let conn = db::open_memory().unwrap();
    let list = store::create_list(&conn, "chores", "ana").unwrap();
    let svc = TaskService::new(&conn, ListOwnerGate);
    let req = Request::new("ana", list);
    let a = svc
        .apply(&req, Mutation::CreateRoot { content: "a".into() })
        .unwrap()
        .ids()[0];
    let snap = svc
        .apply(
            &req,
            Mutation::CreateChild {
                parent: a,
                content: "a1".into(),
            },
        )
        .unwrap();
    let a1 = snap.ids()[1];
    let mut snapshot = svc
        .apply(&req, Mutation::CreateRoot { content: "d".into() })
        .unwrap();
    let d = snapshot.ids()[2];

    let mut classifier = Classifier::new(ClassifierConfig::default());
    classifier.begin(&snapshot.rows, d);
    let mode = classifier.sample(
        &snapshot.rows,
        left_edge(&snapshot, a1),
        hover(&snapshot, a1),
    );
    assert_eq!(
        mode,
        Mode::Reorder {
            reference: a1,
            placement: Placement::Before
        }
    );
    let intent = classifier.drop().unwrap();
    assert_eq!(
        commit(&svc, &req, &mut classifier, &mut snapshot, intent),
        Settlement::Done
    );
    assert_eq!(snapshot.ids(), vec![a, d, a1]);
    assert_eq!(snapshot.row(d).unwrap().level, 1);
}

#[test]
fn failed_drop_resyncs_and_unblocks() {
    let conn = db::open_memory().unwrap();
    let list = store::create_list(&conn, "chores", "ana").unwrap();
    let svc = TaskService::new(&conn, ListOwnerGate);
    let req = Request::new("ana", list);
    for name in ["a", "b"] {
        svc.apply(
            &req,
            Mutation::CreateRoot {
                content: name.into(),
            },
        )
        .unwrap();
    }
    let mut snapshot = svc.snapshot(&req).unwrap();
    let (a, b) = (snapshot.ids()[0], snapshot.ids()[1]);
    let mut classifier = Classifier::new(ClassifierConfig::default());

    classifier.begin(&snapshot.rows, b);
    classifier.sample(&snapshot.rows, left_edge(&snapshot, a), hover(&snapshot, a));
    let intent = classifier.drop().unwrap();

    // While the request is out, a new drag is ignored.
    assert!(!classifier.begin(&snapshot.rows, a));

    // Another client deletes the target first.
    svc.apply(&req, Mutation::DeleteSubtree { task: a }).unwrap();

    let settlement = commit(&svc, &req, &mut classifier, &mut snapshot, intent);
    assert!(matches!(settlement, Settlement::Resync { ref notice } if notice.contains("revision")));
    assert_eq!(snapshot.ids(), vec![b]);
    assert!(classifier.begin(&snapshot.rows, b));
}
