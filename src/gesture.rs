//! Drag-intent classifier.
//!
//! A pure state machine: the UI feeds it pointer samples and the bounds of
//! whatever row is under the pointer, and on drop it yields at most one
//! [`Intent`]. It never touches storage; the caller turns the intent into a
//! mutation and reports the outcome back through [`Classifier::settle`].

use log::debug;

use crate::model::{Placement, TaskId, TaskRow};
use crate::validate::{check_nest, DEFAULT_MAX_DEPTH};

/// Width fraction of each outer band.
pub const DEFAULT_BAND_FRACTION: f64 = 0.425;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub band_fraction: f64,
    pub max_depth: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            band_fraction: DEFAULT_BAND_FRACTION,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// The row under the pointer and where it is drawn.
#[derive(Debug, Clone, Copy)]
pub struct Hover<'a> {
    pub row: &'a TaskRow,
    pub bounds: Rect,
}

/// What a drop would do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    None,
    Reorder { reference: TaskId, placement: Placement },
    Hierarchy { target: TaskId },
}

/// The single mutation a drop asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Reorder {
        task: TaskId,
        reference: TaskId,
        placement: Placement,
    },
    Nest {
        task: TaskId,
        parent: TaskId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Dragging(Drag),
    Awaiting(Intent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drag {
    pub dragged: TaskRow,
    /// Levels of descendants below the dragged row.
    pub height: u32,
    pub mode: Mode,
}

/// How the caller should proceed once the mutation has returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Done,
    /// Drop the local order, reload from the store and show `notice`.
    Resync { notice: String },
}

/// Levels below `task` among the display rows.
pub fn subtree_height(rows: &[TaskRow], task: &TaskRow) -> u32 {
    rows.iter()
        .filter(|r| task.is_ancestor_of(r))
        .map(|r| r.level - task.level)
        .max()
        .unwrap_or(0)
}

fn reorder_mode(
    rows: &[TaskRow],
    dragged: &TaskRow,
    height: u32,
    hovered: &TaskRow,
    pointer: Point,
    bounds: Rect,
    max_depth: u32,
) -> Mode {
    if dragged.is_ancestor_of(hovered) {
        return Mode::None;
    }
    if let Some(parent_id) = hovered.parent_id {
        let fits = rows
            .iter()
            .find(|r| r.id == parent_id)
            .is_some_and(|parent| check_nest(dragged, height, parent, max_depth).is_ok());
        if !fits {
            return Mode::None;
        }
    }
    let placement = if pointer.y < bounds.mid_y() {
        Placement::Before
    } else {
        Placement::After
    };
    Mode::Reorder {
        reference: hovered.id,
        placement,
    }
}

/// Classify one pointer sample. Depends only on its arguments.
pub fn classify(
    config: &ClassifierConfig,
    rows: &[TaskRow],
    dragged: &TaskRow,
    height: u32,
    pointer: Point,
    hover: Option<Hover>,
) -> Mode {
    let Some(Hover { row: hovered, bounds }) = hover else {
        return Mode::None;
    };
    if hovered.id == dragged.id {
        return Mode::None;
    }
    let band = bounds.width * config.band_fraction;
    let offset = pointer.x - bounds.x;
    let in_outer_band = offset < band || offset >= bounds.width - band;
    if in_outer_band && check_nest(dragged, height, hovered, config.max_depth).is_ok() {
        return Mode::Hierarchy { target: hovered.id };
    }
    reorder_mode(rows, dragged, height, hovered, pointer, bounds, config.max_depth)
}

pub struct Classifier {
    config: ClassifierConfig,
    phase: Phase,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.phase, Phase::Awaiting(_))
    }

    /// Start dragging `task`. Ignored (returns false) unless idle or when the
    /// task is not among `rows`.
    pub fn begin(&mut self, rows: &[TaskRow], task: TaskId) -> bool {
        if !matches!(self.phase, Phase::Idle) {
            debug!("ignoring drag of task {task}: classifier busy");
            return false;
        }
        let Some(dragged) = rows.iter().find(|r| r.id == task) else {
            return false;
        };
        self.phase = Phase::Dragging(Drag {
            height: subtree_height(rows, dragged),
            dragged: dragged.clone(),
            mode: Mode::None,
        });
        true
    }

    /// Recompute the mode from a pointer sample. Returns `Mode::None` when no
    /// drag is in progress.
    pub fn sample(&mut self, rows: &[TaskRow], pointer: Point, hover: Option<Hover>) -> Mode {
        let Phase::Dragging(drag) = &mut self.phase else {
            return Mode::None;
        };
        drag.mode = classify(&self.config, rows, &drag.dragged, drag.height, pointer, hover);
        drag.mode
    }

    /// Finish the drag. A drop with an active mode yields its intent and
    /// waits for [`Self::settle`]; otherwise the classifier goes idle.
    pub fn drop(&mut self) -> Option<Intent> {
        let Phase::Dragging(drag) = &self.phase else {
            return None;
        };
        let task = drag.dragged.id;
        let intent = match drag.mode {
            Mode::None => None,
            Mode::Reorder {
                reference,
                placement,
            } => Some(Intent::Reorder {
                task,
                reference,
                placement,
            }),
            Mode::Hierarchy { target } => Some(Intent::Nest {
                task,
                parent: target,
            }),
        };
        self.phase = match intent {
            Some(intent) => Phase::Awaiting(intent),
            None => Phase::Idle,
        };
        intent
    }

    /// Abandon the drag without issuing anything.
    pub fn cancel(&mut self) {
        if let Phase::Dragging(_) = self.phase {
            self.phase = Phase::Idle;
        }
    }

    /// Report the outcome of the request issued for the last drop.
    pub fn settle(&mut self, outcome: Result<(), String>) -> Settlement {
        if let Phase::Awaiting(intent) = &self.phase {
            debug!("settled {intent:?}: {outcome:?}");
        }
        self.phase = Phase::Idle;
        match outcome {
            Ok(()) => Settlement::Done,
            Err(notice) => Settlement::Resync { notice },
        }
    }

    /// Current drop target and mode, for drawing the indicator.
    pub fn indicator(&self) -> Option<Mode> {
        match &self.phase {
            Phase::Dragging(drag) if drag.mode != Mode::None => Some(drag.mode),
            _ => None,
        }
    }

    pub fn dragged(&self) -> Option<TaskId> {
        match &self.phase {
            Phase::Dragging(drag) => Some(drag.dragged.id),
            _ => None,
        }
    }
}
