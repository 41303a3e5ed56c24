use std::time::{Duration, Instant};

use anyhow::Result;
use log::{info, warn};
use ratatui::layout::Rect;

use tasknest::gesture::{Classifier, ClassifierConfig, Hover, Intent, Mode, Point, Settlement};
use tasknest::model::{Snapshot, TaskId, TaskRow};
use tasknest::service::{Mutation, OwnershipGate, Request, TaskService};

/// How long a failure notice stays on screen.
pub const NOTICE_TTL: Duration = Duration::from_secs(4);

/// Terminal lines per task row. Two lines give every row a top and a
/// bottom half for the before/after decision.
pub const ROW_HEIGHT: u16 = 2;

/// Columns of indentation per level.
pub const INDENT: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing the content of a new task, under `parent` when set.
    Add { parent: Option<TaskId>, buf: String },
    /// Typing replacement content for `task`.
    Edit { task: TaskId, buf: String },
}

pub struct App {
    pub list_name: String,
    pub snapshot: Snapshot,
    pub cursor: usize,
    pub offset: usize,
    pub classifier: Classifier,
    pub input: InputMode,
    pub notice: Option<(String, Instant)>,
    /// Inner area of the task list as last drawn.
    pub viewport: Rect,
}

impl App {
    pub fn new<G: OwnershipGate>(
        service: &TaskService<G>,
        request: &Request,
        list_name: String,
        config: ClassifierConfig,
    ) -> Result<Self> {
        let snapshot = service.snapshot(request)?;
        Ok(App {
            list_name,
            snapshot,
            cursor: 0,
            offset: 0,
            classifier: Classifier::new(config),
            input: InputMode::Normal,
            notice: None,
            viewport: Rect::default(),
        })
    }

    pub fn rows(&self) -> &[TaskRow] {
        &self.snapshot.rows
    }

    pub fn selected(&self) -> Option<&TaskRow> {
        self.snapshot.rows.get(self.cursor)
    }

    /// Reload the authoritative order, discarding anything shown locally.
    pub fn resync<G: OwnershipGate>(
        &mut self,
        service: &TaskService<G>,
        request: &Request,
    ) -> Result<()> {
        let selected = self.selected().map(|r| r.id);
        let snapshot = service.snapshot(request)?;
        self.show(snapshot, selected);
        Ok(())
    }

    fn show(&mut self, snapshot: Snapshot, selected: Option<TaskId>) {
        self.snapshot = snapshot;
        if let Some(i) = selected.and_then(|id| self.snapshot.rows.iter().position(|r| r.id == id)) {
            self.cursor = i;
        }
        if self.cursor >= self.snapshot.rows.len() {
            self.cursor = self.snapshot.rows.len().saturating_sub(1);
        }
        self.scroll_to_cursor();
    }

    /// Send one mutation, built against the revision on screen. Any
    /// failure resyncs and leaves a notice.
    pub fn apply<G: OwnershipGate>(
        &mut self,
        service: &TaskService<G>,
        request: &Request,
        mutation: Mutation,
        selected: Option<TaskId>,
    ) -> Result<bool> {
        let req = request.clone().at_revision(self.snapshot.revision);
        match service.apply(&req, mutation) {
            Ok(snapshot) => {
                let selected = snapshot.created.or(selected);
                self.show(snapshot, selected);
                Ok(true)
            }
            Err(e) => {
                self.set_notice(e.to_string());
                self.resync(service, request)?;
                Ok(false)
            }
        }
    }

    pub fn set_notice(&mut self, msg: String) {
        self.notice = Some((msg, Instant::now()));
    }

    pub fn expire_notice(&mut self, now: Instant) {
        if matches!(&self.notice, Some((_, at)) if now.duration_since(*at) >= NOTICE_TTL) {
            self.notice = None;
        }
    }

    pub fn move_up(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.scroll_to_cursor();
    }

    pub fn move_down(&mut self) {
        if !self.snapshot.rows.is_empty() && self.cursor < self.snapshot.rows.len() - 1 {
            self.cursor += 1;
        }
        self.scroll_to_cursor();
    }

    /// Rows that fit in the viewport.
    pub fn visible_rows(&self) -> usize {
        (self.viewport.height / ROW_HEIGHT).max(1) as usize
    }

    pub fn scroll_to_cursor(&mut self) {
        let visible = self.visible_rows();
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + visible {
            self.offset = self.cursor + 1 - visible;
        }
    }

    /// Index of the row drawn at terminal cell (`col`, `row`).
    pub fn row_at(&self, col: u16, row: u16) -> Option<usize> {
        let v = self.viewport;
        if col < v.x || col >= v.x + v.width || row < v.y || row >= v.y + v.height {
            return None;
        }
        let index = self.offset + ((row - v.y) / ROW_HEIGHT) as usize;
        (index < self.snapshot.rows.len()).then_some(index)
    }

    /// Bounding box of the row at `index`, from its indented start to the
    /// right edge of the viewport.
    pub fn row_bounds(&self, index: usize) -> tasknest::gesture::Rect {
        let v = self.viewport;
        let level = self.snapshot.rows.get(index).map_or(0, |r| r.level) as u16;
        let indent = (level * INDENT).min(v.width.saturating_sub(1));
        let slot = index.saturating_sub(self.offset) as u16;
        tasknest::gesture::Rect {
            x: f64::from(v.x + indent),
            y: f64::from(v.y + slot * ROW_HEIGHT),
            width: f64::from(v.width - indent),
            height: f64::from(ROW_HEIGHT),
        }
    }

    pub fn begin_drag(&mut self, col: u16, row: u16) {
        let Some(index) = self.row_at(col, row) else {
            return;
        };
        self.cursor = index;
        let id = self.snapshot.rows[index].id;
        self.classifier.begin(&self.snapshot.rows, id);
    }

    pub fn drag_to(&mut self, col: u16, row: u16) -> Mode {
        // Cell centers, so the top and bottom line of a row fall on
        // opposite sides of its midpoint.
        let pointer = Point {
            x: f64::from(col) + 0.5,
            y: f64::from(row) + 0.5,
        };
        let hovered = self.row_at(col, row);
        let bounds = hovered.map(|i| self.row_bounds(i));
        let hover = hovered.zip(bounds).map(|(i, bounds)| Hover {
            row: &self.snapshot.rows[i],
            bounds,
        });
        self.classifier.sample(&self.snapshot.rows, pointer, hover)
    }

    /// Finish a drag: issue the one mutation it asks for, if any, and settle.
    pub fn end_drag<G: OwnershipGate>(
        &mut self,
        service: &TaskService<G>,
        request: &Request,
    ) -> Result<()> {
        let Some(intent) = self.classifier.drop() else {
            return Ok(());
        };
        let task = match intent {
            Intent::Reorder { task, .. } | Intent::Nest { task, .. } => task,
        };
        let req = request.clone().at_revision(self.snapshot.revision);
        match service.apply(&req, Mutation::from(intent)) {
            Ok(snapshot) => {
                self.classifier.settle(Ok(()));
                info!("drop applied {intent:?}");
                self.show(snapshot, Some(task));
            }
            Err(e) => {
                if let Settlement::Resync { notice } = self.classifier.settle(Err(e.to_string())) {
                    warn!("drop {intent:?} failed: {notice}");
                    self.set_notice(notice);
                    self.resync(service, request)?;
                }
            }
        }
        Ok(())
    }

    pub fn cancel_drag(&mut self) {
        self.classifier.cancel();
    }

    pub fn is_dragging(&self) -> bool {
        self.classifier.dragged().is_some()
    }
}
