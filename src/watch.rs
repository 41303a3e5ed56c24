use std::path::Path;
use std::sync::mpsc::{self, Receiver};

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

/// Notices writes to the database made by other processes.
pub struct DbWatcher {
    // Events stop when the watcher is dropped.
    _watcher: RecommendedWatcher,
    rx: Receiver<()>,
}

impl DbWatcher {
    pub fn new(db_path: &str) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })
        .context("failed to create file watcher")?;

        // SQLite writes through -wal/-journal files next to the database.
        let path = Path::new(db_path);
        let watch_path = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", watch_path.display()))?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// True if anything changed since the last call. Never blocks.
    pub fn changed(&self) -> bool {
        let mut any = false;
        while self.rx.try_recv().is_ok() {
            any = true;
        }
        any
    }
}
