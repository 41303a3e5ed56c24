mod app;
mod event;
mod tree;

use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self as ct_event, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::prelude::*;

use crate::watch::DbWatcher;
use app::App;
use event::{KeyAction, MouseAction};
use tasknest::gesture::ClassifierConfig;
use tasknest::service::{OwnershipGate, Request, TaskService};

pub fn run<G: OwnershipGate>(
    db_path: &str,
    service: &TaskService<G>,
    request: &Request,
    list_name: String,
    config: ClassifierConfig,
    poll_interval: u64,
) -> Result<()> {
    let mut app = App::new(service, request, list_name, config)?;

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, db_path, service, request, poll_interval);

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;

    result
}

fn run_loop<G: OwnershipGate>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    db_path: &str,
    service: &TaskService<G>,
    request: &Request,
    poll_interval: u64,
) -> Result<()> {
    let poll_duration = Duration::from_millis(poll_interval);
    let watcher = DbWatcher::new(db_path)?;

    loop {
        app.expire_notice(Instant::now());
        terminal.draw(|frame| tree::render(frame, app))?;

        if ct_event::poll(poll_duration)? {
            match ct_event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match event::handle_key(app, key) {
                        KeyAction::Quit => return Ok(()),
                        KeyAction::Refresh => app.resync(service, request)?,
                        KeyAction::Apply(mutation, selected) => {
                            app.apply(service, request, mutation, selected)?;
                        }
                        KeyAction::Continue => {}
                    }
                }
                Event::Mouse(mouse) => {
                    if event::handle_mouse(app, mouse) == MouseAction::Drop {
                        app.end_drag(service, request)?;
                    }
                }
                _ => {}
            }
        }

        // Another process wrote to the list. Mid-drag, wait for the drop.
        if !app.is_dragging() && !app.classifier.is_awaiting() && watcher.changed() {
            app.resync(service, request)?;
        }
    }
}
