use crossterm::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};

use super::app::{App, InputMode};
use tasknest::model::TaskId;
use tasknest::service::Mutation;

/// Result of handling a key press.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Refresh,
    /// Apply a mutation, then keep the cursor on the given task.
    Apply(Mutation, Option<TaskId>),
    Continue,
}

/// What the event loop should do with a mouse event.
#[derive(Debug, PartialEq, Eq)]
pub enum MouseAction {
    Drop,
    Continue,
}

/// Handle a key press. Returns an action indicating what the event loop should do.
pub fn handle_key(app: &mut App, key: KeyEvent) -> KeyAction {
    if app.input != InputMode::Normal {
        return handle_input(app, key);
    }

    match key.code {
        KeyCode::Esc if app.is_dragging() => {
            app.cancel_drag();
            KeyAction::Continue
        }
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('j') | KeyCode::Down => {
            app.move_down();
            KeyAction::Continue
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.move_up();
            KeyAction::Continue
        }
        KeyCode::Char('r') => KeyAction::Refresh,
        KeyCode::Char('a') => {
            let parent = app.selected().map(|r| r.parent_id.unwrap_or(r.id));
            app.input = InputMode::Add {
                parent,
                buf: String::new(),
            };
            KeyAction::Continue
        }
        KeyCode::Char('A') => {
            app.input = InputMode::Add {
                parent: None,
                buf: String::new(),
            };
            KeyAction::Continue
        }
        KeyCode::Char('e') => {
            if let Some(row) = app.selected() {
                app.input = InputMode::Edit {
                    task: row.id,
                    buf: row.content.clone(),
                };
            }
            KeyAction::Continue
        }
        KeyCode::Char(' ') => match app.selected() {
            Some(row) => KeyAction::Apply(
                Mutation::SetDone {
                    task: row.id,
                    done: !row.is_done,
                },
                Some(row.id),
            ),
            None => KeyAction::Continue,
        },
        KeyCode::Char('x') => match app.selected() {
            Some(row) => KeyAction::Apply(Mutation::DeleteSubtree { task: row.id }, None),
            None => KeyAction::Continue,
        },
        KeyCode::Char('<') => match app.selected() {
            Some(row) if row.parent_id.is_some() => {
                KeyAction::Apply(Mutation::DetachToRoot { task: row.id }, Some(row.id))
            }
            _ => KeyAction::Continue,
        },
        _ => KeyAction::Continue,
    }
}

fn handle_input(app: &mut App, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            app.input = InputMode::Normal;
            KeyAction::Continue
        }
        KeyCode::Enter => {
            let input = std::mem::replace(&mut app.input, InputMode::Normal);
            match input {
                InputMode::Add { parent, buf } => {
                    let content = buf;
                    let mutation = match parent {
                        Some(parent) => Mutation::CreateChild { parent, content },
                        None => Mutation::CreateRoot { content },
                    };
                    KeyAction::Apply(mutation, None)
                }
                InputMode::Edit { task, buf } => KeyAction::Apply(
                    Mutation::Edit {
                        task,
                        content: buf,
                    },
                    Some(task),
                ),
                InputMode::Normal => KeyAction::Continue,
            }
        }
        KeyCode::Backspace => {
            if let InputMode::Add { buf, .. } | InputMode::Edit { buf, .. } = &mut app.input {
                buf.pop();
            }
            KeyAction::Continue
        }
        KeyCode::Char(c) => {
            if let InputMode::Add { buf, .. } | InputMode::Edit { buf, .. } = &mut app.input {
                buf.push(c);
            }
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

/// Feed left-button press, drag and release into the classifier.
pub fn handle_mouse(app: &mut App, mouse: MouseEvent) -> MouseAction {
    if app.input != InputMode::Normal {
        return MouseAction::Continue;
    }
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            app.begin_drag(mouse.column, mouse.row);
            MouseAction::Continue
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            app.drag_to(mouse.column, mouse.row);
            MouseAction::Continue
        }
        MouseEventKind::Up(MouseButton::Left) => MouseAction::Drop,
        MouseEventKind::ScrollDown => {
            app.move_down();
            MouseAction::Continue
        }
        MouseEventKind::ScrollUp => {
            app.move_up();
            MouseAction::Continue
        }
        _ => MouseAction::Continue,
    }
}
