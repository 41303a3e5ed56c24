use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use super::app::{App, InputMode, INDENT, ROW_HEIGHT};
use tasknest::gesture::Mode;
use tasknest::model::{Placement, TaskRow};

pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    let title = format!(" {} (rev {}) ", app.list_name, app.snapshot.revision);
    let block = Block::default().borders(Borders::ALL).title(title);
    app.viewport = block.inner(chunks[0]);
    app.scroll_to_cursor();
    frame.render_widget(block, chunks[0]);

    render_rows(frame, app);
    render_status(frame, app, chunks[1]);
}

fn render_rows(frame: &mut Frame, app: &App) {
    let area = app.viewport;
    let indicator = app.classifier.indicator();
    let dragged = app.classifier.dragged();

    for (slot, (index, row)) in app
        .rows()
        .iter()
        .enumerate()
        .skip(app.offset)
        .take(app.visible_rows())
        .enumerate()
    {
        let y = area.y + slot as u16 * ROW_HEIGHT;
        if y + ROW_HEIGHT > area.y + area.height {
            break;
        }
        let rect = Rect::new(area.x, y, area.width, ROW_HEIGHT);

        let mut style = Style::default();
        if index == app.cursor {
            style = style.bg(Color::DarkGray);
        }
        if dragged == Some(row.id) {
            style = style.add_modifier(Modifier::DIM);
        }

        let (above, below) = match indicator {
            Some(Mode::Reorder {
                reference,
                placement,
            }) if reference == row.id => (
                placement == Placement::Before,
                placement == Placement::After,
            ),
            _ => (false, false),
        };
        let nest_target = matches!(indicator, Some(Mode::Hierarchy { target }) if target == row.id);

        let lines = vec![
            row_line(row, above, nest_target),
            marker_line(row, below, area.width),
        ];
        frame.render_widget(Paragraph::new(lines).style(style), rect);
    }

    if app.rows().is_empty() {
        frame.render_widget(
            Paragraph::new("No tasks. Press A to add one.").style(Style::default().fg(Color::DarkGray)),
            area,
        );
    }
}

fn row_line(row: &TaskRow, insert_above: bool, nest_target: bool) -> Line<'static> {
    let indent = " ".repeat((row.level as u16 * INDENT) as usize);
    let lead = if insert_above { "▲ " } else { "  " };
    let icon_style = if row.is_done {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Green)
    };
    let mut content_style = Style::default().bold();
    if row.is_done {
        content_style = content_style.add_modifier(Modifier::CROSSED_OUT);
    }
    if nest_target {
        content_style = content_style.fg(Color::Yellow).add_modifier(Modifier::UNDERLINED);
    }
    let mut spans = vec![
        Span::raw(indent),
        Span::styled(lead, Style::default().fg(Color::Cyan)),
        Span::styled(format!("{} ", row.icon()), icon_style),
        Span::styled(row.content.clone(), content_style),
    ];
    if nest_target {
        spans.push(Span::styled("  ⤷ nest here", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn marker_line(row: &TaskRow, insert_below: bool, width: u16) -> Line<'static> {
    if !insert_below {
        return Line::raw("");
    }
    let indent = (row.level as u16 * INDENT) as usize;
    let rule = "─".repeat((width as usize).saturating_sub(indent));
    Line::from(vec![
        Span::raw(" ".repeat(indent)),
        Span::styled(rule, Style::default().fg(Color::Cyan)),
    ])
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let line = match (&app.input, &app.notice) {
        (InputMode::Add { parent, buf }, _) => {
            let target = parent.map_or_else(|| "root".to_string(), |p| format!("child of #{p}"));
            Line::from(vec![
                Span::styled(format!("new {target}: "), Style::default().fg(Color::Cyan)),
                Span::raw(format!("{buf}_")),
            ])
        }
        (InputMode::Edit { task, buf }, _) => Line::from(vec![
            Span::styled(format!("edit #{task}: "), Style::default().fg(Color::Cyan)),
            Span::raw(format!("{buf}_")),
        ]),
        (InputMode::Normal, Some((notice, _))) => {
            Line::styled(notice.clone(), Style::default().fg(Color::Red))
        }
        (InputMode::Normal, None) => Line::styled(
            "drag: middle=reorder, edges=nest | a/A add  e edit  space done  x delete  < unnest  q quit",
            Style::default().fg(Color::DarkGray),
        ),
    };
    frame.render_widget(Paragraph::new(line), area);
}
