use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, BrowseMode, OverlayState};
use crate::list::{PageLink, PagedTodos, TodoFeed};
use crate::storage::{StorageHandle, TodoRecord};

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    pager: &PagedTodos<StorageHandle>,
    feed: &TodoFeed<StorageHandle>,
    list_state: &mut ListState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    let (items, title) = match state.mode {
        BrowseMode::Paged => (pager.state().items(), "Todos (paged)"),
        BrowseMode::Endless => (feed.state().items(), "Todos (endless)"),
    };

    let number_for = |index: usize| match state.mode {
        BrowseMode::Paged => pager.display_number(index),
        BrowseMode::Endless => feed.display_number(index),
    };

    let title_width = (vertical[0].width as usize).saturating_sub(30).max(10);
    let mut rows = Vec::with_capacity(items.len());
    for (index, todo) in items.iter().enumerate() {
        rows.push(ListItem::new(render_row(
            todo,
            number_for(index),
            state.pending.is_pending(todo.id),
            title_width,
        )));
    }
    if rows.is_empty() {
        rows.push(ListItem::new("No todos yet. Press `a` to create one."));
    }

    let list = List::new(rows)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, vertical[0], list_state);

    let footer = Paragraph::new(vec![
        Line::from(Span::styled(
            window_summary(state, pager, feed),
            Style::default().fg(Color::Gray),
        )),
        build_status_line(state),
    ]);
    frame.render_widget(footer, vertical[1]);

    render_overlay(frame, state);
}

fn render_row(
    todo: &TodoRecord,
    number: usize,
    pending: bool,
    title_width: usize,
) -> Line<'static> {
    let check = if todo.completed { "[x]" } else { "[ ]" };
    let title_style = if todo.completed {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };
    let mut spans = vec![
        Span::styled(format!("{number:>4} "), Style::default().fg(Color::Yellow)),
        Span::raw(format!("{check} ")),
        Span::styled(truncate_to_width(&todo.title, title_width), title_style),
    ];
    if todo.content.is_some() {
        spans.push(Span::styled(" +", Style::default().fg(Color::Cyan)));
    }
    if pending {
        spans.push(Span::styled(
            " …",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ));
    }
    spans.push(Span::styled(
        format!("  {}", format_date(todo.created_at)),
        Style::default().fg(Color::Gray),
    ));
    Line::from(spans)
}

fn window_summary(
    state: &AppState,
    pager: &PagedTodos<StorageHandle>,
    feed: &TodoFeed<StorageHandle>,
) -> String {
    match state.mode {
        BrowseMode::Paged => {
            let total = pager.state().total_count();
            if total == 0 {
                return String::from("0 todos");
            }
            format!(
                "Page {}/{} • {}-{} of {} • {}",
                pager.current_page(),
                pager.total_pages(),
                pager.first_item_position(),
                pager.last_item_position(),
                total,
                page_strip(&pager.page_links(), pager.current_page()),
            )
        }
        BrowseMode::Endless => {
            let loaded = feed.state().len();
            let total = feed.state().total_count();
            if feed.state().is_loading_more() {
                format!("Loaded {loaded} of {total} • loading more…")
            } else if feed.state().has_more() {
                format!("Loaded {loaded} of {total} • more available")
            } else {
                format!("Loaded {loaded} of {total} • everything is here")
            }
        }
    }
}

fn build_status_line(state: &AppState) -> Line<'static> {
    let mode = match state.mode {
        BrowseMode::Paged => "Paged",
        BrowseMode::Endless => "Endless",
    };
    let mut spans = vec![
        Span::raw("View: "),
        Span::styled(mode, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" | User: "),
        Span::styled(
            state
                .user_label
                .clone()
                .unwrap_or_else(|| "(signed out)".into()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Cyan),
        ));
    }
    Line::from(spans)
}

/// Renders the page-link strip, e.g. `1 … 3 4 [5] 6 7 … 9`.
fn page_strip(links: &[PageLink], current: usize) -> String {
    let mut parts = Vec::with_capacity(links.len());
    for link in links {
        match link {
            PageLink::Gap => parts.push(String::from("…")),
            PageLink::Page(page) if *page == current => parts.push(format!("[{page}]")),
            PageLink::Page(page) => parts.push(page.to_string()),
        }
    }
    parts.join(" ")
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    let Some(overlay) = state.overlay() else {
        return;
    };
    let area = centered_rect(60, 3, frame.size());
    frame.render_widget(Clear, area);
    match overlay {
        OverlayState::NewTodo(draft) => {
            let input = Paragraph::new(draft.title.as_str())
                .block(Block::default().title("New todo").borders(Borders::ALL));
            frame.render_widget(input, area);
            set_input_cursor(frame, area, &draft.title);
        }
        OverlayState::RenameTodo(draft) => {
            let input = Paragraph::new(draft.title.as_str())
                .block(Block::default().title("Rename todo").borders(Borders::ALL));
            frame.render_widget(input, area);
            set_input_cursor(frame, area, &draft.title);
        }
        OverlayState::DeleteTodo(draft) => {
            let prompt = Paragraph::new(format!(
                "Delete \"{}\"? Enter confirms, Esc cancels.",
                truncate_to_width(&draft.title, 40)
            ))
            .block(
                Block::default()
                    .title("Delete todo")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
            frame.render_widget(prompt, area);
        }
    }
}

fn set_input_cursor(frame: &mut Frame, area: Rect, text: &str) {
    let x = area.x + 1 + text.width().min(area.width.saturating_sub(2) as usize) as u16;
    frame.set_cursor(x, area.y + 1);
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = area.width * percent_x / 100;
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect {
        x,
        y,
        width,
        height: height.min(area.height),
    }
}

/// Cuts a string down to the given display width, appending an ellipsis when
/// something was dropped.
fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn format_date(epoch: i64) -> String {
    let format = format_description!("[year]-[month]-[day]");
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|dt| dt.format(format).ok())
        .unwrap_or_else(|| epoch.to_string())
}
