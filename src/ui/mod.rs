use once_cell::sync::Lazy;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{format_date, AppState, FocusPane, OverlayState, TextBuffer};
use crate::diary::{ListEntry, Thumbnail};

static DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:([A-Za-z0-9.+/-]+);base64,[A-Za-z0-9+/=]+")
        .expect("data url pattern compiles")
});

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    entries: &[ListEntry],
    list_state: &mut ListState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(vertical[0]);

    draw_list(frame, state, entries, list_state, columns[0]);
    draw_editor(frame, state, columns[1]);

    let status = Paragraph::new(build_status_line(state, entries.len(), list_state.selected()))
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state);
}

fn draw_list(
    frame: &mut Frame,
    state: &AppState,
    entries: &[ListEntry],
    list_state: &mut ListState,
    area: Rect,
) {
    let border_style = focus_style(state.focus == FocusPane::List);
    let mut items: Vec<ListItem> = entries
        .iter()
        .map(|entry| {
            let title_line = Line::from(vec![
                thumbnail_span(&entry.thumbnail),
                Span::raw(" "),
                Span::styled(
                    entry.title.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]);
            let excerpt = if entry.excerpt.is_empty() {
                Span::styled("(empty)", Style::default().fg(Color::DarkGray))
            } else {
                Span::styled(entry.excerpt.clone(), Style::default().fg(Color::Gray))
            };
            ListItem::new(vec![title_line, Line::from(excerpt)])
        })
        .collect();
    if items.is_empty() {
        items.push(ListItem::new("No diaries yet. Press `n` to start one."));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .title("Diaries")
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn thumbnail_span(thumbnail: &Thumbnail) -> Span<'static> {
    match thumbnail {
        Thumbnail::Video(_) => Span::styled("▶", Style::default().fg(Color::Magenta)),
        Thumbnail::Image(_) => Span::styled("▣", Style::default().fg(Color::Green)),
        Thumbnail::Placeholder => Span::styled("·", Style::default().fg(Color::DarkGray)),
    }
}

fn draw_editor(frame: &mut Frame, state: &AppState, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(3),
        ])
        .split(area);

    let editor = &state.editor;
    let title = Paragraph::new(editor.title.text().to_string()).block(
        Block::default()
            .title("Title")
            .borders(Borders::ALL)
            .border_style(focus_style(state.focus == FocusPane::Title)),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(title, rows[0]);

    let mut meta = vec![Span::styled(
        editor
            .updated_label()
            .map(|label| format!(" Updated {label}"))
            .unwrap_or_else(|| " Not saved yet".to_string()),
        Style::default().fg(Color::Gray),
    )];
    if editor.is_dirty() {
        meta.push(Span::styled(
            " (unsaved)",
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(meta)), rows[1]);

    let content = Paragraph::new(abbreviate_media(editor.content.text()))
        .block(
            Block::default()
                .title("Content")
                .borders(Borders::ALL)
                .border_style(focus_style(state.focus == FocusPane::Content)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(content, rows[2]);

    let cursor = match state.focus {
        FocusPane::List => None,
        FocusPane::Title => cursor_screen_position(&editor.title, rows[0]),
        FocusPane::Content => cursor_screen_position(&editor.content, rows[2]),
    };
    if let Some((x, y)) = cursor {
        frame.set_cursor(x, y);
    }
}

/// Embedded media is shown as its MIME type instead of the full payload.
pub fn abbreviate_media(markup: &str) -> String {
    DATA_URL.replace_all(markup, "data:$1;base64,…").into_owned()
}

fn cursor_screen_position(buffer: &TextBuffer, area: Rect) -> Option<(u16, u16)> {
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    if inner_width == 0 || inner_height == 0 {
        return None;
    }

    let before = abbreviate_media(&buffer.text()[..buffer.cursor()]);
    let mut row = 0usize;
    let mut col = 0usize;
    for grapheme in before.graphemes(true) {
        if grapheme == "\n" {
            row += 1;
            col = 0;
            continue;
        }
        let glyph_width = UnicodeWidthStr::width(grapheme);
        if glyph_width > 0 && col + glyph_width > inner_width {
            row += 1;
            col = 0;
        }
        col += glyph_width;
    }

    let row = row.min(inner_height - 1) as u16;
    let col = col.min(inner_width - 1) as u16;
    Some((area.x + 1 + col, area.y + 1 + row))
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn build_status_line(state: &AppState, total: usize, selected: Option<usize>) -> Text<'static> {
    let position = selected
        .map(|index| format!("{}/{}", index + 1, total))
        .unwrap_or_else(|| format!("0/{total}"));
    let focus = match state.focus {
        FocusPane::List => "List",
        FocusPane::Title => "Title",
        FocusPane::Content => "Content",
    };

    let mut spans = vec![
        Span::raw(format!("Diaries: {total}")),
        Span::raw(" | Selected: "),
        Span::styled(position, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" | Focus: "),
        Span::styled(focus, Style::default().add_modifier(Modifier::BOLD)),
    ];
    if state.pending_drafts > 0 {
        spans.push(Span::raw(" | Drafts: "));
        spans.push(Span::styled(
            state.pending_drafts.to_string(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let second = match state.status() {
        Some(status) if status.alert => Line::from(Span::styled(
            status.text.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Some(status) => Line::from(Span::raw(status.text.clone())),
        None if state.focus == FocusPane::List => Line::from(Span::styled(
            "n new • e edit • d delete • a attach • D drafts • j/k move • q quit",
            Style::default().fg(Color::DarkGray),
        )),
        None => Line::from(Span::styled(
            "Tab switch field • Ctrl-s save • Ctrl-o attach • Ctrl-z undo • Esc list",
            Style::default().fg(Color::DarkGray),
        )),
    };
    Text::from(vec![Line::from(spans), second])
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        Some(OverlayState::Attach(overlay)) => {
            let area = centered_rect(60, 30, frame.size());
            frame.render_widget(Clear, area);
            let mut path_display = overlay.path.clone();
            path_display.push('▌');
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Attach an image or video",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(path_display),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to attach • Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Attach")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::Delete(overlay)) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    format!("Delete \u{201c}{}\u{201d}?", overlay.title),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter/y to delete • Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Delete Diary")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::Drafts(overlay)) => {
            let area = centered_rect(70, 60, frame.size());
            frame.render_widget(Clear, area);
            let items: Vec<ListItem> = overlay
                .drafts
                .iter()
                .map(|draft| {
                    let title = if draft.fields.title.trim().is_empty() {
                        "(untitled)".to_string()
                    } else {
                        draft.fields.title.clone()
                    };
                    ListItem::new(vec![
                        Line::from(Span::styled(
                            title,
                            Style::default().add_modifier(Modifier::BOLD),
                        )),
                        Line::from(Span::styled(
                            format!("{} • {}", format_date(draft.stashed_at), draft.reason),
                            Style::default().fg(Color::Gray),
                        )),
                    ])
                })
                .collect();
            let mut list_state = ListState::default();
            list_state.select(overlay.selected_draft().map(|_| overlay.selected));
            let list = List::new(items)
                .block(
                    Block::default()
                        .title("Drafts • Enter restore • x discard • Esc close")
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Yellow)),
                )
                .highlight_style(Style::default().bg(Color::Blue).fg(Color::Black))
                .highlight_symbol("▸ ");
            frame.render_stateful_widget(list, area, &mut list_state);
        }
        Some(OverlayState::NotifyPermission) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Show notifications when diaries are saved?",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "y allow • n deny • Esc decide later",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Notifications")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        None => {}
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
