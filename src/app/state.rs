use std::time::{Duration, Instant};

use time::macros::format_description;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::diary::{EditorBinding, EditorFields, Record};
use crate::journaling::StashedDraft;

const STATUS_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    List,
    Title,
    Content,
}

/// Text with a grapheme-aware cursor and undo history.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
    multiline: bool,
    preferred_column: Option<usize>,
    history: Vec<String>,
    history_index: usize,
}

impl TextBuffer {
    pub fn single_line() -> Self {
        Self::with_text(String::new(), false)
    }

    pub fn multi_line() -> Self {
        Self::with_text(String::new(), true)
    }

    fn with_text(text: String, multiline: bool) -> Self {
        let cursor = text.len();
        let mut history = Vec::with_capacity(64);
        history.push(text.clone());
        Self {
            text,
            cursor,
            multiline,
            preferred_column: None,
            history,
            history_index: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replaces the contents and forgets the undo history.
    pub fn reset(&mut self, text: &str) {
        *self = Self::with_text(text.to_string(), self.multiline);
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        if ch == '\n' && !self.multiline {
            return false;
        }
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.text.insert_str(self.cursor, encoded);
        self.cursor += encoded.len();
        self.preferred_column = None;
        self.record_history();
        true
    }

    pub fn insert_newline(&mut self) -> bool {
        if !self.multiline {
            return false;
        }
        self.text.insert(self.cursor, '\n');
        self.cursor += 1;
        self.preferred_column = Some(0);
        self.record_history();
        true
    }

    pub fn append(&mut self, snippet: &str) {
        self.text.push_str(snippet);
        self.cursor = self.text.len();
        self.preferred_column = None;
        self.record_history();
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.text, self.cursor);
        self.text.drain(prev..self.cursor);
        self.cursor = prev;
        self.preferred_column = None;
        self.record_history();
        true
    }

    pub fn delete(&mut self) -> bool {
        let next = next_grapheme_boundary(&self.text, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.text.drain(self.cursor..next);
        self.preferred_column = None;
        self.record_history();
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.text, self.cursor);
        self.preferred_column = None;
        true
    }

    pub fn move_right(&mut self) -> bool {
        let next = next_grapheme_boundary(&self.text, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.cursor = next;
        self.preferred_column = None;
        true
    }

    pub fn move_home(&mut self) -> bool {
        let start = line_start(&self.text, self.cursor);
        if self.cursor == start {
            return false;
        }
        self.cursor = start;
        self.preferred_column = Some(0);
        true
    }

    pub fn move_end(&mut self) -> bool {
        let end = line_end(&self.text, self.cursor);
        if self.cursor == end {
            return false;
        }
        self.cursor = end;
        self.preferred_column = None;
        true
    }

    pub fn move_up(&mut self) -> bool {
        let start = line_start(&self.text, self.cursor);
        if start == 0 {
            return false;
        }
        let column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.text, start, self.cursor));
        let prev_start = line_start(&self.text, start - 1);
        self.cursor = position_for_column(&self.text, prev_start, column);
        self.preferred_column = Some(column);
        true
    }

    pub fn move_down(&mut self) -> bool {
        let end = line_end(&self.text, self.cursor);
        if end == self.text.len() {
            return false;
        }
        let start = line_start(&self.text, self.cursor);
        let column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.text, start, self.cursor));
        self.cursor = position_for_column(&self.text, end + 1, column);
        self.preferred_column = Some(column);
        true
    }

    pub fn undo(&mut self) -> bool {
        if self.history_index == 0 {
            return false;
        }
        self.history_index -= 1;
        self.restore_history_snapshot();
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.history_index + 1 >= self.history.len() {
            return false;
        }
        self.history_index += 1;
        self.restore_history_snapshot();
        true
    }

    pub fn is_modified(&self) -> bool {
        self.history_index != 0
    }

    /// Line and column (in graphemes) of the cursor.
    pub fn cursor_position(&self) -> (usize, usize) {
        let line = self.text[..self.cursor].matches('\n').count();
        let column = column_at(&self.text, line_start(&self.text, self.cursor), self.cursor);
        (line, column)
    }

    fn record_history(&mut self) {
        const MAX_HISTORY: usize = 200;
        if self
            .history
            .get(self.history_index)
            .is_some_and(|current| current.as_str() == self.text)
        {
            return;
        }
        self.history.truncate(self.history_index + 1);
        self.history.push(self.text.clone());
        if self.history.len() > MAX_HISTORY {
            let overflow = self.history.len() - MAX_HISTORY;
            self.history.drain(0..overflow);
        }
        self.history_index = self.history.len() - 1;
    }

    fn restore_history_snapshot(&mut self) {
        if let Some(snapshot) = self.history.get(self.history_index).cloned() {
            self.text = snapshot;
            self.cursor = self.cursor.min(self.text.len());
            while !self.text.is_char_boundary(self.cursor) {
                self.cursor -= 1;
            }
            self.preferred_column = None;
        }
    }
}

/// Title and content fields of the active diary.
#[derive(Debug, Clone)]
pub struct DiaryEditor {
    pub title: TextBuffer,
    pub content: TextBuffer,
    updated_at: Option<OffsetDateTime>,
    alerts: Vec<String>,
}

impl Default for DiaryEditor {
    fn default() -> Self {
        Self {
            title: TextBuffer::single_line(),
            content: TextBuffer::multi_line(),
            updated_at: None,
            alerts: Vec::new(),
        }
    }
}

impl DiaryEditor {
    pub fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }

    pub fn updated_label(&self) -> Option<String> {
        self.updated_at.map(format_date)
    }

    pub fn is_dirty(&self) -> bool {
        self.title.is_modified() || self.content.is_modified()
    }

    /// Loads a stashed draft on top of whatever is shown, keeping it dirty.
    pub fn restore_fields(&mut self, fields: &EditorFields) {
        self.title.reset("");
        self.content.reset("");
        self.title.append(&fields.title);
        self.content.append(&fields.content);
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }
}

impl EditorBinding for DiaryEditor {
    fn read_editor(&self) -> EditorFields {
        EditorFields::new(self.title.text(), self.content.text())
    }

    fn render_editor(&mut self, record: &Record) {
        self.title.reset(&record.title);
        self.content.reset(&record.content);
        self.updated_at = Some(record.updated_at);
    }

    fn render_updated_at(&mut self, at: OffsetDateTime) {
        self.updated_at = Some(at);
        let title = self.title.text().to_string();
        let content = self.content.text().to_string();
        self.title.reset(&title);
        self.content.reset(&content);
    }

    fn clear_editor(&mut self) {
        self.title.reset("");
        self.content.reset("");
        self.updated_at = None;
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttachOverlay {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DeleteOverlay {
    pub key: String,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct DraftsOverlay {
    pub drafts: Vec<StashedDraft>,
    pub selected: usize,
}

impl DraftsOverlay {
    pub fn selected_draft(&self) -> Option<&StashedDraft> {
        self.drafts.get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.drafts.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.drafts.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, max) as usize;
    }

    pub fn remove_selected(&mut self) -> Option<StashedDraft> {
        if self.selected >= self.drafts.len() {
            return None;
        }
        let removed = self.drafts.remove(self.selected);
        if self.selected >= self.drafts.len() {
            self.selected = self.drafts.len().saturating_sub(1);
        }
        Some(removed)
    }
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    Attach(AttachOverlay),
    Delete(DeleteOverlay),
    Drafts(DraftsOverlay),
    NotifyPermission,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub alert: bool,
    posted_at: Instant,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub focus: FocusPane,
    pub editor: DiaryEditor,
    pub pending_drafts: usize,
    overlay: Option<OverlayState>,
    status: Option<StatusMessage>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            focus: FocusPane::List,
            editor: DiaryEditor::default(),
            pending_drafts: 0,
            overlay: None,
            status: None,
        }
    }
}

impl AppState {
    pub fn is_editing(&self) -> bool {
        self.focus != FocusPane::List
    }

    pub fn focused_buffer_mut(&mut self) -> Option<&mut TextBuffer> {
        match self.focus {
            FocusPane::List => None,
            FocusPane::Title => Some(&mut self.editor.title),
            FocusPane::Content => Some(&mut self.editor.content),
        }
    }

    pub fn begin_editing(&mut self) {
        self.focus = FocusPane::Title;
    }

    pub fn toggle_field(&mut self) {
        self.focus = match self.focus {
            FocusPane::Title => FocusPane::Content,
            FocusPane::Content | FocusPane::List => FocusPane::Title,
        };
    }

    pub fn stop_editing(&mut self) {
        self.focus = FocusPane::List;
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status = message.map(|text| StatusMessage {
            text: text.into(),
            alert: false,
            posted_at: Instant::now(),
        });
    }

    /// Alerts stay until the next status message replaces them.
    pub fn set_alert<S: Into<String>>(&mut self, message: S) {
        self.status = Some(StatusMessage {
            text: message.into(),
            alert: true,
            posted_at: Instant::now(),
        });
    }

    pub fn expire_status(&mut self) {
        if self
            .status
            .as_ref()
            .is_some_and(|status| !status.alert && status.posted_at.elapsed() >= STATUS_TTL)
        {
            self.status = None;
        }
    }

    /// Moves pending editor alerts into the status line. Returns whether
    /// any were shown.
    pub fn surface_alerts(&mut self) -> bool {
        let alerts = self.editor.take_alerts();
        match alerts.last() {
            Some(last) => {
                self.set_alert(last.clone());
                true
            }
            None => false,
        }
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn open_overlay(&mut self, overlay: OverlayState) {
        self.overlay = Some(overlay);
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn attach_overlay_mut(&mut self) -> Option<&mut AttachOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Attach(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn drafts_overlay_mut(&mut self) -> Option<&mut DraftsOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Drafts(overlay)) => Some(overlay),
            _ => None,
        }
    }
}

pub fn format_date(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[..cursor]
        .grapheme_indices(true)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .graphemes(true)
        .next()
        .map(|grapheme| cursor + grapheme.len())
        .unwrap_or(text.len())
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|idx| cursor + idx)
        .unwrap_or(text.len())
}

fn column_at(text: &str, line_start: usize, cursor: usize) -> usize {
    text[line_start..cursor].graphemes(true).count()
}

fn position_for_column(text: &str, line_start: usize, column: usize) -> usize {
    let end = line_end(text, line_start);
    text[line_start..end]
        .grapheme_indices(true)
        .nth(column)
        .map(|(idx, _)| line_start + idx)
        .unwrap_or(end)
}
