use std::io::Stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::attachment::{self, AttachmentError};
use crate::config::{AppConfig, ConfigPaths, Permission};
use crate::diary::{EditorBinding, Reconciler, SaveOutcome};
use crate::journaling::DraftJournal;
use crate::notify::{Notifier, NotifyOutcome};
use crate::storage::SqliteStore;
use crate::ui;

pub mod state;

pub use state::{
    AppState, AttachOverlay, DeleteOverlay, DiaryEditor, DraftsOverlay, FocusPane, OverlayState,
    TextBuffer,
};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    NewDiary,
    EnterEdit,
    DeleteDiary,
    Attach,
    ShowDrafts,
    Reload,
    Save,
}

pub struct App {
    pub config: Arc<AppConfig>,
    diaries: Reconciler<SqliteStore>,
    state: AppState,
    list_state: ListState,
    drafts: DraftJournal,
    notifier: Notifier,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, store: SqliteStore, paths: ConfigPaths) -> Result<Self> {
        let drafts = DraftJournal::new(paths.drafts_dir(), &config.drafts)
            .context("opening draft journal")?;
        let pending = drafts.list().context("listing stashed drafts")?;

        let mut diaries = Reconciler::new(store, config.editor.reconciler_options());
        let mut state = AppState::default();
        diaries.load(&mut state.editor);
        state.surface_alerts();
        state.pending_drafts = pending.len();
        if !pending.is_empty() {
            state.set_status_message(Some(format!(
                "{} unsaved draft(s) kept from earlier; press D to review.",
                pending.len()
            )));
        }

        Ok(Self {
            notifier: Notifier::new(config.notifications.permission),
            config,
            diaries,
            state,
            list_state: ListState::default(),
            drafts,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    self.list_state.select(self.diaries.selected_index());
                    ui::draw_app(
                        frame,
                        &self.state,
                        self.diaries.entries(),
                        &mut self.list_state,
                    );
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.state.expire_status();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.is_editing() && self.handle_editor_key(key) {
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Save)
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Attach)
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Reload)
            }
            _ if self.state.is_editing() => None,
            KeyCode::Char('q') if plain => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('n') if plain => Some(Action::NewDiary),
            KeyCode::Char('e') | KeyCode::Enter | KeyCode::Tab => Some(Action::EnterEdit),
            KeyCode::Char('d') if plain => Some(Action::DeleteDiary),
            KeyCode::Char('a') if plain => Some(Action::Attach),
            KeyCode::Char('D') => Some(Action::ShowDrafts),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                if self.state.editor.is_dirty() {
                    self.stash_unsaved("closed without saving");
                }
                self.should_quit = true;
            }
            Action::SelectNext => self.move_selection(1),
            Action::SelectPrevious => self.move_selection(-1),
            Action::NewDiary => {
                self.discard_notice();
                let created = self.diaries.create(&mut self.state.editor);
                if !self.state.surface_alerts() && created.is_some() {
                    self.state.begin_editing();
                    self.state
                        .set_status_message(Some("New diary: Tab switches fields, Ctrl-s saves"));
                }
            }
            Action::EnterEdit => {
                if self.diaries.active_key().is_some() {
                    self.state.begin_editing();
                    self.state
                        .set_status_message(Some("Editing: Esc to list, Ctrl-s to save"));
                }
            }
            Action::DeleteDiary => {
                let Some(key) = self.diaries.active_key().map(str::to_string) else {
                    return;
                };
                let title = self
                    .diaries
                    .entry(&key)
                    .map(|entry| entry.title.clone())
                    .unwrap_or_default();
                self.state
                    .open_overlay(OverlayState::Delete(DeleteOverlay { key, title }));
            }
            Action::Attach => {
                self.state
                    .open_overlay(OverlayState::Attach(AttachOverlay::default()));
            }
            Action::ShowDrafts => self.open_drafts(),
            Action::Reload => {
                self.discard_notice();
                self.diaries.load(&mut self.state.editor);
                self.state.stop_editing();
                if !self.state.surface_alerts() {
                    self.state.set_status_message(Some("Reloaded from storage"));
                }
            }
            Action::Save => self.save(),
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(current) = self.diaries.selected_index() else {
            return;
        };
        let target = (current as isize + delta).clamp(0, self.diaries.len() as isize - 1);
        if target as usize == current {
            return;
        }
        self.discard_notice();
        self.diaries.move_selection(delta, &mut self.state.editor);
        self.state.surface_alerts();
    }

    fn save(&mut self) {
        match self.diaries.save_active(&mut self.state.editor) {
            SaveOutcome::Saved { key, inserted } => {
                let title = self
                    .diaries
                    .entry(&key)
                    .map(|entry| entry.title.clone())
                    .unwrap_or_default();
                tracing::info!(%key, inserted, "diary saved from editor");
                self.state
                    .set_status_message(Some(format!("Saved \u{201c}{title}\u{201d}")));
                self.notify("Diary saved", &title);
            }
            SaveOutcome::Rejected {
                key, draft, reason, ..
            } => {
                self.state.surface_alerts();
                match self.drafts.stash(&key, &draft, &reason) {
                    Ok(Some(_)) => {
                        self.state.pending_drafts += 1;
                        self.state.set_alert(format!(
                            "{reason}. Your text was kept as a draft; press D to review."
                        ));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(?err, %key, "failed to stash rejected draft");
                    }
                }
            }
        }
    }

    fn notify(&mut self, title: &str, body: &str) {
        match self.notifier.notify(title, body, None) {
            NotifyOutcome::Shown(notification) => {
                self.state
                    .set_status_message(Some(notification.to_string()));
            }
            NotifyOutcome::PermissionRequested => {
                self.state.open_overlay(OverlayState::NotifyPermission);
            }
            NotifyOutcome::Suppressed => {}
        }
    }

    fn stash_unsaved(&mut self, reason: &str) -> bool {
        let Some(key) = self.diaries.active_key().map(str::to_string) else {
            return false;
        };
        let fields = self.state.editor.read_editor();
        match self.drafts.stash(&key, &fields, reason) {
            Ok(stashed) => stashed.is_some(),
            Err(err) => {
                tracing::error!(?err, %key, "failed to stash unsaved edits");
                false
            }
        }
    }

    /// Stashes unsaved edits before another diary replaces them in the editor.
    fn discard_notice(&mut self) {
        if self.state.editor.is_dirty() && self.stash_unsaved("replaced without saving") {
            self.state.pending_drafts += 1;
            self.state
                .set_status_message(Some("Unsaved edits moved to drafts (D)"));
        }
    }

    fn open_drafts(&mut self) {
        match self.drafts.list() {
            Ok(drafts) => {
                self.state.pending_drafts = drafts.len();
                if drafts.is_empty() {
                    self.state.set_status_message(Some("No stashed drafts"));
                    return;
                }
                self.state.open_overlay(OverlayState::Drafts(DraftsOverlay {
                    drafts,
                    selected: 0,
                }));
            }
            Err(err) => {
                tracing::error!(?err, "failed to list drafts");
                self.state.set_alert("Could not read the draft journal");
            }
        }
    }

    fn restore_selected_draft(&mut self) {
        let Some(draft) = self
            .state
            .drafts_overlay_mut()
            .and_then(|overlay| overlay.remove_selected())
        else {
            return;
        };
        self.state.close_overlay();
        if let Err(err) = self.drafts.discard(&draft.id) {
            tracing::warn!(?err, id = %draft.id, "failed to drop restored draft");
        }
        self.state.pending_drafts = self.state.pending_drafts.saturating_sub(1);

        if self.diaries.entry(&draft.key).is_some() {
            self.diaries.select(&draft.key, &mut self.state.editor);
        } else {
            self.diaries.create(&mut self.state.editor);
        }
        if self.state.surface_alerts() {
            return;
        }
        self.state.editor.restore_fields(&draft.fields);
        self.state.begin_editing();
        self.state
            .set_status_message(Some("Draft restored; Ctrl-s to save it"));
    }

    fn discard_selected_draft(&mut self) {
        let Some(draft) = self
            .state
            .drafts_overlay_mut()
            .and_then(|overlay| overlay.remove_selected())
        else {
            return;
        };
        match self.drafts.discard(&draft.id) {
            Ok(_) => {
                self.state.pending_drafts = self.state.pending_drafts.saturating_sub(1);
                self.state.set_status_message(Some("Draft discarded"));
            }
            Err(err) => {
                tracing::error!(?err, id = %draft.id, "failed to discard draft");
                self.state.set_alert("Could not discard draft");
            }
        }
        if self
            .state
            .drafts_overlay_mut()
            .is_some_and(|overlay| overlay.drafts.is_empty())
        {
            self.state.close_overlay();
        }
    }

    fn submit_attachment(&mut self) {
        let Some(path) = self
            .state
            .attach_overlay_mut()
            .map(|overlay| overlay.path.trim().to_string())
        else {
            return;
        };
        if path.is_empty() {
            self.state.set_status_message(Some("Enter a file path"));
            return;
        }
        self.state.close_overlay();
        match attachment::embed(&PathBuf::from(&path), self.config.attachments.max_bytes) {
            Ok(attached) => {
                self.state.editor.content.append(&attached.markup);
                self.state.set_status_message(Some(format!(
                    "Attached \u{201c}{}\u{201d}; Ctrl-s to save",
                    attached.name
                )));
            }
            Err(err @ AttachmentError::TooLarge { .. }) => {
                self.state.editor.alert(&err.to_string());
                self.state.surface_alerts();
            }
            Err(err) => {
                tracing::warn!(?err, %path, "attachment failed");
                self.state.set_alert(err.to_string());
            }
        }
    }

    fn submit_delete(&mut self, key: String) {
        self.state.close_overlay();
        self.diaries.remove(&key, &mut self.state.editor);
        self.state.stop_editing();
        if !self.state.surface_alerts() {
            self.state.set_status_message(Some("Diary deleted"));
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        match self.state.overlay() {
            Some(OverlayState::Attach(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Attachment canceled"));
                    }
                    KeyCode::Enter => self.submit_attachment(),
                    KeyCode::Backspace => {
                        if let Some(overlay) = self.state.attach_overlay_mut() {
                            overlay.path.pop();
                        }
                    }
                    KeyCode::Char(ch) if plain => {
                        if let Some(overlay) = self.state.attach_overlay_mut() {
                            overlay.path.push(ch);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::Delete(overlay)) => {
                let target = overlay.key.clone();
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Delete canceled"));
                    }
                    KeyCode::Enter | KeyCode::Char('y') => self.submit_delete(target),
                    _ => {}
                }
                true
            }
            Some(OverlayState::Drafts(_)) => {
                match key.code {
                    KeyCode::Esc => self.state.close_overlay(),
                    KeyCode::Enter => self.restore_selected_draft(),
                    KeyCode::Char('x') => self.discard_selected_draft(),
                    KeyCode::Char('j') | KeyCode::Down => {
                        if let Some(overlay) = self.state.drafts_overlay_mut() {
                            overlay.move_selection(1);
                        }
                    }
                    KeyCode::Char('k') | KeyCode::Up => {
                        if let Some(overlay) = self.state.drafts_overlay_mut() {
                            overlay.move_selection(-1);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::NotifyPermission) => {
                let answer = match key.code {
                    KeyCode::Char('y') => Some(Permission::Granted),
                    KeyCode::Char('n') => Some(Permission::Denied),
                    KeyCode::Esc => None,
                    _ => return true,
                };
                self.state.close_overlay();
                if let Some(answer) = answer {
                    self.notifier.resolve(answer);
                    if answer == Permission::Granted {
                        self.state
                            .set_status_message(Some("Notifications allowed"));
                    }
                }
                true
            }
            None => false,
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let on_title = self.state.focus == FocusPane::Title;
        match key.code {
            KeyCode::Esc => {
                self.state.stop_editing();
                if self.state.editor.is_dirty() {
                    self.state
                        .set_status_message(Some("Unsaved changes; Ctrl-s to save"));
                }
                return true;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.state.toggle_field();
                return true;
            }
            KeyCode::Enter if on_title => {
                self.state.toggle_field();
                return true;
            }
            KeyCode::Char('s' | 'c' | 'o' | 'r') if ctrl => return false,
            _ => {}
        }
        let Some(buffer) = self.state.focused_buffer_mut() else {
            return false;
        };
        match key.code {
            KeyCode::Char('z') if ctrl => {
                buffer.undo();
            }
            KeyCode::Char('y') if ctrl => {
                buffer.redo();
            }
            KeyCode::Char(ch) if !ctrl => {
                buffer.insert_char(ch);
            }
            KeyCode::Enter => {
                buffer.insert_newline();
            }
            KeyCode::Backspace => {
                buffer.backspace();
            }
            KeyCode::Delete => {
                buffer.delete();
            }
            KeyCode::Left => {
                buffer.move_left();
            }
            KeyCode::Right => {
                buffer.move_right();
            }
            KeyCode::Up => {
                buffer.move_up();
            }
            KeyCode::Down => {
                buffer.move_down();
            }
            KeyCode::Home => {
                buffer.move_home();
            }
            KeyCode::End => {
                buffer.move_end();
            }
            _ => return false,
        }
        true
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}
