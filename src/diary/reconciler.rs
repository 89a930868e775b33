use time::OffsetDateTime;

use crate::diary::keys::{creation_time_of, is_managed, KeyGenerator};
use crate::diary::record::{
    EditorFields, ListEntry, Record, DEFAULT_PLACEHOLDER_TITLE,
};
use crate::diary::selection::Selection;
use crate::error::StoreError;
use crate::storage::RecordStore;

/// The visible title/content/date fields, owned by the frontend.
pub trait EditorBinding {
    fn read_editor(&self) -> EditorFields;
    fn render_editor(&mut self, record: &Record);
    fn render_updated_at(&mut self, at: OffsetDateTime);
    fn clear_editor(&mut self);
    /// User-visible failure message.
    fn alert(&mut self, message: &str);
}

/// Editor without a screen, used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct HeadlessEditor {
    pub fields: EditorFields,
    pub updated_at: Option<OffsetDateTime>,
    pub alerts: Vec<String>,
}

impl HeadlessEditor {
    pub fn set_fields(&mut self, title: impl Into<String>, content: impl Into<String>) {
        self.fields = EditorFields::new(title, content);
    }
}

impl EditorBinding for HeadlessEditor {
    fn read_editor(&self) -> EditorFields {
        self.fields.clone()
    }

    fn render_editor(&mut self, record: &Record) {
        self.fields = EditorFields::from(record);
    }

    fn render_updated_at(&mut self, at: OffsetDateTime) {
        self.updated_at = Some(at);
    }

    fn clear_editor(&mut self) {
        self.fields = EditorFields::default();
        self.updated_at = None;
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub placeholder_title: String,
    pub excerpt_len: usize,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            placeholder_title: DEFAULT_PLACEHOLDER_TITLE.to_string(),
            excerpt_len: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved {
        key: String,
        inserted: bool,
    },
    /// The store refused the write. The list is unchanged, the editor shows
    /// the last stored state again, and `draft` holds what was rejected.
    Rejected {
        key: String,
        draft: EditorFields,
        reason: String,
        quota: bool,
    },
}

/// Keeps the sidebar list in step with the record store.
///
/// Every event leaves exactly one entry selected (or none while the store
/// is empty and a create failed), and every listed key resolves to a
/// readable record. Failures never escape: they are logged, reported
/// through [`EditorBinding::alert`] and turned into a recoverable state.
pub struct Reconciler<S> {
    store: S,
    entries: Vec<ListEntry>,
    selection: Selection,
    keys: KeyGenerator,
    options: ReconcilerOptions,
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: S, options: ReconcilerOptions) -> Self {
        Self {
            store,
            entries: Vec::new(),
            selection: Selection::default(),
            keys: KeyGenerator::new(),
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&ListEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn active_key(&self) -> Option<&str> {
        self.selection.active()
    }

    /// Position of the highlighted entry, for scrolling it into view.
    pub fn selected_index(&self) -> Option<usize> {
        let active = self.selection.active()?;
        self.entries.iter().position(|entry| entry.key == active)
    }

    /// Rebuilds the list from the store, oldest record first so the newest
    /// ends up on top.
    pub fn load(&mut self, editor: &mut impl EditorBinding) {
        self.entries.clear();
        self.selection.clear();

        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::error!(error = %err, "enumerating stored diaries failed");
                editor.alert("Could not read saved diaries.");
                Vec::new()
            }
        };

        let mut managed = Vec::new();
        for key in keys.into_iter().filter(|key| is_managed(key)) {
            match creation_time_of(&key) {
                Ok(created) => {
                    self.keys.observe(&key);
                    managed.push((created, key));
                }
                Err(err) => {
                    tracing::warn!(%key, error = %err, "removing diary with unreadable key");
                    self.purge(&key);
                }
            }
        }
        managed.sort();

        let mut unlisted = 0usize;
        for (index, (_, key)) in managed.into_iter().enumerate() {
            match self.store.get(&key) {
                Ok(record) => {
                    self.entries
                        .insert(0, ListEntry::project(&record, self.options.excerpt_len));
                    tracing::info!(index, %key, "loaded diary");
                }
                Err(err) if err.is_unreadable_record() => {
                    tracing::warn!(%key, error = %err, "could not read diary, removing it");
                    self.purge(&key);
                }
                Err(err) => {
                    tracing::error!(%key, error = %err, "reading diary failed");
                    unlisted += 1;
                }
            }
        }
        if unlisted > 0 {
            editor.alert(&format!(
                "Could not load {unlisted} saved diar{}.",
                if unlisted == 1 { "y" } else { "ies" }
            ));
        }

        match self.entries.first().map(|entry| entry.key.clone()) {
            Some(head) => self.select(&head, editor),
            None => {
                self.create(editor);
            }
        }
        self.check_consistency();
    }

    /// Starts a new, empty diary at the head of the list.
    pub fn create(&mut self, editor: &mut impl EditorBinding) -> Option<String> {
        editor.clear_editor();
        let key = self.keys.new_key();
        let record = match Record::blank(&key, &self.options.placeholder_title) {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(%key, error = %err, "generated key is not parseable");
                editor.alert("Could not create a new diary.");
                return None;
            }
        };
        match self.store.put(&record) {
            Ok(()) => {
                self.entries
                    .insert(0, ListEntry::project(&record, self.options.excerpt_len));
                self.activate(&record, editor);
                tracing::info!(%key, "created diary");
                Some(key)
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "storing new diary failed");
                self.restore_previous(None, editor);
                editor.alert(&failure_message(&record.title, &err));
                None
            }
        }
    }

    /// Writes the editor contents under `key`.
    pub fn save(&mut self, key: &str, editor: &mut impl EditorBinding) -> SaveOutcome {
        let fields = editor.read_editor();
        let base = match self.store.get(key) {
            Ok(record) => Ok(record),
            Err(err) if err.is_unreadable_record() => {
                Record::blank(key, &self.options.placeholder_title)
            }
            Err(err) => Err(err),
        };
        let result = base.and_then(|base| {
            let record = base.with_edit(
                &fields,
                &self.options.placeholder_title,
                OffsetDateTime::now_utc(),
            );
            self.store.put(&record).map(|()| record)
        });

        match result {
            Ok(record) => {
                let entry = ListEntry::project(&record, self.options.excerpt_len);
                let inserted = match self.entries.iter_mut().find(|e| e.key == key) {
                    Some(existing) => {
                        *existing = entry;
                        false
                    }
                    None => {
                        self.entries.insert(0, entry);
                        true
                    }
                };
                self.activate(&record, editor);
                tracing::info!(%key, inserted, "saved diary");
                SaveOutcome::Saved {
                    key: key.to_string(),
                    inserted,
                }
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "saving diary failed");
                let title = if fields.title.trim().is_empty() {
                    self.options.placeholder_title.clone()
                } else {
                    fields.title.clone()
                };
                self.restore_previous(Some(key), editor);
                editor.alert(&failure_message(&title, &err));
                SaveOutcome::Rejected {
                    key: key.to_string(),
                    reason: err.to_string(),
                    quota: err.is_quota(),
                    draft: fields,
                }
            }
        }
    }

    /// Saves the selected diary, or the editor contents under a fresh key
    /// when nothing is selected.
    pub fn save_active(&mut self, editor: &mut impl EditorBinding) -> SaveOutcome {
        let key = match self.selection.active() {
            Some(key) => key.to_string(),
            None => self.keys.new_key(),
        };
        self.save(&key, editor)
    }

    /// Highlights `key` and loads it into the editor. A record that has
    /// vanished or no longer decodes is removed instead.
    pub fn select(&mut self, key: &str, editor: &mut impl EditorBinding) {
        if self.entry(key).is_none() {
            tracing::debug!(%key, "ignoring selection of unlisted diary");
            return;
        }
        match self.store.get(key) {
            Ok(record) => self.activate(&record, editor),
            Err(err) if err.is_unreadable_record() => {
                tracing::warn!(%key, error = %err, "could not load diary, removing it");
                self.remove(key, editor);
            }
            Err(err) => {
                tracing::error!(%key, error = %err, "loading diary failed");
                editor.alert("Could not load the selected diary.");
            }
        }
    }

    pub fn select_index(&mut self, index: usize, editor: &mut impl EditorBinding) {
        if let Some(key) = self.entries.get(index).map(|entry| entry.key.clone()) {
            self.select(&key, editor);
        }
    }

    /// Moves the highlight by `delta` entries, clamped to the list.
    pub fn move_selection(&mut self, delta: isize, editor: &mut impl EditorBinding) {
        if self.entries.is_empty() {
            return;
        }
        let len = self.entries.len() as isize;
        let current = self.selected_index().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len - 1) as usize;
        if Some(next) != self.selected_index() {
            self.select_index(next, editor);
        }
    }

    /// Deletes `key`, then selects the new head or starts a fresh diary.
    pub fn remove(&mut self, key: &str, editor: &mut impl EditorBinding) {
        if let Err(err) = self.store.remove(key) {
            tracing::error!(%key, error = %err, "deleting diary failed");
            editor.alert("Could not delete the diary.");
            return;
        }
        self.entries.retain(|entry| entry.key != key);
        self.selection.release(key);
        tracing::info!(%key, "removed diary");

        match self.entries.first().map(|entry| entry.key.clone()) {
            Some(head) => self.select(&head, editor),
            None => {
                self.create(editor);
            }
        }
    }

    pub fn remove_active(&mut self, editor: &mut impl EditorBinding) {
        if let Some(key) = self.selection.active().map(str::to_string) {
            self.remove(&key, editor);
        }
    }

    /// True when the list holds one entry per managed key in the store.
    pub fn check_consistency(&self) -> bool {
        let stored = match self.store.keys() {
            Ok(keys) => keys.iter().filter(|key| is_managed(key)).count(),
            Err(err) => {
                tracing::warn!(error = %err, "cannot enumerate store for consistency check");
                return false;
            }
        };
        if stored != self.entries.len() {
            tracing::warn!(
                stored,
                listed = self.entries.len(),
                "diary list is out of step with the store"
            );
            return false;
        }
        true
    }

    fn activate(&mut self, record: &Record, editor: &mut impl EditorBinding) {
        self.selection.set(&record.key);
        editor.render_editor(record);
        editor.render_updated_at(record.updated_at);
    }

    /// After a failed write: show the stored state of `key` (or of the head
    /// entry) again, so the editor never drifts from the store.
    fn restore_previous(&mut self, key: Option<&str>, editor: &mut impl EditorBinding) {
        let target = key
            .filter(|key| self.entry(key).is_some())
            .map(str::to_string)
            .or_else(|| self.selection.active().map(str::to_string))
            .or_else(|| self.entries.first().map(|entry| entry.key.clone()));
        match target {
            Some(target) => self.select(&target, editor),
            None => editor.clear_editor(),
        }
    }

    fn purge(&mut self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            tracing::error!(%key, error = %err, "purging unreadable diary failed");
        }
    }
}

fn failure_message(title: &str, err: &StoreError) -> String {
    if err.is_quota() {
        format!("Could not save \u{201c}{title}\u{201d}: local storage is full.")
    } else {
        format!("Could not save \u{201c}{title}\u{201d}: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::storage::MemoryStore;

    fn record(key: &str, title: &str, content: &str) -> Record {
        let mut record = Record::blank(key, "Untitled").expect("valid key");
        record.title = title.to_string();
        record.content = content.to_string();
        record
    }

    fn seeded(records: &[Record]) -> Reconciler<MemoryStore> {
        let mut store = MemoryStore::new();
        for record in records {
            store.put(record).expect("seed record");
        }
        Reconciler::new(store, ReconcilerOptions::default())
    }

    fn listed_keys(reconciler: &Reconciler<MemoryStore>) -> Vec<&str> {
        reconciler
            .entries()
            .iter()
            .map(|entry| entry.key.as_str())
            .collect()
    }

    fn assert_settled(reconciler: &Reconciler<MemoryStore>) {
        assert!(reconciler.check_consistency());
        let active = reconciler.active_key().expect("one entry selected");
        assert!(reconciler.entry(active).is_some());
        for entry in reconciler.entries() {
            reconciler.store().get(&entry.key).expect("listed key readable");
        }
    }

    #[test]
    fn load_of_empty_store_starts_a_new_diary() {
        let mut reconciler = seeded(&[]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        assert_eq!(reconciler.len(), 1);
        let key = reconciler.active_key().expect("selected").to_string();
        let stored = reconciler.store().get(&key).expect("persisted");
        assert_eq!(stored.title, "Untitled");
        assert_eq!(stored.content, "");
        assert_eq!(editor.fields.title, "Untitled");
        assert_settled(&reconciler);
    }

    #[test]
    fn load_lists_newest_first_and_ignores_foreign_keys() {
        let mut reconciler = seeded(&[
            record("diary_1000", "first", ""),
            record("diary_3000", "third", ""),
            record("diary_2000", "second", ""),
        ]);
        reconciler.store_mut().put_raw("theme", "dark").expect("foreign");
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        assert_eq!(
            listed_keys(&reconciler),
            vec!["diary_3000", "diary_2000", "diary_1000"]
        );
        assert_eq!(reconciler.active_key(), Some("diary_3000"));
        assert_eq!(reconciler.selected_index(), Some(0));
        assert_eq!(editor.fields.title, "third");
        assert_eq!(
            reconciler.store().get_raw("theme").expect("read"),
            Some("dark".to_string())
        );
        assert_settled(&reconciler);
    }

    #[test]
    fn load_purges_malformed_records() {
        let mut reconciler = seeded(&[record("diary_1000", "good", "body")]);
        reconciler
            .store_mut()
            .put_raw("diary_2000", "{not json")
            .expect("raw write");
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        assert_eq!(listed_keys(&reconciler), vec!["diary_1000"]);
        assert_eq!(reconciler.store().get_raw("diary_2000").expect("read"), None);
        assert_settled(&reconciler);
    }

    #[test]
    fn load_purges_keys_outside_the_time_range() {
        let mut reconciler = seeded(&[record("diary_1000", "good", "")]);
        reconciler
            .store_mut()
            .put_raw("diary_300000000000000", r#"{"title":"x"}"#)
            .expect("raw write");
        reconciler
            .store_mut()
            .put_raw("diary_9223372036854775807", r#"{"title":"y","createdAt":1000}"#)
            .expect("raw write");
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        assert_eq!(listed_keys(&reconciler), vec!["diary_1000"]);
        assert_eq!(
            reconciler.store().get_raw("diary_300000000000000").expect("read"),
            None
        );
        assert_eq!(
            reconciler
                .store()
                .get_raw("diary_9223372036854775807")
                .expect("read"),
            None
        );
        assert!(editor.alerts.is_empty());
        assert_settled(&reconciler);
    }

    #[test]
    fn create_still_works_after_out_of_range_keys_are_purged() {
        let mut reconciler = seeded(&[]);
        reconciler
            .store_mut()
            .put_raw("diary_300000000000000", r#"{"title":"x"}"#)
            .expect("raw write");
        reconciler
            .store_mut()
            .put_raw("diary_9223372036854775807", r#"{"title":"y","createdAt":1000}"#)
            .expect("raw write");
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        assert_eq!(reconciler.len(), 1);
        assert_settled(&reconciler);

        let key = reconciler.create(&mut editor).expect("created");
        assert!(creation_time_of(&key).is_ok());
        assert_eq!(reconciler.len(), 2);
        assert_eq!(reconciler.active_key(), Some(key.as_str()));
        assert!(editor.alerts.is_empty());
        assert_settled(&reconciler);
    }

    /// Fails every read of `broken` with an I/O error.
    struct FlakyStore {
        inner: MemoryStore,
        broken: &'static str,
    }

    impl RecordStore for FlakyStore {
        fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
            if key == self.broken {
                return Err(std::io::Error::other("disk went away").into());
            }
            self.inner.get_raw(key)
        }

        fn put_raw(&mut self, key: &str, value: &str) -> StoreResult<()> {
            self.inner.put_raw(key, value)
        }

        fn remove(&mut self, key: &str) -> StoreResult<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> StoreResult<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn load_alerts_when_a_diary_cannot_be_read() {
        let mut inner = MemoryStore::new();
        inner.put(&record("diary_1000", "fine", "")).expect("seed");
        inner.put(&record("diary_2000", "stuck", "")).expect("seed");
        let store = FlakyStore {
            inner,
            broken: "diary_2000",
        };
        let mut reconciler = Reconciler::new(store, ReconcilerOptions::default());
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        assert_eq!(reconciler.active_key(), Some("diary_1000"));
        assert_eq!(editor.alerts, vec!["Could not load 1 saved diary.".to_string()]);
        assert!(reconciler.store().inner.get_raw("diary_2000").expect("read").is_some());
    }

    #[test]
    fn save_with_empty_title_stores_placeholder() {
        let mut reconciler = seeded(&[]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        editor.set_fields("", "<div>walked to the river</div>");
        let outcome = reconciler.save_active(&mut editor);
        let key = reconciler.active_key().expect("selected").to_string();
        assert_eq!(
            outcome,
            SaveOutcome::Saved {
                key: key.clone(),
                inserted: false
            }
        );

        let stored = reconciler.store().get(&key).expect("stored");
        assert_eq!(stored.title, "Untitled");
        assert_eq!(reconciler.entries()[0].excerpt, "walked to the river");
        assert_eq!(editor.fields.title, "Untitled");
        assert_settled(&reconciler);
    }

    #[test]
    fn save_updates_entry_in_place_and_keeps_creation_time() {
        let mut reconciler = seeded(&[
            record("diary_1000", "first", ""),
            record("diary_2000", "second", ""),
            record("diary_3000", "third", ""),
        ]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);
        reconciler.select("diary_2000", &mut editor);
        assert_eq!(reconciler.selected_index(), Some(1));

        editor.set_fields("second, revised", "more words");
        reconciler.save("diary_2000", &mut editor);

        assert_eq!(
            listed_keys(&reconciler),
            vec!["diary_3000", "diary_2000", "diary_1000"]
        );
        assert_eq!(reconciler.entries()[1].title, "second, revised");
        let stored = reconciler.store().get("diary_2000").expect("stored");
        assert_eq!(
            stored.created_at,
            creation_time_of("diary_2000").expect("valid key")
        );
        assert!(stored.updated_at > stored.created_at);
        assert_eq!(editor.updated_at, Some(stored.updated_at));
    }

    #[test]
    fn removing_last_diary_starts_a_fresh_one() {
        let mut reconciler = seeded(&[record("diary_1000", "only", "text")]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        reconciler.remove("diary_1000", &mut editor);

        assert_eq!(reconciler.len(), 1);
        let fresh = reconciler.active_key().expect("selected").to_string();
        assert_ne!(fresh, "diary_1000");
        assert_eq!(reconciler.store().get(&fresh).expect("stored").title, "Untitled");
        assert_eq!(editor.fields, EditorFields::new("Untitled", ""));
        assert_settled(&reconciler);
    }

    #[test]
    fn removing_other_diary_selects_new_head() {
        let mut reconciler = seeded(&[
            record("diary_1000", "first", ""),
            record("diary_2000", "second", ""),
            record("diary_3000", "third", ""),
        ]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);
        reconciler.select("diary_1000", &mut editor);

        reconciler.remove("diary_1000", &mut editor);
        assert_eq!(listed_keys(&reconciler), vec!["diary_3000", "diary_2000"]);
        assert_eq!(reconciler.active_key(), Some("diary_3000"));
        assert_eq!(editor.fields.title, "third");

        reconciler.remove("diary_3000", &mut editor);
        assert_eq!(reconciler.active_key(), Some("diary_2000"));
        assert_settled(&reconciler);
    }

    #[test]
    fn quota_failure_keeps_stored_value_and_restores_editor() {
        let original = record("diary_1000", "lunch", "rice ball");
        let mut reconciler = seeded(&[original.clone()]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);
        let before = reconciler.entries().to_vec();
        let used = reconciler.store().used_bytes();
        reconciler.store_mut().set_quota(used + 16);

        editor.set_fields("lunch and dinner", "x".repeat(4096));
        let outcome = reconciler.save("diary_1000", &mut editor);

        match outcome {
            SaveOutcome::Rejected { key, draft, quota, .. } => {
                assert_eq!(key, "diary_1000");
                assert!(quota);
                assert_eq!(draft.title, "lunch and dinner");
                assert_eq!(draft.content.len(), 4096);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(reconciler.store().get("diary_1000").expect("kept"), original);
        assert_eq!(editor.fields, EditorFields::new("lunch", "rice ball"));
        assert_eq!(reconciler.entries(), before.as_slice());
        assert_eq!(editor.alerts.len(), 1);
        assert!(editor.alerts[0].contains("lunch and dinner"));
        assert_settled(&reconciler);
    }

    #[test]
    fn quota_failure_on_create_keeps_current_selection() {
        let mut reconciler = seeded(&[record("diary_1000", "kept", "")]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);
        let used = reconciler.store().used_bytes();
        reconciler.store_mut().set_quota(used + 1);

        assert_eq!(reconciler.create(&mut editor), None);
        assert_eq!(listed_keys(&reconciler), vec!["diary_1000"]);
        assert_eq!(reconciler.active_key(), Some("diary_1000"));
        assert_eq!(editor.fields.title, "kept");
        assert_eq!(editor.alerts.len(), 1);
    }

    #[test]
    fn selecting_vanished_record_removes_it() {
        let mut reconciler = seeded(&[
            record("diary_1000", "first", ""),
            record("diary_2000", "second", ""),
        ]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);
        reconciler.store_mut().remove("diary_1000").expect("external delete");

        reconciler.select("diary_1000", &mut editor);
        assert_eq!(listed_keys(&reconciler), vec!["diary_2000"]);
        assert_eq!(reconciler.active_key(), Some("diary_2000"));
        assert_settled(&reconciler);
    }

    #[test]
    fn selecting_corrupted_head_falls_through_to_create() {
        let mut reconciler = seeded(&[record("diary_1000", "only", "")]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);
        reconciler
            .store_mut()
            .put_raw("diary_1000", "[]")
            .expect("corrupt");

        reconciler.select("diary_1000", &mut editor);
        assert_eq!(reconciler.len(), 1);
        assert_ne!(reconciler.active_key(), Some("diary_1000"));
        assert_settled(&reconciler);
    }

    #[test]
    fn interleaved_events_keep_list_and_store_in_step() {
        let mut reconciler = seeded(&[]);
        reconciler.store_mut().put_raw("settings", "{}").expect("foreign");
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        for round in 0..12 {
            match round % 4 {
                0 | 1 => {
                    reconciler.create(&mut editor).expect("created");
                }
                2 => {
                    editor.set_fields(format!("entry {round}"), "<p>text</p>");
                    reconciler.save_active(&mut editor);
                }
                _ => reconciler.remove_active(&mut editor),
            }
            assert_settled(&reconciler);
        }

        while reconciler.len() > 1 {
            reconciler.remove_active(&mut editor);
            assert_settled(&reconciler);
        }
        reconciler.remove_active(&mut editor);
        assert_eq!(reconciler.len(), 1);
        assert!(reconciler.store().get_raw("settings").expect("read").is_some());
        assert_settled(&reconciler);
    }

    #[test]
    fn move_selection_clamps_to_list() {
        let mut reconciler = seeded(&[
            record("diary_1000", "first", ""),
            record("diary_2000", "second", ""),
        ]);
        let mut editor = HeadlessEditor::default();
        reconciler.load(&mut editor);

        reconciler.move_selection(5, &mut editor);
        assert_eq!(reconciler.active_key(), Some("diary_1000"));
        reconciler.move_selection(-5, &mut editor);
        assert_eq!(reconciler.active_key(), Some("diary_2000"));
        assert_eq!(editor.fields.title, "second");
    }
}
