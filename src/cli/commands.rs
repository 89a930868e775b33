use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::app::state::format_date;
use crate::app::App;
use crate::attachment;
use crate::config::{AppConfig, ConfigPaths};
use crate::diary::keys::parse_millis;
use crate::diary::{
    is_managed, HeadlessEditor, ListEntry, Reconciler, Record, SaveOutcome, Thumbnail,
};
use crate::journaling::{DraftJournal, StashedDraft};
use crate::storage::{RecordStore, SqliteStore};

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the diary ("Untitled" when omitted or blank)
    #[arg()]
    pub title: Option<String>,
    /// Provide the diary content inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Diary key, e.g. diary_1700000000000
    pub key: String,
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    /// Diary key to append the media to
    pub key: String,
    /// Image or video file
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DraftsArgs {
    /// Delete the draft with this id instead of listing
    #[arg(long)]
    pub discard: Option<String>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn new_diary(
    config: &AppConfig,
    paths: &ConfigPaths,
    store: SqliteStore,
    args: NewArgs,
) -> Result<()> {
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    let drafts = DraftJournal::new(paths.drafts_dir(), &config.drafts)?;
    let mut diaries = Reconciler::new(store, config.editor.reconciler_options());
    let key = write_new_diary(
        &mut diaries,
        &drafts,
        args.title.as_deref().unwrap_or_default(),
        &body,
    )?;
    println!("Created {key}");
    Ok(())
}

pub fn list_diaries(config: &AppConfig, store: &SqliteStore) -> Result<()> {
    let records = stored_records(store)?;
    print!("{}", format_list(&records, config.editor.excerpt_len));
    Ok(())
}

pub fn show_diary(store: &SqliteStore, args: KeyArgs) -> Result<()> {
    print!("{}", format_record(&load_record(store, &args.key)?));
    Ok(())
}

pub fn remove_diary(mut store: SqliteStore, args: KeyArgs) -> Result<()> {
    remove_record(&mut store, &args.key)?;
    println!("Removed {}", args.key);
    Ok(())
}

pub fn attach_file(
    config: &AppConfig,
    paths: &ConfigPaths,
    store: SqliteStore,
    args: AttachArgs,
) -> Result<()> {
    let attached = attachment::embed(&args.file, config.attachments.max_bytes)?;
    let drafts = DraftJournal::new(paths.drafts_dir(), &config.drafts)?;
    let mut diaries = Reconciler::new(store, config.editor.reconciler_options());
    append_to_diary(&mut diaries, &drafts, &args.key, &attached.markup)?;
    println!("Attached {} ({}) to {}", attached.name, attached.mime, args.key);
    Ok(())
}

pub fn manage_drafts(config: &AppConfig, paths: &ConfigPaths, args: DraftsArgs) -> Result<()> {
    let drafts = DraftJournal::new(paths.drafts_dir(), &config.drafts)?;
    if let Some(id) = args.discard {
        if !drafts.discard(&id)? {
            bail!("no draft with id {id}");
        }
        println!("Discarded draft {id}");
        return Ok(());
    }
    print!("{}", format_drafts(&drafts.list()?));
    Ok(())
}

pub fn report_migration(store: &SqliteStore) -> Result<()> {
    let report = store.migration();
    if report.migrated > 0 || report.from_version < report.to_version {
        println!(
            "Schema upgraded from version {} to {} ({} legacy diaries converted)",
            report.from_version, report.to_version, report.migrated
        );
    } else {
        println!("Schema already at version {}", report.to_version);
    }
    Ok(())
}

/// Saves a new diary through the reconciler so key generation and title
/// handling match the TUI. A rejected write is kept in the draft journal.
fn write_new_diary<S: RecordStore>(
    diaries: &mut Reconciler<S>,
    drafts: &DraftJournal,
    title: &str,
    body: &str,
) -> Result<String> {
    let mut editor = HeadlessEditor::default();
    let stored: HashSet<String> = diaries
        .store()
        .keys()
        .context("listing stored diaries")?
        .into_iter()
        .filter(|key| is_managed(key))
        .collect();
    // When nothing readable survives Load, the blank diary it starts
    // becomes the new one.
    diaries.load(&mut editor);
    let had_diaries = diaries
        .entries()
        .iter()
        .any(|entry| stored.contains(&entry.key));
    if had_diaries && diaries.create(&mut editor).is_none() {
        bail!(alerts_or(&editor, "could not create a diary"));
    }
    editor.set_fields(title, body);
    settle(diaries.save_active(&mut editor), drafts)
}

fn append_to_diary<S: RecordStore>(
    diaries: &mut Reconciler<S>,
    drafts: &DraftJournal,
    key: &str,
    markup: &str,
) -> Result<String> {
    if !is_managed(key) {
        bail!("{key} is not a diary key");
    }
    if diaries.store().get_raw(key)?.is_none() {
        bail!("no diary stored under {key}");
    }
    let mut editor = HeadlessEditor::default();
    diaries.load(&mut editor);
    diaries.select(key, &mut editor);
    if diaries.active_key() != Some(key) {
        bail!(alerts_or(&editor, "diary could not be loaded"));
    }
    editor.fields.content.push_str(markup);
    settle(diaries.save(key, &mut editor), drafts)
}

fn settle(outcome: SaveOutcome, drafts: &DraftJournal) -> Result<String> {
    match outcome {
        SaveOutcome::Saved { key, .. } => Ok(key),
        SaveOutcome::Rejected {
            key, draft, reason, ..
        } => match drafts.stash(&key, &draft, &reason)? {
            Some(stashed) => bail!("{reason} (draft kept as {})", stashed.id),
            None => bail!("{reason}"),
        },
    }
}

fn alerts_or(editor: &HeadlessEditor, fallback: &str) -> String {
    editor
        .alerts
        .last()
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// Readable diaries, newest first. Unreadable ones are reported, not purged.
fn stored_records<S: RecordStore>(store: &S) -> Result<Vec<Record>> {
    let mut keys: Vec<String> = store
        .keys()
        .context("listing stored diaries")?
        .into_iter()
        .filter(|key| is_managed(key))
        .collect();
    keys.sort_by_key(|key| Reverse(parse_millis(key).unwrap_or_default()));

    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        match store.get(&key) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(%key, error = %err, "skipping unreadable diary"),
        }
    }
    Ok(records)
}

fn load_record<S: RecordStore>(store: &S, key: &str) -> Result<Record> {
    if !is_managed(key) {
        bail!("{key} is not a diary key");
    }
    store
        .get(key)
        .with_context(|| format!("loading diary {key}"))
}

fn remove_record<S: RecordStore>(store: &mut S, key: &str) -> Result<()> {
    if !is_managed(key) {
        bail!("{key} is not a diary key");
    }
    if store.get_raw(key)?.is_none() {
        bail!("no diary stored under {key}");
    }
    store
        .remove(key)
        .with_context(|| format!("removing diary {key}"))
}

fn format_list(records: &[Record], excerpt_len: usize) -> String {
    if records.is_empty() {
        return "No diaries yet.\n".to_string();
    }
    let mut out = String::new();
    for record in records {
        let entry = ListEntry::project(record, excerpt_len);
        let mut headline = format!("{}  {}", entry.key, entry.title);
        if entry.thumbnail != Thumbnail::Placeholder {
            let _ = write!(&mut headline, "  [{}]", entry.thumbnail);
        }
        let _ = writeln!(&mut out, "{headline}");
        let _ = writeln!(&mut out, "    updated {}", format_date(record.updated_at));
        if !entry.excerpt.is_empty() {
            let _ = writeln!(&mut out, "    {}", entry.excerpt);
        }
        out.push('\n');
    }
    out
}

fn format_record(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", record.title);
    let _ = writeln!(
        &mut out,
        "created {} • updated {}",
        format_date(record.created_at),
        format_date(record.updated_at)
    );
    out.push('\n');
    let _ = writeln!(&mut out, "{}", record.content);
    out
}

fn format_drafts(drafts: &[StashedDraft]) -> String {
    if drafts.is_empty() {
        return "No drafts.\n".to_string();
    }
    let mut out = String::new();
    for draft in drafts {
        let _ = writeln!(&mut out, "{}  for {}", draft.id, draft.key);
        let _ = writeln!(
            &mut out,
            "    {} • {}",
            format_date(draft.stashed_at),
            draft.reason
        );
        let _ = writeln!(&mut out, "    title: {}", draft.fields.title);
    }
    out
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading diary content from stdin")?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DraftOptions;
    use crate::diary::keys::from_millis;
    use crate::diary::ReconcilerOptions;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn record(millis: i64, title: &str, content: &str) -> Record {
        let at = from_millis(millis).expect("valid millis");
        Record {
            key: format!("diary_{millis}"),
            title: title.to_string(),
            content: content.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    fn journal(temp: &TempDir) -> TestResult<DraftJournal> {
        DraftJournal::new(
            temp.path().join("drafts"),
            &DraftOptions {
                enabled: true,
                retention_hours: 0,
            },
        )
    }

    fn managed_count(store: &MemoryStore) -> usize {
        store
            .keys()
            .map(|keys| keys.iter().filter(|key| is_managed(key)).count())
            .unwrap_or_default()
    }

    #[test]
    fn list_output_is_newest_first_with_media_marker() -> TestResult {
        let mut store = MemoryStore::new();
        store.put(&record(
            1_700_000_000_000,
            "Lunch",
            r#"<p>rice ball, stir fry</p><img src="data:image/png;base64,AA==">"#,
        ))?;
        store.put(&record(1_700_000_500_000, "Untitled", ""))?;
        store.put_raw("diary_1700000900000", "{broken")?;
        store.put_raw("theme", "dark")?;

        let output = format_list(&stored_records(&store)?, 120);
        insta::assert_snapshot!(output.trim_end(), @r###"
        diary_1700000500000  Untitled
            updated 2023-11-14 22:21

        diary_1700000000000  Lunch  [image]
            updated 2023-11-14 22:13
            rice ball, stir fry
        "###);
        assert_eq!(format_list(&[], 120), "No diaries yet.\n");
        Ok(())
    }

    #[test]
    fn first_diary_reuses_the_blank_one() -> TestResult {
        let temp = TempDir::new()?;
        let drafts = journal(&temp)?;
        let mut diaries = Reconciler::new(MemoryStore::new(), ReconcilerOptions::default());

        let key = write_new_diary(&mut diaries, &drafts, "  ", "<p>first</p>")?;
        assert_eq!(managed_count(diaries.store()), 1);
        let stored = diaries.store().get(&key)?;
        assert_eq!(stored.title, "Untitled");
        assert_eq!(stored.content, "<p>first</p>");

        let second = write_new_diary(&mut diaries, &drafts, "Second", "")?;
        assert_ne!(key, second);
        assert_eq!(managed_count(diaries.store()), 2);
        assert_eq!(diaries.store().get(&second)?.title, "Second");
        Ok(())
    }

    #[test]
    fn new_diary_over_only_malformed_records_reuses_the_blank_one() -> TestResult {
        let temp = TempDir::new()?;
        let drafts = journal(&temp)?;
        let mut store = MemoryStore::new();
        store.put_raw("diary_1700000000000", "{broken")?;
        store.put_raw("diary_300000000000000", r#"{"title":"far"}"#)?;
        let mut diaries = Reconciler::new(store, ReconcilerOptions::default());

        let key = write_new_diary(&mut diaries, &drafts, "Fresh", "<p>hi</p>")?;
        assert_eq!(managed_count(diaries.store()), 1);
        assert_eq!(diaries.len(), 1);
        assert_eq!(diaries.store().get(&key)?.title, "Fresh");
        Ok(())
    }

    #[test]
    fn quota_rejection_keeps_a_draft() -> TestResult {
        let temp = TempDir::new()?;
        let drafts = journal(&temp)?;
        let mut store = MemoryStore::with_quota(4096);
        store.put(&record(1_700_000_000_000, "Trip", "short"))?;
        let mut diaries = Reconciler::new(store, ReconcilerOptions::default());

        let err = append_to_diary(
            &mut diaries,
            &drafts,
            "diary_1700000000000",
            &"x".repeat(8192),
        )
        .expect_err("over quota");
        assert!(err.to_string().contains("draft kept as"));
        assert_eq!(
            diaries.store().get("diary_1700000000000")?.content,
            "short"
        );
        let kept = drafts.list()?;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "diary_1700000000000");
        assert!(kept[0].fields.content.starts_with("short"));
        Ok(())
    }

    #[test]
    fn remove_and_show_reject_foreign_keys() -> TestResult {
        let mut store = MemoryStore::new();
        store.put_raw("theme", "dark")?;
        store.put(&record(1_700_000_000_000, "Keep", "<p>x</p>"))?;

        assert!(remove_record(&mut store, "theme").is_err());
        assert!(load_record(&store, "theme").is_err());
        assert!(remove_record(&mut store, "diary_1").is_err());

        let shown = format_record(&load_record(&store, "diary_1700000000000")?);
        assert!(shown.starts_with("Keep\ncreated 2023-11-14 22:13"));
        remove_record(&mut store, "diary_1700000000000")?;
        assert_eq!(store.get_raw("theme")?, Some("dark".to_string()));
        assert_eq!(managed_count(&store), 0);
        Ok(())
    }
}
