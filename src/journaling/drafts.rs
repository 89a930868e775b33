use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::DraftOptions;
use crate::diary::EditorFields;

const DRAFT_PREFIX: &str = "draft-";
const DRAFT_EXTENSION: &str = "json";
const DRAFT_TMP_EXTENSION: &str = "json.tmp";

/// Editor contents the store refused to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashedDraft {
    pub id: String,
    pub key: String,
    pub stashed_at: OffsetDateTime,
    pub reason: String,
    pub fields: EditorFields,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftFile {
    id: String,
    key: String,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    stashed_at: OffsetDateTime,
    reason: String,
    title: String,
    content: String,
}

/// One JSON file per stashed draft under the state directory. Files are
/// written to a temporary name and renamed into place, so a crash mid-write
/// never leaves a truncated draft behind.
#[derive(Debug)]
pub struct DraftJournal {
    enabled: bool,
    retention: Option<Duration>,
    dir: PathBuf,
}

impl DraftJournal {
    pub fn new(dir: PathBuf, options: &DraftOptions) -> Result<Self> {
        if options.enabled {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating draft journal dir {}", dir.display()))?;
        }
        Ok(Self {
            enabled: options.enabled,
            retention: options.retention(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `None` when the journal is disabled.
    pub fn stash(
        &self,
        key: &str,
        fields: &EditorFields,
        reason: &str,
    ) -> Result<Option<StashedDraft>> {
        if !self.enabled {
            tracing::debug!(key, "draft journal disabled, dropping rejected draft");
            return Ok(None);
        }
        let draft = StashedDraft {
            id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            stashed_at: OffsetDateTime::now_utc(),
            reason: reason.to_string(),
            fields: fields.clone(),
        };
        self.write_draft(&draft)?;
        tracing::info!(id = %draft.id, key, "stashed rejected draft");
        Ok(Some(draft))
    }

    /// Newest first. Drafts past the retention window are deleted on the way.
    pub fn list(&self) -> Result<Vec<StashedDraft>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading draft journal {}", self.dir.display()))
            }
        };

        let cutoff = self
            .retention
            .map(|retention| OffsetDateTime::now_utc() - retention);
        let mut drafts = Vec::new();
        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(?err, "skipping unreadable draft entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() || !is_draft_file(&path) {
                continue;
            }
            let draft = match read_draft(&path) {
                Ok(draft) => draft,
                Err(err) => {
                    tracing::warn!(?err, "failed to parse draft {}", path.display());
                    continue;
                }
            };
            if cutoff.is_some_and(|cutoff| draft.stashed_at < cutoff) {
                tracing::info!(id = %draft.id, "dropping expired draft");
                remove_path(&path)?;
                continue;
            }
            drafts.push(draft);
        }

        drafts.sort_by(|a, b| match b.stashed_at.cmp(&a.stashed_at) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });
        Ok(drafts)
    }

    pub fn latest_for(&self, key: &str) -> Result<Option<StashedDraft>> {
        Ok(self.list()?.into_iter().find(|draft| draft.key == key))
    }

    /// Reads a draft and removes it from the journal.
    pub fn take(&self, id: &str) -> Result<Option<StashedDraft>> {
        let path = self.draft_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let draft = read_draft(&path)?;
        remove_path(&path)?;
        Ok(Some(draft))
    }

    /// Returns whether a draft with this id existed.
    pub fn discard(&self, id: &str) -> Result<bool> {
        let path = self.draft_path(id);
        let existed = path.exists();
        remove_path(&path)?;
        Ok(existed)
    }

    fn write_draft(&self, draft: &StashedDraft) -> Result<()> {
        let file = DraftFile {
            id: draft.id.clone(),
            key: draft.key.clone(),
            stashed_at: draft.stashed_at,
            reason: draft.reason.clone(),
            title: draft.fields.title.clone(),
            content: draft.fields.content.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).context("serialising draft")?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("ensuring draft dir {}", self.dir.display()))?;
        let final_path = self.draft_path(&draft.id);
        let tmp_path = final_path.with_extension(DRAFT_TMP_EXTENSION);
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary draft {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("persisting draft {}", final_path.display()))?;
        Ok(())
    }

    fn draft_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{DRAFT_PREFIX}{id}.{DRAFT_EXTENSION}"))
    }
}

fn is_draft_file(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(DRAFT_PREFIX));
    named && path.extension().and_then(|ext| ext.to_str()) == Some(DRAFT_EXTENSION)
}

fn read_draft(path: &Path) -> Result<StashedDraft> {
    let raw = fs::read(path).with_context(|| format!("reading draft {}", path.display()))?;
    let file: DraftFile = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing draft {}", path.display()))?;
    Ok(StashedDraft {
        id: file.id,
        key: file.key,
        stashed_at: file.stashed_at,
        reason: file.reason,
        fields: EditorFields::new(file.title, file.content),
    })
}

fn remove_path(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing draft {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> DraftOptions {
        DraftOptions {
            enabled: true,
            retention_hours: 0,
        }
    }

    #[test]
    fn stashed_drafts_survive_a_restart() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("drafts");
        let fields = EditorFields::new("Trip", "<p>long day</p>");

        let stashed = {
            let journal = DraftJournal::new(dir.clone(), &options())?;
            journal
                .stash("diary_1700000000000", &fields, "local storage is full")?
                .expect("journal enabled")
        };

        let journal = DraftJournal::new(dir, &options())?;
        let listed = journal.list()?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stashed.id);
        assert_eq!(listed[0].fields, fields);
        assert_eq!(
            journal.latest_for("diary_1700000000000")?.map(|d| d.id),
            Some(stashed.id.clone())
        );

        let taken = journal.take(&stashed.id)?.expect("draft present");
        assert_eq!(taken.reason, "local storage is full");
        assert!(journal.list()?.is_empty());
        assert!(journal.take(&stashed.id)?.is_none());
        Ok(())
    }

    #[test]
    fn discard_and_foreign_files() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let journal = DraftJournal::new(temp.path().to_path_buf(), &options())?;
        fs::write(temp.path().join("notes.json"), "{}")?;
        fs::write(temp.path().join("draft-broken.json"), "not json")?;

        let draft = journal
            .stash("diary_1", &EditorFields::new("a", "b"), "full")?
            .expect("journal enabled");
        assert_eq!(journal.list()?.len(), 1);
        assert!(journal.discard(&draft.id)?);
        assert!(!journal.discard(&draft.id)?);
        assert!(temp.path().join("notes.json").exists());
        Ok(())
    }

    #[test]
    fn expired_drafts_are_pruned() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let journal = DraftJournal::new(
            temp.path().to_path_buf(),
            &DraftOptions {
                enabled: true,
                retention_hours: 1,
            },
        )?;
        let old = StashedDraft {
            id: "old".to_string(),
            key: "diary_1".to_string(),
            stashed_at: OffsetDateTime::now_utc() - Duration::hours(2),
            reason: "full".to_string(),
            fields: EditorFields::new("", ""),
        };
        journal.write_draft(&old)?;
        journal.stash("diary_2", &EditorFields::new("new", ""), "full")?;

        let listed = journal.list()?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "diary_2");
        assert!(!temp.path().join("draft-old.json").exists());
        Ok(())
    }

    #[test]
    fn disabled_journal_keeps_nothing() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("drafts");
        let journal = DraftJournal::new(
            dir.clone(),
            &DraftOptions {
                enabled: false,
                retention_hours: 0,
            },
        )?;
        assert!(journal
            .stash("diary_1", &EditorFields::new("a", "b"), "full")?
            .is_none());
        assert!(journal.list()?.is_empty());
        assert!(!dir.exists());
        Ok(())
    }
}
