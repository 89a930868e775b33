use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use strum::Display;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::diary::keys::creation_time_of;
use crate::error::{StoreError, StoreResult};

pub const DEFAULT_PLACEHOLDER_TITLE: &str = "Untitled";

static VIDEO_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<video\b[^>]*?\bsrc\s*=\s*["']([^"']*)["']"#).expect("video pattern compiles")
});
static IMAGE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']*)["']"#).expect("image pattern compiles")
});
static MARKUP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern compiles"));

/// A persisted diary entry. The key is the store address and is never part
/// of the serialised value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// On-disk JSON shape. Timestamps are optional on read so values written
/// without them still load; `createdAt` then comes from the key.
#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    title: String,
    #[serde(default)]
    content: String,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<OffsetDateTime>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<OffsetDateTime>,
}

impl Record {
    /// An empty record whose creation time is the one encoded in `key`.
    pub fn blank(key: &str, placeholder: &str) -> StoreResult<Self> {
        let created_at = creation_time_of(key)?;
        Ok(Self {
            key: key.to_string(),
            title: placeholder.to_string(),
            content: String::new(),
            created_at,
            updated_at: created_at,
        })
    }

    pub fn encode(&self) -> StoreResult<String> {
        let stored = StoredRecord {
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        };
        serde_json::to_string(&stored).map_err(|source| StoreError::Serialize {
            key: self.key.clone(),
            source,
        })
    }

    pub fn decode(key: &str, raw: &str) -> StoreResult<Self> {
        let stored: StoredRecord =
            serde_json::from_str(raw).map_err(|err| StoreError::MalformedRecord {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        let created_at = match stored.created_at {
            Some(at) => at,
            None => creation_time_of(key)?,
        };
        Ok(Self {
            key: key.to_string(),
            title: stored.title,
            content: stored.content,
            created_at,
            updated_at: stored.updated_at.unwrap_or(created_at),
        })
    }

    /// Applies editor contents, keeping the creation time.
    pub fn with_edit(&self, fields: &EditorFields, placeholder: &str, now: OffsetDateTime) -> Self {
        Self {
            key: self.key.clone(),
            title: resolve_title(&fields.title, placeholder),
            content: fields.content.clone(),
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

/// What the editor currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorFields {
    pub title: String,
    pub content: String,
}

impl EditorFields {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

impl From<&Record> for EditorFields {
    fn from(record: &Record) -> Self {
        Self::new(record.title.clone(), record.content.clone())
    }
}

pub fn resolve_title(raw: &str, placeholder: &str) -> String {
    if raw.trim().is_empty() {
        placeholder.to_string()
    } else {
        raw.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Thumbnail {
    #[strum(serialize = "video")]
    Video(String),
    #[strum(serialize = "image")]
    Image(String),
    #[strum(serialize = "no image")]
    Placeholder,
}

/// Sidebar projection of a record. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub key: String,
    pub thumbnail: Thumbnail,
    pub title: String,
    pub excerpt: String,
}

impl ListEntry {
    pub fn project(record: &Record, excerpt_len: usize) -> Self {
        Self {
            key: record.key.clone(),
            thumbnail: thumbnail_of(&record.content),
            title: record.title.clone(),
            excerpt: excerpt_of(&record.content, excerpt_len),
        }
    }
}

/// A video wins over any image, matching the order media is probed in.
pub fn thumbnail_of(markup: &str) -> Thumbnail {
    if let Some(src) = first_capture(&VIDEO_SRC, markup) {
        return Thumbnail::Video(src);
    }
    match first_capture(&IMAGE_SRC, markup) {
        Some(src) => Thumbnail::Image(src),
        None => Thumbnail::Placeholder,
    }
}

fn first_capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn text_content(markup: &str) -> String {
    let stripped = MARKUP_TAG.replace_all(markup, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn excerpt_of(markup: &str, max_graphemes: usize) -> String {
    let text = text_content(markup);
    let mut graphemes = text.graphemes(true);
    let mut excerpt = graphemes.by_ref().take(max_graphemes).collect::<String>();
    if graphemes.next().is_some() {
        excerpt.push('…');
    }
    excerpt
}
