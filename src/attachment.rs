use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

const VIDEO_MIME: &str = "video/mp4";
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("could not attach “{name}”: only files smaller than {} can be attached", human_size(.limit))]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("could not read attachment {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A media file rendered as inline markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime: &'static str,
    pub markup: String,
}

/// Reads `path` and embeds it as a data URL. Files of `max_bytes` or more
/// are refused before their contents are read.
pub fn embed(path: &Path, max_bytes: u64) -> Result<Attachment, AttachmentError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let read_err = |source| AttachmentError::Read {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(read_err)?.len();
    if size >= max_bytes {
        tracing::info!(file = %name, size, limit = max_bytes, "attachment refused");
        return Err(AttachmentError::TooLarge {
            name,
            size,
            limit: max_bytes,
        });
    }

    let bytes = fs::read(path).map_err(read_err)?;
    let mime = mime_for(path);
    let markup = markup_for(mime, &data_url(mime, &bytes));
    tracing::debug!(file = %name, mime, size, "attachment embedded");
    Ok(Attachment { name, mime, markup })
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// `video/mp4` plays inline; everything else is shown as an image.
pub fn markup_for(mime: &str, url: &str) -> String {
    if mime == VIDEO_MIME {
        format!(r#"<video src="{url}" controls></video>"#)
    } else {
        format!(r#"<img src="{url}">"#)
    }
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => VIDEO_MIME,
        Some("webm") => "video/webm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => FALLBACK_MIME,
    }
}

fn human_size(bytes: &u64) -> String {
    let bytes = *bytes;
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{bytes} bytes")
    }
}
