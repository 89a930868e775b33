//! Error types for the record store and the list reconciler.
//!
//! Store failures are split so callers can tell a full store apart from a
//! corrupt value: the reconciler rolls the editor back on `QuotaExceeded`
//! and purges the record on `MalformedRecord`.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing the value would push the namespace past its byte quota.
    #[error("storage quota exceeded writing {key}: {required} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        required: u64,
        quota: u64,
    },

    /// No value stored under the key.
    #[error("no record stored under {0}")]
    NotFound(String),

    /// The stored value could not be decoded into a record.
    #[error("record {key} is malformed: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// The key does not follow the `diary_<millis>` pattern.
    #[error("malformed diary key {0:?}")]
    MalformedKey(String),

    /// The record could not be serialised; nothing was written.
    #[error("serialising record {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Unsupported or inconsistent on-disk schema.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }

    /// Errors that mean the record itself is unusable and should be purged.
    pub fn is_unreadable_record(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::MalformedRecord { .. } | StoreError::MalformedKey(_)
        )
    }
}
