use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::config::{ConfigPaths, StorageOptions};
use crate::diary::Record;
use crate::error::{StoreError, StoreResult};

mod memory;
pub mod schema;

pub use memory::MemoryStore;
pub use schema::MigrationReport;

/// Flat key-value namespace holding serialised records.
///
/// Keys that do not belong to the diary may live alongside managed ones;
/// implementations store and enumerate them untouched.
pub trait RecordStore {
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes `value` under `key` in one step. On error the previous value
    /// is left as it was.
    fn put_raw(&mut self, key: &str, value: &str) -> StoreResult<()>;

    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> StoreResult<()>;

    /// All stored keys, in no particular order.
    fn keys(&self) -> StoreResult<Vec<String>>;

    fn put(&mut self, record: &Record) -> StoreResult<()> {
        let value = record.encode()?;
        self.put_raw(&record.key, &value)
    }

    fn get(&self, key: &str) -> StoreResult<Record> {
        let raw = self
            .get_raw(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Record::decode(key, &raw)
    }
}

/// Bytes a single entry counts against the quota.
pub(crate) fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// `quota == 0` disables the check.
pub(crate) fn check_quota(key: &str, required: u64, quota: u64) -> StoreResult<()> {
    if quota > 0 && required > quota {
        return Err(StoreError::QuotaExceeded {
            key: key.to_string(),
            required,
            quota,
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
    migration: MigrationReport,
}

impl SqliteStore {
    pub fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn quota(&self) -> u64 {
        self.options.quota_bytes
    }

    /// Schema migration performed when the store was opened.
    pub fn migration(&self) -> &MigrationReport {
        &self.migration
    }

    pub fn used_bytes(&self) -> StoreResult<u64> {
        self.with_connection(|conn| {
            let used: i64 = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                 FROM entries",
                [],
                |row| row.get(0),
            )?;
            Ok(used.max(0) as u64)
        })
    }
}

impl RecordStore for SqliteStore {
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM entries WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    fn put_raw(&mut self, key: &str, value: &str) -> StoreResult<()> {
        let quota = self.options.quota_bytes;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let others: i64 = tx.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM entries
             WHERE key <> ?1",
            params![key],
            |row| row.get(0),
        )?;
        let required = others.max(0) as u64 + entry_size(key, value);
        check_quota(key, required, quota)?;
        tx.execute(
            "INSERT INTO entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|err| disk_full_as_quota(err, key, required, quota))?;
        tx.commit()
            .map_err(|err| disk_full_as_quota(err, key, required, quota))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM entries")?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }
}

fn disk_full_as_quota(err: rusqlite::Error, key: &str, required: u64, quota: u64) -> StoreError {
    if err.sqlite_error_code() == Some(ErrorCode::DiskFull) {
        StoreError::QuotaExceeded {
            key: key.to_string(),
            required,
            quota,
        }
    } else {
        StoreError::from(err)
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<SqliteStore> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    let migration = schema::apply(&mut conn).context("applying storage schema")?;
    if migration.migrated > 0 {
        tracing::info!(
            from = migration.from_version,
            to = migration.to_version,
            records = migration.migrated,
            "migrated legacy diary rows"
        );
    }
    Ok(SqliteStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
        migration,
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPaths;
    use crate::diary::EditorFields;
    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        let data_dir = base.join("data");
        let state_dir = base.join("state");
        ConfigPaths {
            config_dir: base.join("config"),
            config_file: base.join("config/config.toml"),
            data_dir: data_dir.clone(),
            database_path: data_dir.join("diary.db"),
            cache_dir: base.join("cache"),
            log_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    fn init_storage(quota_bytes: u64) -> anyhow::Result<(TempDir, SqliteStore)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        let options = StorageOptions {
            quota_bytes,
            ..StorageOptions::default()
        };
        let store = init(&paths, &options)?;
        Ok((temp, store))
    }

    #[test]
    fn put_get_remove_round_trip() -> anyhow::Result<()> {
        let (_temp, mut store) = init_storage(0)?;
        let record = Record::blank("diary_1000", "Untitled")?;
        store.put(&record)?;
        assert_eq!(store.get("diary_1000")?, record);

        store.remove("diary_1000")?;
        assert_matches!(store.get("diary_1000"), Err(StoreError::NotFound(_)));
        store.remove("diary_1000")?;
        Ok(())
    }

    #[test]
    fn keys_include_foreign_entries() -> anyhow::Result<()> {
        let (_temp, mut store) = init_storage(0)?;
        store.put(&Record::blank("diary_1", "Untitled")?)?;
        store.put_raw("theme", "dark")?;
        let mut keys = store.keys()?;
        keys.sort();
        assert_eq!(keys, vec!["diary_1".to_string(), "theme".to_string()]);
        Ok(())
    }

    #[test]
    fn quota_rejection_keeps_previous_value() -> anyhow::Result<()> {
        let (_temp, mut store) = init_storage(200)?;
        let original = Record::blank("diary_1000", "Untitled")?;
        store.put(&original)?;

        let fields = EditorFields::new("Big", "x".repeat(500));
        let oversized = original.with_edit(&fields, "Untitled", OffsetDateTime::now_utc());
        let err = store.put(&oversized).expect_err("quota should reject");
        assert!(err.is_quota(), "unexpected error {err:?}");
        assert_eq!(store.get("diary_1000")?, original);
        assert!(store.used_bytes()? <= store.quota());
        Ok(())
    }

    #[test]
    fn overwrite_is_measured_without_old_value() -> anyhow::Result<()> {
        let (_temp, mut store) = init_storage(120)?;
        store.put_raw("diary_1", &"a".repeat(100))?;
        store.put_raw("diary_1", &"b".repeat(100))?;
        assert_eq!(store.get_raw("diary_1")?, Some("b".repeat(100)));
        assert_matches!(
            store.put_raw("diary_2", &"c".repeat(20)),
            Err(StoreError::QuotaExceeded { required: 134, quota: 120, .. })
        );
        Ok(())
    }

    #[test]
    fn fresh_database_reports_current_schema() -> anyhow::Result<()> {
        let (_temp, store) = init_storage(0)?;
        assert_eq!(store.migration().to_version, schema::CURRENT_VERSION);
        assert_eq!(store.migration().migrated, 0);
        Ok(())
    }
}
