use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::diary::keys::{from_millis, now_millis, KeyGenerator};
use crate::diary::record::{resolve_title, DEFAULT_PLACEHOLDER_TITLE};
use crate::diary::Record;
use crate::error::{StoreError, StoreResult};

/// Auto-increment layout: one row per diary, addressed by an integer id.
pub const LEGACY_VERSION: i64 = 1;
/// Key-addressed layout: one `diary_<millis>` key per record.
pub const CURRENT_VERSION: i64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub migrated: usize,
}

/// Brings the database to `CURRENT_VERSION`. Runs in a single transaction,
/// so a failed migration leaves the legacy rows in place.
///
/// `PRAGMA user_version` carries the schema version. A database that still
/// has the legacy `diaries` table but no version stamp predates versioning
/// and is treated as `LEGACY_VERSION`.
pub fn apply(conn: &mut Connection) -> StoreResult<MigrationReport> {
    let stamped: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let legacy_present = table_exists(conn, "diaries")?;
    let from_version = if stamped == 0 && legacy_present {
        LEGACY_VERSION
    } else {
        stamped
    };
    if from_version > CURRENT_VERSION {
        return Err(StoreError::Schema(format!(
            "database schema version {from_version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )?;
    let migrated = if legacy_present && from_version <= LEGACY_VERSION {
        migrate_legacy_rows(&tx)?
    } else {
        0
    };
    tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
    tx.commit()?;

    Ok(MigrationReport {
        from_version,
        to_version: CURRENT_VERSION,
        migrated,
    })
}

fn table_exists(conn: &Connection, name: &str) -> StoreResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

struct LegacyRow {
    id: i64,
    title: String,
    body: String,
    created_at: Option<i64>,
    updated_at: Option<i64>,
}

/// Rewrites every legacy row as a keyed record, then drops the old table.
/// Quota is not enforced here; the rows already lived in this database.
fn migrate_legacy_rows(tx: &Transaction<'_>) -> StoreResult<usize> {
    let mut keys = KeyGenerator::new();
    {
        let mut stmt = tx.prepare("SELECT key FROM entries")?;
        let existing = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for key in existing {
            keys.observe(&key?);
        }
    }

    let rows = {
        let mut stmt = tx.prepare(
            "SELECT id, title, body, created_at, updated_at FROM diaries ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyRow {
                    id: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    body: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    for row in &rows {
        let created_millis = row.created_at.unwrap_or_else(now_millis);
        let key = keys.next_at(created_millis);
        let created_at = from_millis(created_millis).ok_or_else(|| {
            StoreError::Schema(format!("legacy row {} has invalid created_at", row.id))
        })?;
        let updated_at = row
            .updated_at
            .and_then(from_millis)
            .unwrap_or(created_at);
        let record = Record {
            key,
            title: resolve_title(&row.title, DEFAULT_PLACEHOLDER_TITLE),
            content: row.body.clone(),
            created_at,
            updated_at,
        };
        tx.execute(
            "INSERT INTO entries (key, value) VALUES (?1, ?2)",
            params![record.key, record.encode()?],
        )?;
        tracing::debug!(legacy_id = row.id, key = %record.key, "migrated legacy diary row");
    }

    tx.execute_batch("DROP TABLE diaries;")?;
    Ok(rows.len())
}
