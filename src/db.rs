//! Local SQLite store for sheetops.
//!
//! The spreadsheet is the system of record; this database only holds what
//! must survive locally between runs: connection settings for installs
//! without a usable keyring backend, and the delivery-partner city-lookup
//! cache. Uses rusqlite with WAL mode and versioned migrations.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Initialize the database at `{data_dir}/sheetops.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("sheetops.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS local_settings (
             category TEXT NOT NULL,
             key TEXT NOT NULL,
             value TEXT NOT NULL,
             updated_at TEXT DEFAULT (datetime('now')),
             PRIMARY KEY (category, key)
         );
         CREATE TABLE IF NOT EXISTS city_cache (
             waybill_id TEXT PRIMARY KEY,
             payload TEXT NOT NULL,
             cached_at TEXT NOT NULL
         );
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )
    .map_err(|e| format!("migration v1: {e}"))
}

#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("test migrations");
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT value FROM local_settings WHERE category = ?1 AND key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .optional()
    .ok()
    .flatten()
}

pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (category, key, value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(category, key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// City-lookup cache (10-minute TTL enforced by the reader)
// ---------------------------------------------------------------------------

/// Return the cached payload for `waybill_id` if it is younger than
/// `ttl_minutes`. Stale rows are deleted on read.
pub fn cache_get(
    conn: &Connection,
    waybill_id: &str,
    ttl_minutes: i64,
) -> Option<serde_json::Value> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT payload, cached_at FROM city_cache WHERE waybill_id = ?1",
            params![waybill_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .ok()
        .flatten();

    let (payload, cached_at) = row?;
    let cached_at = chrono::DateTime::parse_from_rfc3339(&cached_at).ok()?;
    let age = chrono::Utc::now().signed_duration_since(cached_at);
    if age > chrono::Duration::minutes(ttl_minutes) {
        let _ = conn.execute(
            "DELETE FROM city_cache WHERE waybill_id = ?1",
            params![waybill_id],
        );
        return None;
    }
    serde_json::from_str(&payload).ok()
}

pub fn cache_put(
    conn: &Connection,
    waybill_id: &str,
    payload: &serde_json::Value,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO city_cache (waybill_id, payload, cached_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(waybill_id) DO UPDATE SET
             payload = excluded.payload,
             cached_at = excluded.cached_at",
        params![
            waybill_id,
            payload.to_string(),
            chrono::Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| format!("cache_put: {e}"))?;
    Ok(())
}
