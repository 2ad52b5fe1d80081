//! SQLite storage handle
//!
//! One connection per process, shared through a cheap cloneable handle.
//! Statements are short and run inline while the mutex is held.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::models::{AppError, AppResult};

pub const SETTING_DAEMON_SIGNAL: &str = "daemon_signal";
pub const SETTING_ALLOW_DUPLICATES: &str = "allow_duplicates";

/// Ordered schema migrations, index + 1 is the resulting `user_version`
const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS settings (
        setting_key   TEXT PRIMARY KEY,
        setting_value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS playlists (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL,
        locator          TEXT NOT NULL,
        output_format    TEXT NOT NULL,
        save_directory   TEXT NOT NULL,
        thumbnail_base64 TEXT,
        is_enabled       INTEGER NOT NULL DEFAULT 1,
        added_at         INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS downloads (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id       INTEGER NOT NULL REFERENCES playlists(id),
        url               TEXT NOT NULL,
        status            INTEGER NOT NULL,
        format_downloaded TEXT NOT NULL,
        digest            TEXT,
        output_filename   TEXT,
        last_attempt      INTEGER NOT NULL,
        fail_message      TEXT,
        attempt_count     INTEGER NOT NULL DEFAULT 0,
        UNIQUE (playlist_id, url)
    );
    CREATE INDEX IF NOT EXISTS idx_downloads_digest ON downloads(digest);

    CREATE TABLE IF NOT EXISTS file_registry (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        filename      TEXT NOT NULL,
        file_path     TEXT NOT NULL UNIQUE,
        digest        TEXT NOT NULL,
        registered_at INTEGER NOT NULL,
        known_url     TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_file_registry_digest ON file_registry(digest);
    CREATE INDEX IF NOT EXISTS idx_file_registry_known_url ON file_registry(known_url);

    INSERT OR IGNORE INTO settings (setting_key, setting_value) VALUES ('daemon_signal', '0');
    INSERT OR IGNORE INTO settings (setting_key, setting_value) VALUES ('allow_duplicates', 'false');
"#];

/// Cloneable handle to the process-wide database connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database file and bring the schema up to date
    pub fn open(path: &Path, busy_timeout: Duration) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);

        let db = Self::from_connection(conn)?;
        info!("🗄️ Database ready at {:?}", path);
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> AppResult<Self> {
        Self::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection) -> AppResult<()> {
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (index, sql) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version <= current {
                continue;
            }
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()?;
            info!("Applied database migration {}", version);
        }

        Ok(())
    }

    pub fn schema_version(&self) -> AppResult<i64> {
        self.with_conn(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get(0)))
    }

    /// Run a closure against the connection while holding the lock
    pub fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn).map_err(AppError::from)
    }

    pub fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT setting_value FROM settings WHERE setting_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Boolean setting, absent keys read as `false`
    pub fn get_setting_bool(&self, key: &str) -> AppResult<bool> {
        Ok(self
            .get_setting(key)?
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (setting_key, setting_value) VALUES (?1, ?2)
                 ON CONFLICT(setting_key) DO UPDATE SET setting_value = excluded.setting_value",
                params![key, value],
            )
        })?;
        Ok(())
    }
}

/// Unix seconds as stored in the timestamp columns
pub(crate) fn to_unix(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}
