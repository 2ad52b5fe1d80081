//! Playlist subscriptions

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::models::{AppError, AppResult, DownloadStatus, OutputFormat, Playlist};
use crate::core::storage::{from_unix, to_unix, Database};

const PLAYLIST_COLUMNS: &str =
    "id, name, locator, output_format, save_directory, thumbnail_base64, is_enabled, added_at";

/// Input for a new subscription
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub name: String,
    pub locator: String,
    pub output_format: OutputFormat,
    pub save_directory: PathBuf,
    pub thumbnail_base64: Option<String>,
}

#[derive(Clone)]
pub struct PlaylistStore {
    db: Database,
}

impl PlaylistStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a subscription. The same (locator, directory, format) may only be subscribed once.
    pub fn add_playlist(&self, playlist: NewPlaylist) -> AppResult<i64> {
        if playlist.locator.trim().is_empty() {
            return Err(AppError::Config("playlist locator must not be empty".into()));
        }
        if self.is_duplicate_config(
            &playlist.locator,
            &playlist.save_directory,
            playlist.output_format,
        )? {
            return Err(AppError::Config(format!(
                "playlist {} is already archived as {} into {:?}",
                playlist.locator, playlist.output_format, playlist.save_directory
            )));
        }

        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO playlists
                     (name, locator, output_format, save_directory, thumbnail_base64, is_enabled, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                params![
                    playlist.name,
                    playlist.locator,
                    playlist.output_format.as_str(),
                    playlist.save_directory.to_string_lossy(),
                    playlist.thumbnail_base64,
                    to_unix(Utc::now()),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!(playlist_id = id, "➕ Added playlist {}", playlist.name);
        Ok(id)
    }

    pub fn is_duplicate_config(
        &self,
        locator: &str,
        save_directory: &Path,
        format: OutputFormat,
    ) -> AppResult<bool> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM playlists
                 WHERE locator = ?1 AND save_directory = ?2 AND output_format = ?3 AND is_enabled = 1",
                params![locator, save_directory.to_string_lossy(), format.as_str()],
                |row| row.get(0),
            )
        })?;
        Ok(count > 0)
    }

    /// Enabled playlists in insertion order
    pub fn get_active_playlists(&self) -> AppResult<Vec<Playlist>> {
        self.query(
            &format!(
                "SELECT {} FROM playlists WHERE is_enabled = 1 ORDER BY id ASC",
                PLAYLIST_COLUMNS
            ),
            [],
        )
    }

    /// All playlists, newest first
    pub fn get_playlists(&self) -> AppResult<Vec<Playlist>> {
        self.query(
            &format!("SELECT {} FROM playlists ORDER BY id DESC", PLAYLIST_COLUMNS),
            [],
        )
    }

    pub fn get_playlist(&self, id: i64) -> AppResult<Playlist> {
        let sql = format!("SELECT {} FROM playlists WHERE id = ?1", PLAYLIST_COLUMNS);
        let found = self.db.with_conn(|conn| {
            conn.query_row(&sql, params![id], |row| Ok(map_playlist(row)))
                .optional()
        })?;
        found
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("playlist {}", id)))
    }

    pub fn update_directory(&self, id: i64, directory: &Path) -> AppResult<()> {
        self.update_one(
            "UPDATE playlists SET save_directory = ?1 WHERE id = ?2",
            params![directory.to_string_lossy(), id],
            id,
        )
    }

    pub fn update_name(&self, id: i64, name: &str) -> AppResult<()> {
        self.update_one(
            "UPDATE playlists SET name = ?1 WHERE id = ?2",
            params![name, id],
            id,
        )
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> AppResult<()> {
        self.update_one(
            "UPDATE playlists SET is_enabled = ?1 WHERE id = ?2",
            params![enabled, id],
            id,
        )
    }

    /// Soft delete: the playlist stops being scanned and its history is marked orphaned
    pub fn disable_playlist(&self, id: i64) -> AppResult<()> {
        let changed = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE playlists SET is_enabled = 0 WHERE id = ?1",
                params![id],
            )?;
            for status in DownloadStatus::ALL {
                let removed = status.playlist_removed();
                if removed == status {
                    continue;
                }
                tx.execute(
                    "UPDATE downloads SET status = ?1 WHERE playlist_id = ?2 AND status = ?3",
                    params![removed.code(), id, status.code()],
                )?;
            }
            tx.commit()?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Err(AppError::NotFound(format!("playlist {}", id)));
        }
        info!(playlist_id = id, "🗑️ Disabled playlist");
        Ok(())
    }

    fn update_one(&self, sql: &str, params: impl rusqlite::Params, id: i64) -> AppResult<()> {
        let changed = self.db.with_conn(|conn| conn.execute(sql, params))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("playlist {}", id)));
        }
        Ok(())
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> AppResult<Vec<Playlist>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, |row| Ok(map_playlist(row)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().collect()
    }
}

fn map_playlist(row: &Row<'_>) -> AppResult<Playlist> {
    let format: String = row.get(3)?;
    let save_directory: String = row.get(4)?;
    Ok(Playlist {
        id: row.get(0)?,
        name: row.get(1)?,
        locator: row.get(2)?,
        output_format: format.parse()?,
        save_directory: PathBuf::from(save_directory),
        thumbnail_base64: row.get(5)?,
        is_enabled: row.get(6)?,
        added_at: from_unix(row.get(7)?),
    })
}
