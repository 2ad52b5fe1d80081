//! Download history persistence

use rusqlite::{params, OptionalExtension, Row};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::core::models::{AppError, AppResult, Download, DownloadStatus};
use crate::core::storage::{from_unix, to_unix, Database};

const DOWNLOAD_COLUMNS: &str = "id, playlist_id, url, status, format_downloaded, digest, \
     output_filename, last_attempt, fail_message, attempt_count";

/// A previously archived download whose content matched a digest
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedCopy {
    pub download_id: i64,
    pub playlist_id: i64,
    pub output_filename: String,
    pub file_path: PathBuf,
}

#[derive(Clone)]
pub struct DownloadStore {
    db: Database,
}

impl DownloadStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get_downloads_for_playlist(&self, playlist_id: i64) -> AppResult<Vec<Download>> {
        self.query(
            &format!(
                "SELECT {} FROM downloads WHERE playlist_id = ?1 ORDER BY id ASC",
                DOWNLOAD_COLUMNS
            ),
            params![playlist_id],
        )
    }

    pub fn get_download(&self, id: i64) -> AppResult<Download> {
        let sql = format!("SELECT {} FROM downloads WHERE id = ?1", DOWNLOAD_COLUMNS);
        let found = self.db.with_conn(|conn| {
            conn.query_row(&sql, params![id], |row| Ok(map_download(row)))
                .optional()
        })?;
        found
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("download {}", id)))
    }

    /// Most recently attempted first
    pub fn get_all_downloads(&self, limit: usize) -> AppResult<Vec<Download>> {
        self.query(
            &format!(
                "SELECT {} FROM downloads ORDER BY last_attempt DESC, id DESC LIMIT ?1",
                DOWNLOAD_COLUMNS
            ),
            params![limit as i64],
        )
    }

    /// Paged history filtered by success and/or failure families
    pub fn get_history_page(
        &self,
        offset: usize,
        limit: usize,
        show_success: bool,
        show_failed: bool,
    ) -> AppResult<Vec<Download>> {
        let codes: Vec<String> = DownloadStatus::ALL
            .into_iter()
            .filter(|status| {
                (show_success && status.is_success()) || (show_failed && status.is_failure())
            })
            .map(|status| status.code().to_string())
            .collect();

        if codes.is_empty() {
            return Ok(Vec::new());
        }

        // codes are integers we produced ourselves
        self.query(
            &format!(
                "SELECT {} FROM downloads WHERE status IN ({})
                 ORDER BY last_attempt DESC, id DESC LIMIT ?1 OFFSET ?2",
                DOWNLOAD_COLUMNS,
                codes.join(",")
            ),
            params![limit as i64, offset as i64],
        )
    }

    /// Archived copy with this digest, ignoring `exclude_id` and optionally limited to one playlist.
    ///
    /// Only `Success` rows count. A `SuccessDuplicate` row names a file that
    /// lives in another playlist's directory, so its path cannot be rebuilt
    /// from its own playlist.
    pub fn find_success_by_digest(
        &self,
        digest: &str,
        exclude_id: Option<i64>,
        playlist_scope: Option<i64>,
    ) -> AppResult<Option<ArchivedCopy>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT d.id, d.playlist_id, d.output_filename, p.save_directory
                 FROM downloads d
                 JOIN playlists p ON p.id = d.playlist_id
                 WHERE d.digest = ?1
                   AND d.status = ?4
                   AND d.output_filename IS NOT NULL AND d.output_filename != ''
                   AND (?2 IS NULL OR d.id != ?2)
                   AND (?3 IS NULL OR d.playlist_id = ?3)
                 ORDER BY d.id ASC
                 LIMIT 1",
                params![
                    digest,
                    exclude_id,
                    playlist_scope,
                    DownloadStatus::Success.code()
                ],
                |row| {
                    let output_filename: String = row.get(2)?;
                    let directory: String = row.get(3)?;
                    Ok(ArchivedCopy {
                        download_id: row.get(0)?,
                        playlist_id: row.get(1)?,
                        file_path: PathBuf::from(directory).join(&output_filename),
                        output_filename,
                    })
                },
            )
            .optional()
        })
    }

    /// Insert on first attempt, update in place afterwards
    pub fn save(&self, download: &mut Download) -> AppResult<()> {
        let last_attempt = download.last_attempt.map(to_unix).unwrap_or(0);

        match download.id {
            None => {
                let id = self.db.with_conn(|conn| {
                    conn.execute(
                        "INSERT INTO downloads
                             (playlist_id, url, status, format_downloaded, digest, output_filename,
                              last_attempt, fail_message, attempt_count)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            download.playlist_id,
                            download.url,
                            download.status.code(),
                            download.format_downloaded.as_str(),
                            download.digest,
                            download.output_filename,
                            last_attempt,
                            download.fail_message,
                            download.attempt_count,
                        ],
                    )?;
                    Ok(conn.last_insert_rowid())
                })?;
                download.id = Some(id);
                debug!(download_id = id, url = %download.url, "Inserted download row");
            }
            Some(id) => {
                let changed = self.db.with_conn(|conn| {
                    conn.execute(
                        "UPDATE downloads SET
                             status = ?1, format_downloaded = ?2, digest = ?3, output_filename = ?4,
                             last_attempt = ?5, fail_message = ?6, attempt_count = ?7
                         WHERE id = ?8",
                        params![
                            download.status.code(),
                            download.format_downloaded.as_str(),
                            download.digest,
                            download.output_filename,
                            last_attempt,
                            download.fail_message,
                            download.attempt_count,
                            id,
                        ],
                    )
                })?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("download {}", id)));
                }
            }
        }

        Ok(())
    }

    /// Move a single failed row back into the retry pool
    pub fn set_manual_retry(&self, id: i64) -> AppResult<bool> {
        let mut download = self.get_download(id)?;
        if !download.request_manual_retry() {
            debug!(download_id = id, status = %download.status, "Manual retry not applicable");
            return Ok(false);
        }
        self.save(&mut download)?;
        info!(download_id = id, "🔁 Download queued for manual retry");
        Ok(true)
    }

    /// Move every given-up row back into the retry pool
    pub fn requeue_all_given_up(&self) -> AppResult<usize> {
        let now = to_unix(chrono::Utc::now());
        let count = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE downloads SET status = ?1, last_attempt = ?2 WHERE status = ?3",
                params![
                    DownloadStatus::FailedManualRetry.code(),
                    now,
                    DownloadStatus::FailedGiveUp.code()
                ],
            )
        })?;
        info!("🔁 Requeued {} given-up downloads", count);
        Ok(count)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> AppResult<Vec<Download>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, |row| Ok(map_download(row)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().collect()
    }
}

fn map_download(row: &Row<'_>) -> AppResult<Download> {
    let code: i64 = row.get(3)?;
    let status = DownloadStatus::from_code(code)
        .ok_or_else(|| AppError::Config(format!("unknown download status code {}", code)))?;
    let format: String = row.get(4)?;
    let last_attempt: i64 = row.get(7)?;

    Ok(Download {
        id: Some(row.get(0)?),
        playlist_id: row.get(1)?,
        url: row.get(2)?,
        status,
        format_downloaded: format.parse()?,
        digest: row.get(5)?,
        output_filename: row.get(6)?,
        last_attempt: (last_attempt > 0).then(|| from_unix(last_attempt)),
        fail_message: row.get(8)?,
        attempt_count: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::OutputFormat;
    use crate::core::playlists::{NewPlaylist, PlaylistStore};

    fn setup() -> AppResult<(DownloadStore, PlaylistStore, i64)> {
        let db = Database::open_in_memory()?;
        let playlists = PlaylistStore::new(db.clone());
        let playlist_id = playlists.add_playlist(NewPlaylist {
            name: "Mix".into(),
            locator: "PLmix".into(),
            output_format: OutputFormat::Mp3,
            save_directory: PathBuf::from("/music"),
            thumbnail_base64: None,
        })?;
        Ok((DownloadStore::new(db), playlists, playlist_id))
    }

    #[test]
    fn test_save_inserts_then_updates_in_place() -> AppResult<()> {
        let (store, _, playlist_id) = setup()?;

        let mut download = Download::new(playlist_id, "https://v/1", OutputFormat::Mp3);
        download.record_failure("ERROR: nope", 5)?;
        store.save(&mut download)?;
        let id = download.id.unwrap();

        download.record_success("Song.mp3", "d1")?;
        store.save(&mut download)?;
        assert_eq!(download.id, Some(id));

        let rows = store.get_downloads_for_playlist(playlist_id)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, DownloadStatus::Success);
        assert_eq!(rows[0].attempt_count, 2);
        assert_eq!(rows[0].fail_message, None);
        Ok(())
    }

    #[test]
    fn test_find_success_by_digest_scoping() -> AppResult<()> {
        let (store, playlists, playlist_id) = setup()?;
        let other_playlist = playlists.add_playlist(NewPlaylist {
            name: "Other".into(),
            locator: "PLother".into(),
            output_format: OutputFormat::Mp3,
            save_directory: PathBuf::from("/other"),
            thumbnail_base64: None,
        })?;

        let mut download = Download::new(other_playlist, "https://v/1", OutputFormat::Mp3);
        download.record_success("Song.mp3", "d1")?;
        store.save(&mut download)?;
        let id = download.id.unwrap();

        let found = store.find_success_by_digest("d1", None, None)?.unwrap();
        assert_eq!(found.download_id, id);
        assert_eq!(found.file_path, PathBuf::from("/other").join("Song.mp3"));

        assert!(store.find_success_by_digest("d1", Some(id), None)?.is_none());
        assert!(store
            .find_success_by_digest("d1", None, Some(playlist_id))?
            .is_none());
        assert!(store
            .find_success_by_digest("d1", None, Some(other_playlist))?
            .is_some());
        assert!(store.find_success_by_digest("zz", None, None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_find_success_by_digest_ignores_duplicate_rows() -> AppResult<()> {
        let (store, playlists, playlist_id) = setup()?;
        let other_playlist = playlists.add_playlist(NewPlaylist {
            name: "Other".into(),
            locator: "PLother".into(),
            output_format: OutputFormat::Mp3,
            save_directory: PathBuf::from("/other"),
            thumbnail_base64: None,
        })?;

        // recorded first, pointing at a file stored under /music
        let mut duplicate = Download::new(other_playlist, "https://v/2", OutputFormat::Mp3);
        duplicate.record_duplicate("Song.mp3", "d1")?;
        store.save(&mut duplicate)?;
        assert!(store.find_success_by_digest("d1", None, None)?.is_none());

        let mut original = Download::new(playlist_id, "https://v/1", OutputFormat::Mp3);
        original.record_success("Song.mp3", "d1")?;
        store.save(&mut original)?;

        let found = store.find_success_by_digest("d1", None, None)?.unwrap();
        assert_eq!(found.download_id, original.id.unwrap());
        assert_eq!(found.file_path, PathBuf::from("/music").join("Song.mp3"));
        assert!(store
            .find_success_by_digest("d1", None, Some(other_playlist))?
            .is_none());
        Ok(())
    }

    #[test]
    fn test_manual_retry_and_bulk_requeue() -> AppResult<()> {
        let (store, _, playlist_id) = setup()?;

        let mut given_up = Download::new(playlist_id, "https://v/1", OutputFormat::Mp3);
        for _ in 0..3 {
            given_up.record_failure("x", 1)?;
            store.save(&mut given_up)?;
            if given_up.status == DownloadStatus::FailedGiveUp {
                break;
            }
        }
        assert_eq!(given_up.status, DownloadStatus::FailedGiveUp);

        let mut ok = Download::new(playlist_id, "https://v/2", OutputFormat::Mp3);
        ok.record_success("a.mp3", "d")?;
        store.save(&mut ok)?;

        assert!(!store.set_manual_retry(ok.id.unwrap())?);
        assert!(store.set_manual_retry(given_up.id.unwrap())?);
        assert_eq!(
            store.get_download(given_up.id.unwrap())?.status,
            DownloadStatus::FailedManualRetry
        );

        // back to give up, then requeue in bulk
        let mut row = store.get_download(given_up.id.unwrap())?;
        row.record_failure("x", 1)?;
        store.save(&mut row)?;
        assert_eq!(store.requeue_all_given_up()?, 1);
        assert_eq!(store.requeue_all_given_up()?, 0);
        Ok(())
    }

    #[test]
    fn test_history_page_filters() -> AppResult<()> {
        let (store, playlists, playlist_id) = setup()?;

        let mut ok = Download::new(playlist_id, "https://v/ok", OutputFormat::Mp3);
        ok.record_success("a.mp3", "d")?;
        store.save(&mut ok)?;

        let mut bad = Download::new(playlist_id, "https://v/bad", OutputFormat::Mp3);
        bad.record_failure("x", 5)?;
        store.save(&mut bad)?;

        assert_eq!(store.get_history_page(0, 10, true, true)?.len(), 2);
        assert_eq!(store.get_history_page(0, 10, true, false)?[0].url, "https://v/ok");
        assert_eq!(store.get_history_page(0, 10, false, true)?[0].url, "https://v/bad");
        assert!(store.get_history_page(0, 10, false, false)?.is_empty());
        assert_eq!(store.get_history_page(1, 10, true, true)?.len(), 1);

        playlists.disable_playlist(playlist_id)?;
        let rows = store.get_downloads_for_playlist(playlist_id)?;
        assert_eq!(rows[0].status, DownloadStatus::SuccessPlaylistRemoved);
        assert_eq!(rows[1].status, DownloadStatus::FailedPlaylistRemoved);
        Ok(())
    }
}
