//! Registry of files already holding archived content
//!
//! Keyed by digest for duplicate detection. Entries come from successful
//! downloads or from a bulk scan over an existing directory tree.

use chrono::Utc;
use regex::bytes::Regex;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::hasher::ContentHasher;
use crate::core::models::{AppError, AppResult, RegisteredFile};
use crate::core::storage::{from_unix, to_unix, Database};

/// Embedded tags live near the start of media containers
const KNOWN_URL_SCAN_BYTES: u64 = 1024 * 1024;

const REGISTRY_COLUMNS: &str = "id, filename, file_path, digest, registered_at, known_url";

fn known_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"https?://(?:www\.|m\.)?(?:youtube\.com/watch\?v=|youtu\.be/)[A-Za-z0-9_-]+",
            )
            .ok()
        })
        .as_ref()
}

/// Outcome of a bulk registration pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    pub registered: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct FileRegistry {
    db: Database,
    hasher: Arc<dyn ContentHasher>,
}

impl FileRegistry {
    pub fn new(db: Database, hasher: Arc<dyn ContentHasher>) -> Self {
        Self { db, hasher }
    }

    /// Register (or refresh) a file. The known source URL is best effort.
    pub fn register_file(&self, filename: &str, path: &Path, digest: &str) -> AppResult<()> {
        let known_url = match extract_known_url(path) {
            Ok(url) => url,
            Err(e) => {
                debug!("No known URL for {:?}: {}", path, e);
                None
            }
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO file_registry (filename, file_path, digest, registered_at, known_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(file_path) DO UPDATE SET
                     filename = excluded.filename,
                     digest = excluded.digest,
                     registered_at = excluded.registered_at,
                     known_url = excluded.known_url",
                params![
                    filename,
                    path.to_string_lossy(),
                    digest,
                    to_unix(Utc::now()),
                    known_url
                ],
            )
        })?;
        Ok(())
    }

    pub fn get_by_digest(&self, digest: &str) -> AppResult<Option<RegisteredFile>> {
        self.find_one("digest = ?1", digest)
    }

    pub fn get_by_known_url(&self, url: &str) -> AppResult<Option<RegisteredFile>> {
        self.find_one("known_url = ?1", url)
    }

    pub fn get_page(&self, offset: usize, limit: usize) -> AppResult<Vec<RegisteredFile>> {
        let sql = format!(
            "SELECT {} FROM file_registry ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            REGISTRY_COLUMNS
        );
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], |row| {
                    Ok(map_registered(row))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().collect()
    }

    pub fn count(&self) -> AppResult<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM file_registry", [], |row| row.get(0))
        })?;
        Ok(count as usize)
    }

    pub fn clear_all(&self) -> AppResult<usize> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM file_registry", []))?;
        info!("🧹 Cleared {} registry entries", removed);
        Ok(removed)
    }

    /// Hash and register every file below `root`.
    ///
    /// Progress is reported as (percent, message). Unreadable entries are
    /// counted and skipped.
    pub fn register_directory<F>(&self, root: &Path, mut progress: F) -> AppResult<RegistrationSummary>
    where
        F: FnMut(u8, &str),
    {
        if !root.is_dir() {
            return Err(AppError::NotFound(format!("directory {:?}", root)));
        }

        progress(0, "Scanning directory");
        let mut summary = RegistrationSummary::default();
        let mut files: Vec<PathBuf> = Vec::new();

        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    summary.errors += 1;
                }
            }
        }

        let total = files.len();
        progress(10, &format!("Found {} files", total));

        for (index, path) in files.iter().enumerate() {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let result = self
                .hasher
                .hash_file(path)
                .and_then(|digest| self.register_file(&filename, path, &digest));

            match result {
                Ok(()) => summary.registered += 1,
                Err(e) => {
                    warn!("Failed to register {:?}: {}", path, e);
                    summary.errors += 1;
                }
            }

            let percent = 20 + ((index + 1) * 80 / total.max(1)).min(79);
            progress(percent as u8, &format!("Registered {}/{}", index + 1, total));
        }

        progress(
            100,
            &format!(
                "Registered {} files ({} errors)",
                summary.registered, summary.errors
            ),
        );
        info!(
            "📚 Registered {} files from {:?} ({} errors)",
            summary.registered, root, summary.errors
        );
        Ok(summary)
    }

    fn find_one(&self, condition: &str, value: &str) -> AppResult<Option<RegisteredFile>> {
        let sql = format!(
            "SELECT {} FROM file_registry WHERE {} ORDER BY id ASC LIMIT 1",
            REGISTRY_COLUMNS, condition
        );
        let found = self.db.with_conn(|conn| {
            conn.query_row(&sql, params![value], |row| Ok(map_registered(row)))
                .optional()
        })?;
        found.transpose()
    }
}

/// First video-page URL found in the leading bytes of a file
pub fn extract_known_url(path: &Path) -> AppResult<Option<String>> {
    let mut buffer = Vec::new();
    File::open(path)?
        .take(KNOWN_URL_SCAN_BYTES)
        .read_to_end(&mut buffer)?;

    Ok(known_url_pattern()
        .and_then(|pattern| pattern.find(&buffer))
        .map(|found| String::from_utf8_lossy(found.as_bytes()).into_owned()))
}

fn map_registered(row: &Row<'_>) -> AppResult<RegisteredFile> {
    let file_path: String = row.get(2)?;
    Ok(RegisteredFile {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_path: PathBuf::from(file_path),
        digest: row.get(3)?,
        registered_at: from_unix(row.get(4)?),
        known_url: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::FileHasher;
    use tempfile::tempdir;

    fn registry() -> AppResult<FileRegistry> {
        Ok(FileRegistry::new(
            Database::open_in_memory()?,
            Arc::new(FileHasher::default()),
        ))
    }

    #[test]
    fn test_register_and_lookup() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(
            &path,
            b"ID3\x00comment=https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=x\x00rest",
        )
        .unwrap();

        let registry = registry()?;
        registry.register_file("song.mp3", &path, "d1")?;
        // second registration of the same path refreshes instead of duplicating
        registry.register_file("song.mp3", &path, "d1")?;
        assert_eq!(registry.count()?, 1);

        let entry = registry.get_by_digest("d1")?.unwrap();
        assert_eq!(entry.file_path, path);
        assert_eq!(
            entry.known_url.as_deref(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
        assert!(registry
            .get_by_known_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ")?
            .is_some());
        assert!(registry.get_by_digest("nope")?.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_file_registers_without_url() -> AppResult<()> {
        let registry = registry()?;
        registry.register_file("gone.mp4", Path::new("/does/not/exist.mp4"), "d2")?;
        assert_eq!(registry.get_by_digest("d2")?.unwrap().known_url, None);
        Ok(())
    }

    #[test]
    fn test_register_directory_with_progress() -> AppResult<()> {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"aaa").unwrap();
        std::fs::write(dir.path().join("nested").join("b.mp4"), b"bbb").unwrap();

        let registry = registry()?;
        let mut reports: Vec<u8> = Vec::new();
        let summary = registry.register_directory(dir.path(), |percent, _| reports.push(percent))?;

        assert_eq!(summary, RegistrationSummary { registered: 2, errors: 0 });
        assert_eq!(reports.first(), Some(&0));
        assert_eq!(reports.last(), Some(&100));
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));

        let hasher = FileHasher::default();
        let digest = hasher.hash_bytes(b"bbb");
        assert_eq!(registry.get_by_digest(&digest)?.unwrap().filename, "b.mp4");

        assert_eq!(registry.get_page(0, 1)?.len(), 1);
        assert_eq!(registry.clear_all()?, 2);
        assert_eq!(registry.count()?, 0);
        Ok(())
    }

    #[test]
    fn test_register_directory_rejects_missing_root() -> AppResult<()> {
        let registry = registry()?;
        assert!(registry
            .register_directory(Path::new("/definitely/missing"), |_, _| {})
            .is_err());
        Ok(())
    }
}
