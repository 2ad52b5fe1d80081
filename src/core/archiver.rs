//! Per-item archive step
//!
//! Fetch into a private temp file, verify, hash, then either discard it as a
//! duplicate or move it to a collision-free name and register it. The temp
//! file never outlives the attempt.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::duplicate_detector::{DuplicateDetector, DuplicateMatch, DuplicateQuery};
use crate::core::fetcher::{CorruptionVerifier, MediaFetcher};
use crate::core::file_registry::FileRegistry;
use crate::core::hasher::{hash_file_blocking, ContentHasher};
use crate::core::models::{AppResult, Playlist};
use crate::core::ytdlp::metadata_title;
use crate::utils::file_utils::{
    ensure_dir_exists, move_file, resolve_available_filename, sanitize_filename,
};

/// What happened to a successfully fetched item
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    /// New content, stored under `filename` in the playlist directory
    Stored {
        path: PathBuf,
        filename: String,
        digest: String,
    },
    /// Content already archived; nothing new was written
    Duplicate {
        existing: DuplicateMatch,
        digest: String,
    },
}

/// Removes the temp download when dropped
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!("Removed temp file {:?}", self.0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {:?}: {}", self.0, e),
        }
    }
}

#[derive(Clone)]
pub struct ItemArchiver {
    fetcher: Arc<dyn MediaFetcher>,
    verifier: Arc<dyn CorruptionVerifier>,
    hasher: Arc<dyn ContentHasher>,
    detector: DuplicateDetector,
    registry: FileRegistry,
    temp_dir: PathBuf,
}

impl ItemArchiver {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        verifier: Arc<dyn CorruptionVerifier>,
        hasher: Arc<dyn ContentHasher>,
        detector: DuplicateDetector,
        registry: FileRegistry,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            verifier,
            hasher,
            detector,
            registry,
            temp_dir,
        }
    }

    fn temp_path(&self, playlist: &Playlist) -> PathBuf {
        self.temp_dir.join(format!(
            "videoarchiver-download-{}.{}",
            Uuid::new_v4(),
            playlist.output_format
        ))
    }

    /// Archive one remote item of `playlist`.
    ///
    /// `download_id` is the row this attempt will be recorded on, if it exists already.
    pub async fn archive_item(
        &self,
        url: &str,
        playlist: &Playlist,
        download_id: Option<i64>,
    ) -> AppResult<ArchiveOutcome> {
        ensure_dir_exists(&self.temp_dir)?;
        let temp = TempFile(self.temp_path(playlist));

        let metadata = self
            .fetcher
            .fetch_item(url, &temp.0, playlist.output_format)
            .await?;
        let title = metadata_title(&metadata)?;

        self.verifier.verify(&temp.0).await?;

        let digest = hash_file_blocking(self.hasher.clone(), temp.0.clone()).await?;
        let base_filename = format!("{}.{}", sanitize_filename(&title), playlist.output_format);

        let detector = self.detector.clone();
        let target_dir = playlist.save_directory.clone();
        let playlist_id = playlist.id;
        let (lookup_digest, lookup_name) = (digest.clone(), base_filename.clone());
        let existing = task::spawn_blocking(move || {
            detector.find_duplicate(&DuplicateQuery {
                digest: &lookup_digest,
                base_filename: &lookup_name,
                target_dir: &target_dir,
                exclude_download_id: download_id,
                playlist_id,
            })
        })
        .await??;

        if let Some(existing) = existing {
            info!(
                "♻️ {} duplicates {:?} ({:?})",
                url, existing.file_path, existing.source
            );
            return Ok(ArchiveOutcome::Duplicate { existing, digest });
        }

        let (path, filename) = self
            .place(temp.0.clone(), playlist.save_directory.clone(), base_filename)
            .await?;

        let registry = self.registry.clone();
        let (reg_name, reg_path, reg_digest) = (filename.clone(), path.clone(), digest.clone());
        let registered =
            task::spawn_blocking(move || registry.register_file(&reg_name, &reg_path, &reg_digest))
                .await;
        match registered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to register {:?} in file registry: {}", path, e),
            Err(e) => warn!("File registration task for {:?} failed: {}", path, e),
        }

        info!("✅ Archived {} as {:?}", url, path);
        Ok(ArchiveOutcome::Stored {
            path,
            filename,
            digest,
        })
    }

    /// Move the temp file into `dir` under the first free variant of `base`
    async fn place(&self, temp: PathBuf, dir: PathBuf, base: String) -> AppResult<(PathBuf, String)> {
        task::spawn_blocking(move || -> AppResult<(PathBuf, String)> {
            ensure_dir_exists(&dir)?;
            let filename = resolve_available_filename(&dir, &base);
            let path = move_file(&temp, &dir.join(&filename))?;
            Ok((path, filename))
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DedupScope;
    use crate::core::downloads::DownloadStore;
    use crate::core::fetcher::SkipVerification;
    use crate::core::hasher::FileHasher;
    use crate::core::models::{AppError, OutputFormat};
    use crate::core::storage::{Database, SETTING_ALLOW_DUPLICATES};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct StaticFetcher(&'static [u8]);

    #[async_trait]
    impl MediaFetcher for StaticFetcher {
        async fn fetch_item(
            &self,
            _url: &str,
            destination: &Path,
            _format: OutputFormat,
        ) -> AppResult<String> {
            std::fs::write(destination, self.0)?;
            Ok(r#"{"fulltitle": "My: Song"}"#.to_string())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl CorruptionVerifier for RejectAll {
        async fn verify(&self, path: &Path) -> AppResult<()> {
            Err(AppError::Verify(format!("{:?} is truncated", path)))
        }
    }

    fn setup(
        content: &'static [u8],
        verifier: Arc<dyn CorruptionVerifier>,
    ) -> (TempDir, ItemArchiver, FileRegistry, Playlist, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let hasher: Arc<dyn ContentHasher> = Arc::new(FileHasher::default());
        let registry = FileRegistry::new(db.clone(), hasher.clone());
        let detector = DuplicateDetector::new(
            db.clone(),
            registry.clone(),
            DownloadStore::new(db.clone()),
            hasher.clone(),
            DedupScope::Global,
            5,
        );
        let archiver = ItemArchiver::new(
            Arc::new(StaticFetcher(content)),
            verifier,
            hasher,
            detector,
            registry.clone(),
            dir.path().join("tmp"),
        );
        let playlist = Playlist {
            id: 1,
            name: "p".into(),
            locator: "PL".into(),
            output_format: OutputFormat::Mp3,
            save_directory: dir.path().join("out"),
            thumbnail_base64: None,
            is_enabled: true,
            added_at: Utc::now(),
        };
        (dir, archiver, registry, playlist, db)
    }

    fn temp_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("tmp")).unwrap().count()
    }

    #[tokio::test]
    async fn test_stores_under_free_name_and_registers() {
        let (dir, archiver, registry, playlist, _db) = setup(b"new audio", Arc::new(SkipVerification));
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("My_ Song.mp3"), b"someone else").unwrap();

        let outcome = archiver
            .archive_item("https://example.com/1", &playlist, None)
            .await
            .unwrap();

        match outcome {
            ArchiveOutcome::Stored { path, filename, digest } => {
                assert_eq!(filename, "My_ Song-1.mp3");
                assert_eq!(std::fs::read(&path).unwrap(), b"new audio");
                let registered = registry.get_by_digest(&digest).unwrap().unwrap();
                assert_eq!(registered.file_path, path);
            }
            other => panic!("expected stored outcome, got {:?}", other),
        }
        assert_eq!(temp_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_duplicate_writes_nothing() {
        let (dir, archiver, _registry, playlist, _db) = setup(b"same audio", Arc::new(SkipVerification));

        let first = archiver
            .archive_item("https://example.com/1", &playlist, None)
            .await
            .unwrap();
        let second = archiver
            .archive_item("https://example.com/2", &playlist, None)
            .await
            .unwrap();

        assert!(matches!(first, ArchiveOutcome::Stored { .. }));
        match second {
            ArchiveOutcome::Duplicate { existing, .. } => {
                assert_eq!(existing.filename, "My_ Song.mp3");
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        let stored = std::fs::read_dir(dir.path().join("out")).unwrap().count();
        assert_eq!(stored, 1);
        assert_eq!(temp_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_allowed_duplicate_never_overwrites_existing_file() {
        let (dir, archiver, registry, playlist, db) =
            setup(b"same audio", Arc::new(SkipVerification));
        db.set_setting(SETTING_ALLOW_DUPLICATES, "true").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let original = out.join("My_ Song.mp3");
        std::fs::write(&original, b"same audio").unwrap();

        let outcome = archiver
            .archive_item("https://example.com/1", &playlist, None)
            .await
            .unwrap();

        match outcome {
            ArchiveOutcome::Stored { path, filename, digest } => {
                assert_eq!(filename, "My_ Song-1.mp3");
                assert_eq!(path, out.join("My_ Song-1.mp3"));
                assert_eq!(std::fs::read(&path).unwrap(), b"same audio");
                assert!(registry.get_by_digest(&digest).unwrap().is_some());
            }
            other => panic!("expected stored outcome, got {:?}", other),
        }
        assert_eq!(std::fs::read(&original).unwrap(), b"same audio");
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
        assert_eq!(temp_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_failed_verification_removes_temp_file() {
        let (dir, archiver, _registry, playlist, _db) = setup(b"broken", Arc::new(RejectAll));

        let result = archiver
            .archive_item("https://example.com/1", &playlist, None)
            .await;

        assert!(matches!(result, Err(AppError::Verify(_))));
        assert_eq!(temp_files(&dir), 0);
        assert!(!dir.path().join("out").exists());
    }
}
