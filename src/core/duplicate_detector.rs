//! Multi-source duplicate detection
//!
//! Sources are consulted cheapest and most authoritative first and the first
//! hit wins: the file registry, then download history, then a scan of the
//! target directory for the candidate name and its numbered variants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::config::DedupScope;
use crate::core::downloads::DownloadStore;
use crate::core::file_registry::FileRegistry;
use crate::core::hasher::ContentHasher;
use crate::core::models::AppResult;
use crate::core::storage::{Database, SETTING_ALLOW_DUPLICATES};
use crate::utils::file_utils::numbered_filename;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateSource {
    FileRegistry,
    DownloadHistory,
    Directory,
}

/// Where the already archived copy lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub source: DuplicateSource,
    pub file_path: PathBuf,
    pub filename: String,
}

/// Candidate file that was just fetched
#[derive(Debug, Clone)]
pub struct DuplicateQuery<'a> {
    pub digest: &'a str,
    pub base_filename: &'a str,
    pub target_dir: &'a Path,
    /// Row being written for this attempt, never matches itself
    pub exclude_download_id: Option<i64>,
    pub playlist_id: i64,
}

#[derive(Clone)]
pub struct DuplicateDetector {
    db: Database,
    registry: FileRegistry,
    downloads: DownloadStore,
    hasher: Arc<dyn ContentHasher>,
    scope: DedupScope,
    max_variants: usize,
}

impl DuplicateDetector {
    pub fn new(
        db: Database,
        registry: FileRegistry,
        downloads: DownloadStore,
        hasher: Arc<dyn ContentHasher>,
        scope: DedupScope,
        max_variants: usize,
    ) -> Self {
        Self {
            db,
            registry,
            downloads,
            hasher,
            scope,
            max_variants,
        }
    }

    /// Whether the user switched duplicate detection off.
    ///
    /// An unreadable setting keeps detection on.
    pub fn duplicates_allowed(&self) -> bool {
        match self.db.get_setting_bool(SETTING_ALLOW_DUPLICATES) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("Could not read {} setting, checking anyway: {}", SETTING_ALLOW_DUPLICATES, e);
                false
            }
        }
    }

    /// Existing copy of the candidate's content, if any. Blocking.
    pub fn find_duplicate(&self, query: &DuplicateQuery<'_>) -> AppResult<Option<DuplicateMatch>> {
        if self.duplicates_allowed() {
            debug!("Duplicates allowed, skipping detection");
            return Ok(None);
        }

        if let Some(registered) = self.registry.get_by_digest(query.digest)? {
            return Ok(Some(DuplicateMatch {
                source: DuplicateSource::FileRegistry,
                file_path: registered.file_path,
                filename: registered.filename,
            }));
        }

        let playlist_scope = match self.scope {
            DedupScope::Global => None,
            DedupScope::Playlist => Some(query.playlist_id),
        };
        if let Some(copy) = self.downloads.find_success_by_digest(
            query.digest,
            query.exclude_download_id,
            playlist_scope,
        )? {
            return Ok(Some(DuplicateMatch {
                source: DuplicateSource::DownloadHistory,
                file_path: copy.file_path,
                filename: copy.output_filename,
            }));
        }

        Ok(self
            .scan_directory(query.target_dir, query.base_filename, query.digest)
            .map(|(file_path, filename)| DuplicateMatch {
                source: DuplicateSource::Directory,
                file_path,
                filename,
            }))
    }

    /// Hash `base` and its numbered variants in `dir`; unreadable files are skipped
    pub fn scan_directory(&self, dir: &Path, base: &str, digest: &str) -> Option<(PathBuf, String)> {
        for n in 0..self.max_variants {
            let filename = numbered_filename(base, n);
            let path = dir.join(&filename);
            if !path.is_file() {
                continue;
            }
            match self.hasher.hash_file(&path) {
                Ok(existing) if existing == digest => return Some((path, filename)),
                Ok(_) => {}
                Err(e) => debug!("Skipping {:?} during duplicate scan: {}", path, e),
            }
        }
        None
    }
}
