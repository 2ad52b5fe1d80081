//! Seams to the external tools the archiver drives
//!
//! The orchestration loop only talks to these traits; the yt-dlp and ffmpeg
//! adapters implement them for production and tests swap in fakes.

use async_trait::async_trait;
use std::path::Path;

use crate::core::models::{AppResult, OutputFormat, PlaylistInfo};

/// Lists the items of a remote playlist
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch_playlist(&self, locator: &str) -> AppResult<PlaylistInfo>;
}

/// Downloads one item to `destination`, returning the tool's raw metadata blob
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_item(
        &self,
        url: &str,
        destination: &Path,
        format: OutputFormat,
    ) -> AppResult<String>;
}

/// Checks that a downloaded file decodes cleanly
#[async_trait]
pub trait CorruptionVerifier: Send + Sync {
    async fn verify(&self, path: &Path) -> AppResult<()>;
}

/// Accepts every file, used when verification is switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipVerification;

#[async_trait]
impl CorruptionVerifier for SkipVerification {
    async fn verify(&self, _path: &Path) -> AppResult<()> {
        Ok(())
    }
}
