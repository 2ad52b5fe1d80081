//! Core data models for the playlist archiver

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Output container requested for a playlist

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp3,

    Mp4,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Mp4 => "mp4",
        }
    }

    /// Audio-only formats get extracted instead of merged
    pub fn is_audio(&self) -> bool {
        matches!(self, OutputFormat::Mp3)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(AppError::Config(format!(
                "unsupported output format '{}', expected mp3 or mp4",
                other
            ))),
        }
    }
}

/// Lifecycle status of a download row.
///
/// "Never attempted" is not a status: such items simply have no row.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    FailedAutoRetry,

    FailedManualRetry,

    FailedGiveUp,

    FailedPlaylistRemoved,

    Success,

    SuccessDuplicate,

    SuccessPlaylistRemoved,
}

impl DownloadStatus {
    pub const ALL: [DownloadStatus; 7] = [
        DownloadStatus::FailedAutoRetry,
        DownloadStatus::FailedManualRetry,
        DownloadStatus::FailedGiveUp,
        DownloadStatus::FailedPlaylistRemoved,
        DownloadStatus::Success,
        DownloadStatus::SuccessDuplicate,
        DownloadStatus::SuccessPlaylistRemoved,
    ];

    /// Stable integer code used in the `downloads.status` column
    pub fn code(self) -> i64 {
        match self {
            DownloadStatus::Success => 1,
            DownloadStatus::SuccessDuplicate => 2,
            DownloadStatus::SuccessPlaylistRemoved => 3,
            DownloadStatus::FailedAutoRetry => 10,
            DownloadStatus::FailedManualRetry => 11,
            DownloadStatus::FailedGiveUp => 12,
            DownloadStatus::FailedPlaylistRemoved => 13,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Statuses the orchestration loop will attempt again on its own
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            DownloadStatus::FailedAutoRetry | DownloadStatus::FailedManualRetry
        )
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            DownloadStatus::Success
                | DownloadStatus::SuccessDuplicate
                | DownloadStatus::SuccessPlaylistRemoved
        )
    }

    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Statuses a user may move back into the retry pool
    pub fn accepts_manual_retry(self) -> bool {
        matches!(
            self,
            DownloadStatus::FailedAutoRetry | DownloadStatus::FailedGiveUp
        )
    }

    /// Status a row ends up in once its playlist is disabled
    pub fn playlist_removed(self) -> Self {
        if self.is_success() {
            DownloadStatus::SuccessPlaylistRemoved
        } else {
            DownloadStatus::FailedPlaylistRemoved
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A subscribed remote playlist

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    pub id: i64,

    pub name: String,

    /// Remote URL or stable GUID handed to the listing tool
    pub locator: String,

    pub output_format: OutputFormat,

    pub save_directory: PathBuf,

    pub thumbnail_base64: Option<String>,

    pub is_enabled: bool,

    pub added_at: DateTime<Utc>,
}

/// One archived (or attempted) item of a playlist

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Download {
    /// `None` until the first attempt has been persisted
    pub id: Option<i64>,

    pub playlist_id: i64,

    pub url: String,

    pub status: DownloadStatus,

    pub format_downloaded: OutputFormat,

    pub digest: Option<String>,

    pub output_filename: Option<String>,

    pub last_attempt: Option<DateTime<Utc>>,

    pub fail_message: Option<String>,

    pub attempt_count: u32,
}

/// A file known to hold archived content

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredFile {
    pub id: i64,

    pub filename: String,

    pub file_path: PathBuf,

    pub digest: String,

    pub registered_at: DateTime<Utc>,

    pub known_url: Option<String>,
}

/// A single entry of a remote playlist listing

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistItem {
    pub title: String,

    pub url: String,
}

/// Remote playlist listing as returned by the listing tool

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistInfo {
    pub title: String,

    pub url: String,

    pub thumbnail_url: Option<String>,

    pub entries: Vec<PlaylistItem>,
}

/// Application error types

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Change signal error: {0}")]
    Signal(String),

    // Stored failure messages strip this prefix again, see lifecycle::clean_fail_message
    #[error("download failed: {0}")]
    Fetch(String),

    #[error("verification failed: {0}")]
    Verify(String),

    #[error("Hash error: {0}")]
    Hash(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    Lifecycle(String),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("System error: {0}")]
    System(String),
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::System(format!("background task failed: {}", err))
    }
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;
