//! Download lifecycle transitions
//!
//! Every attempt bumps `attempt_count` by one and stamps `last_attempt`.
//! Failures stay in the automatic retry pool until the count exceeds the
//! retry budget, then park in `FailedGiveUp` until a user requeues them.

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use crate::core::models::{AppError, AppResult, Download, DownloadStatus, OutputFormat};

pub const MAX_RETRY_COUNT: u32 = 5;

fn fail_prefix() -> Option<&'static Regex> {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    PREFIX
        .get_or_init(|| {
            Regex::new(
                r"^\s*(?:download (?:service: )?failed(?: to download file)?: |exit (?:status|code) -?\d+: |ERROR: )",
            )
            .ok()
        })
        .as_ref()
}

/// Strip the wrapper text fetch errors accumulate so stored messages stay short
pub fn clean_fail_message(message: &str) -> String {
    let mut rest = message;
    if let Some(prefix) = fail_prefix() {
        while let Some(found) = prefix.find(rest) {
            rest = &rest[found.end()..];
        }
    }
    rest.trim().to_string()
}

impl Download {
    /// In-memory record for an item that has never been attempted
    pub fn new(playlist_id: i64, url: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            id: None,
            playlist_id,
            url: url.into(),
            status: DownloadStatus::FailedAutoRetry,
            format_downloaded: format,
            digest: None,
            output_filename: None,
            last_attempt: None,
            fail_message: None,
            attempt_count: 0,
        }
    }

    /// Whether the orchestration loop may attempt this record
    pub fn is_attemptable(&self) -> bool {
        self.id.is_none() || self.status.is_retryable()
    }

    fn begin_attempt(&mut self, action: &str) -> AppResult<()> {
        if !self.is_attemptable() {
            return Err(AppError::Lifecycle(format!(
                "cannot record {} for {} in state {}",
                action, self.url, self.status
            )));
        }
        self.attempt_count += 1;
        self.last_attempt = Some(Utc::now());
        Ok(())
    }

    /// Fetched content was novel and has been stored
    pub fn record_success(&mut self, output_filename: &str, digest: &str) -> AppResult<()> {
        self.begin_attempt("success")?;
        self.status = DownloadStatus::Success;
        self.digest = Some(digest.to_string());
        self.output_filename = Some(output_filename.to_string());
        self.fail_message = None;
        Ok(())
    }

    /// Fetched content already exists in the archive as `existing_filename`
    pub fn record_duplicate(&mut self, existing_filename: &str, digest: &str) -> AppResult<()> {
        self.begin_attempt("duplicate")?;
        self.status = DownloadStatus::SuccessDuplicate;
        self.digest = Some(digest.to_string());
        self.output_filename = Some(existing_filename.to_string());
        self.fail_message = None;
        Ok(())
    }

    /// Failed fetch or verification; gives up once attempts exceed `max_retry_count`
    pub fn record_failure(&mut self, message: &str, max_retry_count: u32) -> AppResult<()> {
        self.begin_attempt("failure")?;
        self.status = if self.attempt_count > max_retry_count {
            DownloadStatus::FailedGiveUp
        } else {
            DownloadStatus::FailedAutoRetry
        };
        self.fail_message = Some(clean_fail_message(message));
        Ok(())
    }

    /// User asked for another attempt. Returns false when the status does not allow it.
    pub fn request_manual_retry(&mut self) -> bool {
        if !self.status.accepts_manual_retry() {
            return false;
        }
        self.status = DownloadStatus::FailedManualRetry;
        self.last_attempt = Some(Utc::now());
        true
    }

    /// Owning playlist was disabled
    pub fn mark_playlist_removed(&mut self) {
        self.status = self.status.playlist_removed();
    }
}
