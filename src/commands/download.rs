//! Download history commands

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::playlist::notify_daemon;
use crate::core::models::{AppResult, Download};
use crate::AppState;

/// One page of the history view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub offset: usize,
    pub limit: usize,
    pub show_success: bool,
    pub show_failed: bool,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
            show_success: true,
            show_failed: true,
        }
    }
}

pub async fn get_download_history_page(
    state: &AppState,
    query: HistoryQuery,
) -> AppResult<Vec<Download>> {
    state.downloads.get_history_page(
        query.offset,
        query.limit,
        query.show_success,
        query.show_failed,
    )
}

/// Most recently attempted downloads across all playlists
pub async fn get_recent_downloads(state: &AppState, limit: usize) -> AppResult<Vec<Download>> {
    state.downloads.get_all_downloads(limit)
}

pub async fn get_playlist_downloads(state: &AppState, playlist_id: i64) -> AppResult<Vec<Download>> {
    state.downloads.get_downloads_for_playlist(playlist_id)
}

/// Queue one failed download for another attempt.
///
/// Returns false when the download's status does not allow a manual retry.
pub async fn set_manual_retry(state: &AppState, id: i64) -> AppResult<bool> {
    let changed = state.downloads.set_manual_retry(id)?;
    if changed {
        notify_daemon(state);
    }
    Ok(changed)
}

/// Queue every given-up download for another attempt
pub async fn retry_all_given_up(state: &AppState) -> AppResult<usize> {
    info!("🔁 Requeueing all given-up downloads");
    let count = state.downloads.requeue_all_given_up()?;
    notify_daemon(state);
    Ok(count)
}
