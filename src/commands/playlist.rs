//! Playlist subscription commands
//!
//! Every mutation raises the change signal so a running daemon picks the
//! new configuration up without waiting for its next full scan.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::core::models::{AppError, AppResult, OutputFormat, Playlist};
use crate::core::playlists::NewPlaylist;
use crate::utils::validation::validate_playlist_locator;
use crate::AppState;

/// Subscription request as entered by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPlaylistRequest {
    pub name: String,
    pub locator: String,
    pub output_format: OutputFormat,
    pub save_directory: PathBuf,
    #[serde(default)]
    pub thumbnail_base64: Option<String>,
}

/// Subscribe to a playlist
pub async fn add_playlist(state: &AppState, request: AddPlaylistRequest) -> AppResult<i64> {
    info!("➕ Adding playlist: {}", request.locator);

    match add_playlist_impl(state, request) {
        Ok(id) => {
            info!(playlist_id = id, "✅ Playlist added");
            Ok(id)
        }
        Err(e) => {
            error!("❌ Failed to add playlist: {}", e);
            Err(e)
        }
    }
}

pub async fn get_playlists(state: &AppState) -> AppResult<Vec<Playlist>> {
    state.playlists.get_playlists()
}

pub async fn get_active_playlists(state: &AppState) -> AppResult<Vec<Playlist>> {
    state.playlists.get_active_playlists()
}

pub async fn get_playlist(state: &AppState, id: i64) -> AppResult<Playlist> {
    state.playlists.get_playlist(id)
}

/// Point a playlist at a new destination directory
pub async fn update_playlist_directory(
    state: &AppState,
    id: i64,
    directory: PathBuf,
) -> AppResult<()> {
    info!(playlist_id = id, "📁 Moving playlist to {:?}", directory);
    state.playlists.update_directory(id, &directory)?;
    notify_daemon(state);
    Ok(())
}

pub async fn rename_playlist(state: &AppState, id: i64, name: String) -> AppResult<()> {
    state.playlists.update_name(id, &name)?;
    notify_daemon(state);
    Ok(())
}

pub async fn set_playlist_enabled(state: &AppState, id: i64, enabled: bool) -> AppResult<()> {
    info!(playlist_id = id, enabled, "Changing playlist state");
    state.playlists.set_enabled(id, enabled)?;
    notify_daemon(state);
    Ok(())
}

/// Soft delete: history stays, the daemon stops archiving it
pub async fn disable_playlist(state: &AppState, id: i64) -> AppResult<()> {
    info!(playlist_id = id, "🗑️ Disabling playlist");

    match state.playlists.disable_playlist(id) {
        Ok(()) => {
            notify_daemon(state);
            Ok(())
        }
        Err(e) => {
            error!(playlist_id = id, "❌ Failed to disable playlist: {}", e);
            Err(e)
        }
    }
}

fn add_playlist_impl(state: &AppState, request: AddPlaylistRequest) -> AppResult<i64> {
    validate_playlist_locator(&request.locator).map_err(|e| AppError::Config(e.to_string()))?;

    let name = if request.name.trim().is_empty() {
        request.locator.clone()
    } else {
        request.name.trim().to_string()
    };

    let id = state.playlists.add_playlist(NewPlaylist {
        name,
        locator: request.locator.trim().to_string(),
        output_format: request.output_format,
        save_directory: request.save_directory,
        thumbnail_base64: request.thumbnail_base64,
    })?;

    notify_daemon(state);
    Ok(id)
}

/// The change is already stored; a lost wake-up only delays it until the next full scan
pub(crate) fn notify_daemon(state: &AppState) {
    if let Err(e) = state.signal.trigger() {
        warn!("Failed to trigger change signal: {}", e);
    }
}
