//! System command handlers
//!
//! Change signal access, raw settings, external tool checks and daemon
//! process status for the UI side.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::commands::playlist::notify_daemon;
use crate::core::models::AppResult;
use crate::core::storage::SETTING_ALLOW_DUPLICATES;
use crate::core::verifier::FfmpegVerifier;
use crate::core::ytdlp::YtDlp;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonStatus {
    pub running: bool,
    /// A daemon holds the startup lock
    pub starting: bool,
    pub change_pending: bool,
}

/// Versions of the external tools, `None` when a tool is unavailable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolStatus {
    pub ytdlp: Option<String>,
    pub ffmpeg: Option<String>,
}

/// Ask the daemon to rescan now
pub async fn trigger_change(state: &AppState) -> AppResult<()> {
    info!("🔔 Triggering change signal");
    state.signal.trigger()
}

pub async fn is_change_triggered(state: &AppState) -> AppResult<bool> {
    state.signal.is_triggered()
}

pub async fn get_setting(state: &AppState, key: String) -> AppResult<Option<String>> {
    state.database.get_setting(&key)
}

/// Store a raw setting. The daemon reads settings live, so it is nudged as well.
pub async fn set_setting(state: &AppState, key: String, value: String) -> AppResult<()> {
    info!("⚙️ Setting {} = {}", key, value);
    state.database.set_setting(&key, &value)?;
    notify_daemon(state);
    Ok(())
}

pub async fn set_allow_duplicates(state: &AppState, allowed: bool) -> AppResult<()> {
    set_setting(state, SETTING_ALLOW_DUPLICATES.to_string(), allowed.to_string()).await
}

pub async fn daemon_status(state: &AppState) -> AppResult<DaemonStatus> {
    let coordinator = state.startup_coordinator().await;
    Ok(DaemonStatus {
        running: state.daemon_control.is_daemon_running().await?,
        starting: coordinator.lock().is_locked()?,
        change_pending: state.signal.is_triggered()?,
    })
}

/// Launch a daemon unless one is already running
pub async fn start_daemon(state: &AppState) -> AppResult<bool> {
    if state.daemon_control.is_daemon_running().await? {
        info!("Daemon already running");
        return Ok(false);
    }

    info!("🚀 Starting daemon");
    match state.daemon_control.start_daemon().await {
        Ok(()) => Ok(true),
        Err(e) => {
            error!("❌ Failed to start daemon: {}", e);
            Err(e)
        }
    }
}

/// Query yt-dlp and ffmpeg with their version flags
pub async fn check_tools(state: &AppState) -> ToolStatus {
    let config = state.config.read().await;
    let ytdlp = YtDlp::from_config(&config.fetcher);
    let ffmpeg = FfmpegVerifier::new(config.fetcher.ffmpeg_path.clone());

    let ytdlp = match ytdlp.version().await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("yt-dlp unavailable: {}", e);
            None
        }
    };
    let ffmpeg = match ffmpeg.version().await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("ffmpeg unavailable: {}", e);
            None
        }
    };

    ToolStatus { ytdlp, ffmpeg }
}
