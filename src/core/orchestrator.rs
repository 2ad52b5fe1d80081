//! Daemon scheduler
//!
//! Every few seconds the loop decides whether to run a pass: either the full
//! scan interval has elapsed or the UI raised the change signal. A pass walks
//! the enabled playlists in insertion order, retrying failed rows before new
//! items, and checks for cancellation or a fresh change signal before every
//! single item.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::core::archiver::{ArchiveOutcome, ItemArchiver};
use crate::core::change_signal::ChangeSignal;
use crate::core::config::DaemonConfig;
use crate::core::downloads::DownloadStore;
use crate::core::fetcher::PlaylistSource;
use crate::core::lifecycle::MAX_RETRY_COUNT;
use crate::core::models::{AppResult, Download, DownloadStatus, Playlist, PlaylistItem};
use crate::core::playlists::PlaylistStore;

/// Events published for an interactive observer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ArchiveEvent {
    PassStarted {
        reason: WakeReason,
    },
    PlaylistStarted {
        playlist_id: i64,
        name: String,
        queued: usize,
    },
    ItemStarted {
        playlist_id: i64,
        url: String,
    },
    ItemFinished {
        playlist_id: i64,
        download_id: Option<i64>,
        url: String,
        status: DownloadStatus,
    },
    PassFinished {
        attempted: usize,
        interrupted: bool,
    },
}

pub type EventSender = mpsc::UnboundedSender<ArchiveEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ArchiveEvent>;

/// Why a pass was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeReason {
    FullScan,
    ChangeSignal,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub full_scan_interval: Duration,
    pub work_check_interval: Duration,
    pub max_retry_count: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            full_scan_interval: Duration::from_secs(30 * 60),
            work_check_interval: Duration::from_secs(5),
            max_retry_count: MAX_RETRY_COUNT,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            full_scan_interval: config.full_scan_interval(),
            work_check_interval: config.work_check_interval(),
            max_retry_count: config.max_retry_count,
        }
    }
}

/// Items of one playlist to attempt, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadPlan {
    pub retries: Vec<Download>,
    pub new_urls: Vec<String>,
}

impl DownloadPlan {
    pub fn len(&self) -> usize {
        self.retries.len() + self.new_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retries first, then fresh records for new items
    pub fn into_queue(self, playlist: &Playlist) -> Vec<Download> {
        let mut queue = self.retries;
        queue.extend(
            self.new_urls
                .into_iter()
                .map(|url| Download::new(playlist.id, url, playlist.output_format)),
        );
        queue
    }
}

/// Diff the remote listing against existing rows
pub fn plan_downloads(remote: &[PlaylistItem], existing: Vec<Download>) -> DownloadPlan {
    let mut seen: HashSet<String> = existing.iter().map(|d| d.url.clone()).collect();

    let retries = existing
        .into_iter()
        .filter(|download| download.status.is_retryable())
        .collect();

    let new_urls = remote
        .iter()
        .filter(|item| seen.insert(item.url.clone()))
        .map(|item| item.url.clone())
        .collect();

    DownloadPlan { retries, new_urls }
}

/// Counters for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: usize,
    pub interrupted: bool,
}

enum PlaylistProgress {
    Completed,
    Interrupted,
}

pub struct Orchestrator {
    playlists: PlaylistStore,
    downloads: DownloadStore,
    signal: ChangeSignal,
    source: Arc<dyn PlaylistSource>,
    archiver: ItemArchiver,
    settings: OrchestratorSettings,
    last_run: Option<Instant>,
    events: Option<EventSender>,
}

impl Orchestrator {
    pub fn new(
        playlists: PlaylistStore,
        downloads: DownloadStore,
        signal: ChangeSignal,
        source: Arc<dyn PlaylistSource>,
        archiver: ItemArchiver,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            playlists,
            downloads,
            signal,
            source,
            archiver,
            settings,
            last_run: None,
            events: None,
        }
    }

    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Run until `cancel` fires. Items already being fetched are finished first.
    pub async fn run(&mut self, cancel: CancellationToken) -> AppResult<()> {
        info!(
            "🚀 Orchestration loop started (full scan every {:?}, checks every {:?})",
            self.settings.full_scan_interval, self.settings.work_check_interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.tick(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.work_check_interval) => {}
            }
        }

        info!("🛑 Orchestration loop stopped");
        Ok(())
    }

    /// One outer iteration: decide whether to work and run a pass if so
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Option<PassSummary> {
        let reason = self.wake_reason(Instant::now())?;
        self.last_run = Some(Instant::now());
        Some(self.run_pass(reason, cancel).await)
    }

    fn full_scan_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.settings.full_scan_interval,
        }
    }

    /// A pending signal is consumed whenever a pass starts, so it cannot
    /// immediately interrupt the pass it caused
    fn wake_reason(&self, now: Instant) -> Option<WakeReason> {
        let timer = self.full_scan_due(now);

        let signalled = match self.signal.is_triggered() {
            Ok(triggered) => triggered,
            Err(e) => {
                warn!("Failed to read change signal: {}", e);
                false
            }
        };

        if signalled {
            if let Err(e) = self.signal.clear() {
                warn!("Failed to clear change signal: {}", e);
            }
        }

        if timer {
            Some(WakeReason::FullScan)
        } else if signalled {
            Some(WakeReason::ChangeSignal)
        } else {
            None
        }
    }

    /// Checked before every item
    fn should_stop(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            info!("Shutdown requested, not starting further items");
            return true;
        }

        match self.signal.is_triggered() {
            Ok(true) => {
                info!("🔔 Change signal raised mid-pass, restarting");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Failed to read change signal: {}", e);
                false
            }
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn run_pass(&self, reason: WakeReason, cancel: &CancellationToken) -> PassSummary {
        info!("🔄 Starting archive pass");
        self.emit(ArchiveEvent::PassStarted { reason });

        let mut summary = PassSummary::default();

        let playlists = match self.playlists.get_active_playlists() {
            Ok(playlists) => playlists,
            Err(e) => {
                error!("Failed to load playlists: {}", e);
                self.emit(ArchiveEvent::PassFinished {
                    attempted: 0,
                    interrupted: false,
                });
                return summary;
            }
        };

        for playlist in &playlists {
            if self.should_stop(cancel) {
                summary.interrupted = true;
                break;
            }

            match self.process_playlist(playlist, cancel, &mut summary).await {
                Ok(PlaylistProgress::Completed) => {}
                Ok(PlaylistProgress::Interrupted) => {
                    summary.interrupted = true;
                    break;
                }
                Err(e) => warn!(
                    playlist_id = playlist.id,
                    "Skipping playlist {}: {}", playlist.name, e
                ),
            }
        }

        info!(
            attempted = summary.attempted,
            interrupted = summary.interrupted,
            "🏁 Archive pass finished"
        );
        self.emit(ArchiveEvent::PassFinished {
            attempted: summary.attempted,
            interrupted: summary.interrupted,
        });
        summary
    }

    async fn process_playlist(
        &self,
        playlist: &Playlist,
        cancel: &CancellationToken,
        summary: &mut PassSummary,
    ) -> AppResult<PlaylistProgress> {
        let listing = self.source.fetch_playlist(&playlist.locator).await?;
        let existing = self.downloads.get_downloads_for_playlist(playlist.id)?;
        let plan = plan_downloads(&listing.entries, existing);

        debug!(
            playlist_id = playlist.id,
            retries = plan.retries.len(),
            new = plan.new_urls.len(),
            "Planned playlist"
        );
        self.emit(ArchiveEvent::PlaylistStarted {
            playlist_id: playlist.id,
            name: playlist.name.clone(),
            queued: plan.len(),
        });

        for download in plan.into_queue(playlist) {
            if self.should_stop(cancel) {
                return Ok(PlaylistProgress::Interrupted);
            }
            self.attempt(playlist, download).await;
            summary.attempted += 1;
        }

        Ok(PlaylistProgress::Completed)
    }

    /// One download attempt. Failures end up on the row, never propagate.
    async fn attempt(&self, playlist: &Playlist, mut download: Download) -> DownloadStatus {
        self.emit(ArchiveEvent::ItemStarted {
            playlist_id: playlist.id,
            url: download.url.clone(),
        });

        let outcome = self
            .archiver
            .archive_item(&download.url, playlist, download.id)
            .await;

        let recorded = match outcome {
            Ok(ArchiveOutcome::Stored {
                filename, digest, ..
            }) => download.record_success(&filename, &digest),
            Ok(ArchiveOutcome::Duplicate { existing, digest }) => {
                download.record_duplicate(&existing.filename, &digest)
            }
            Err(e) => {
                warn!(playlist_id = playlist.id, url = %download.url, "❌ Attempt failed: {}", e);
                download.record_failure(&e.to_string(), self.settings.max_retry_count)
            }
        };

        match recorded {
            Ok(()) => {
                if let Err(e) = self.downloads.save(&mut download) {
                    error!(url = %download.url, "Failed to persist download: {}", e);
                }
            }
            Err(e) => error!(url = %download.url, "{}", e),
        }

        self.emit(ArchiveEvent::ItemFinished {
            playlist_id: playlist.id,
            download_id: download.id,
            url: download.url.clone(),
            status: download.status,
        });
        download.status
    }

    fn emit(&self, event: ArchiveEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

/// Log progress events until the sending side goes away
pub fn spawn_event_logger(mut receiver: EventReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match &event {
                ArchiveEvent::ItemFinished { url, status, .. } => {
                    info!("📦 {} -> {}", url, status)
                }
                other => debug!("{:?}", other),
            }
        }
    })
}
