//! Video Archiver - Core Library
//!
//! Keeps local folders in sync with remote playlists: a background daemon
//! fetches new items, verifies them, and archives each piece of content once,
//! while UI-side commands manage subscriptions and nudge the daemon.

pub mod commands;
pub mod core;
pub mod utils;

// Re-export commonly used types
pub use core::{
    change_signal::ChangeSignal,
    config::AppConfig,
    models::{AppError, AppResult, Download, DownloadStatus, OutputFormat, Playlist},
    orchestrator::{ArchiveEvent, EventSender, Orchestrator, OrchestratorSettings},
    startup::{DaemonStartup, StartupCoordinator, UiStartup},
    storage::Database,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    archiver::ItemArchiver,
    daemon_control::{DaemonControl, ProcessDaemonControl},
    downloads::DownloadStore,
    duplicate_detector::DuplicateDetector,
    fetcher::{CorruptionVerifier, SkipVerification},
    file_registry::FileRegistry,
    hasher::{ContentHasher, FileHasher},
    playlists::PlaylistStore,
    process_lock::ProcessLock,
    verifier::FfmpegVerifier,
    ytdlp::YtDlp,
};

/// Services shared by the daemon loop and UI-side commands of one process
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<tokio::sync::RwLock<AppConfig>>,
    /// Where configuration changes are persisted; `None` keeps them in memory
    pub config_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub database: Database,
    pub playlists: PlaylistStore,
    pub downloads: DownloadStore,
    pub registry: FileRegistry,
    pub signal: ChangeSignal,
    pub hasher: Arc<dyn ContentHasher>,
    pub daemon_control: Arc<dyn DaemonControl>,
}

impl AppState {
    pub fn open(config: AppConfig, data_dir: &Path) -> AppResult<Self> {
        let database = Database::open(
            &config.database_path(data_dir),
            Duration::from_millis(config.storage.busy_timeout_ms),
        )?;
        let control: Arc<dyn DaemonControl> = Arc::new(ProcessDaemonControl::current()?);
        Ok(Self::with_database(config, data_dir, database, control))
    }

    /// Assemble the services around an already opened database
    pub fn with_database(
        config: AppConfig,
        data_dir: &Path,
        database: Database,
        daemon_control: Arc<dyn DaemonControl>,
    ) -> Self {
        let hasher: Arc<dyn ContentHasher> =
            Arc::new(FileHasher::new(config.duplicates.algorithm));
        let signal = ChangeSignal::new(database.clone(), config.signal.window());

        Self {
            config_path: None,
            data_dir: data_dir.to_path_buf(),
            playlists: PlaylistStore::new(database.clone()),
            downloads: DownloadStore::new(database.clone()),
            registry: FileRegistry::new(database.clone(), hasher.clone()),
            signal,
            hasher,
            daemon_control,
            database,
            config: Arc::new(tokio::sync::RwLock::new(config)),
        }
    }

    /// Startup coordinator guarding `daemon.lock` in the data directory
    pub async fn startup_coordinator(&self) -> StartupCoordinator {
        let config = self.config.read().await;
        let lock = ProcessLock::from_config(config.lock_path(&self.data_dir), &config.lock);
        StartupCoordinator::from_config(lock, self.daemon_control.clone(), &config.lock)
    }

    /// Wire the archiving pipeline against the external tools named in the configuration
    pub async fn build_orchestrator(&self, events: Option<EventSender>) -> Orchestrator {
        let config = self.config.read().await;

        let ytdlp = Arc::new(YtDlp::from_config(&config.fetcher));
        let verifier: Arc<dyn CorruptionVerifier> = if config.fetcher.verify_downloads {
            Arc::new(FfmpegVerifier::new(config.fetcher.ffmpeg_path.clone()))
        } else {
            Arc::new(SkipVerification)
        };

        let detector = DuplicateDetector::new(
            self.database.clone(),
            self.registry.clone(),
            self.downloads.clone(),
            self.hasher.clone(),
            config.duplicates.scope,
            config.duplicates.max_directory_variants,
        );
        let archiver = ItemArchiver::new(
            ytdlp.clone(),
            verifier,
            self.hasher.clone(),
            detector,
            self.registry.clone(),
            config.temp_directory(),
        );

        let orchestrator = Orchestrator::new(
            self.playlists.clone(),
            self.downloads.clone(),
            self.signal.clone(),
            ytdlp,
            archiver,
            OrchestratorSettings::from_config(&config.daemon),
        );
        match events {
            Some(sender) => orchestrator.with_events(sender),
            None => orchestrator,
        }
    }

    pub fn load_or_initialize_config() -> AppConfig {
        match AppConfig::load() {
            Ok(cfg) => {
                if let Err(err) = cfg.validate() {
                    tracing::warn!(
                        "Invalid configuration detected ({}), falling back to defaults",
                        err
                    );
                    Self::persist_defaults()
                } else {
                    cfg
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to load configuration from disk: {}. Using defaults",
                    err
                );
                Self::persist_defaults()
            }
        }
    }

    fn persist_defaults() -> AppConfig {
        let default_cfg = AppConfig::default();
        if let Err(save_err) = default_cfg.save() {
            tracing::warn!("Failed to persist default configuration: {}", save_err);
        }
        default_cfg
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging at the given level unless `RUST_LOG` says otherwise
pub fn init(level: &str) -> anyhow::Result<()> {
    utils::logging::init_tracing(level);
    tracing::info!("📚 {} v{} initialized", NAME, VERSION);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init("debug").is_ok());
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
    }

    #[tokio::test]
    async fn test_state_shares_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _control) = test_support::test_state(dir.path());

        state.signal.trigger().unwrap();
        assert_eq!(
            state.database.get_setting("daemon_signal").unwrap().map(|v| v != "0"),
            Some(true)
        );

        let coordinator = state.startup_coordinator().await;
        assert_eq!(coordinator.lock().path(), dir.path().join("daemon.lock"));
    }
}
