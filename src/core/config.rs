//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::hasher::HashAlgorithm;

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub daemon: DaemonConfig,
    pub lock: LockConfig,
    pub signal: SignalConfig,
    pub duplicates: DuplicateConfig,
    pub fetcher: FetcherConfig,
    pub logging: LoggingConfig,
}

/// Database location and connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

/// Orchestration loop timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub full_scan_interval_secs: u64,
    pub work_check_interval_secs: u64,
    pub max_retry_count: u32,
    pub temp_directory: Option<PathBuf>,
}

/// Startup lock file behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    pub file_name: String,
    pub stale_after_secs: u64,
    pub poll_interval_ms: u64,
    pub ui_wait_timeout_secs: u64,
    pub ui_restart_wait_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub window_secs: u64,
}

/// Which download rows the history step of the duplicate check consults
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    Global,
    Playlist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuplicateConfig {
    pub scope: DedupScope,
    pub max_directory_variants: usize,
    pub algorithm: HashAlgorithm,
}

/// External tool locations and download options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetcherConfig {
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    /// Passed to yt-dlp as `--ffmpeg-location` when set
    pub ffmpeg_location: Option<String>,
    pub verify_downloads: bool,
    pub sponsorblock_audio: Option<String>,
    pub sponsorblock_video: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String, // "error", "warn", "info", "debug", "trace"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            daemon: DaemonConfig::default(),
            lock: LockConfig::default(),
            signal: SignalConfig::default(),
            duplicates: DuplicateConfig::default(),
            fetcher: FetcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 30_000,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            full_scan_interval_secs: 30 * 60,
            work_check_interval_secs: 5,
            max_retry_count: 5,
            temp_directory: None,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            file_name: "daemon.lock".to_string(),
            stale_after_secs: 10 * 60,
            poll_interval_ms: 100,
            ui_wait_timeout_secs: 10 * 60,
            ui_restart_wait_timeout_secs: 5 * 60,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self { window_secs: 30 }
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            scope: DedupScope::Global,
            max_directory_variants: 100,
            algorithm: HashAlgorithm::Md5,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffmpeg_location: None,
            verify_downloads: true,
            sponsorblock_audio: None,
            sponsorblock_video: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn full_scan_interval(&self) -> Duration {
        Duration::from_secs(self.full_scan_interval_secs)
    }

    pub fn work_check_interval(&self) -> Duration {
        Duration::from_secs(self.work_check_interval_secs)
    }
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ui_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.ui_wait_timeout_secs)
    }

    pub fn ui_restart_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.ui_restart_wait_timeout_secs)
    }
}

impl SignalConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl AppConfig {
    /// Load configuration from the platform config file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file, creating default if not exists
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: AppConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

            tracing::info!("Loaded configuration from: {:?}", config_path);
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Save configuration to the platform config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved configuration to: {:?}", config_path);
        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "videoarchiver", "video-archiver")
            .with_context(|| "Failed to get project directories")
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.json"))
    }

    /// Get the application data directory (database, lock file)
    pub fn get_data_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Database file, honouring an explicit override
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| data_dir.join("db.sqlite"))
    }

    pub fn lock_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.lock.file_name)
    }

    /// Directory holding in-flight downloads
    pub fn temp_directory(&self) -> PathBuf {
        self.daemon
            .temp_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Parse and validate configuration from a JSON string
    pub fn import(json: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(json).with_context(|| "Failed to parse imported configuration")?;

        config
            .validate()
            .with_context(|| "Imported configuration is invalid")?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage.busy_timeout_ms == 0 {
            anyhow::bail!("Database busy timeout must be greater than 0");
        }

        if self.daemon.full_scan_interval_secs == 0 {
            anyhow::bail!("Full scan interval must be greater than 0");
        }

        if self.daemon.work_check_interval_secs == 0 {
            anyhow::bail!("Work check interval must be greater than 0");
        }

        if self.lock.file_name.trim().is_empty() {
            anyhow::bail!("Lock file name must not be empty");
        }

        if self.lock.poll_interval_ms == 0 {
            anyhow::bail!("Lock poll interval must be greater than 0");
        }

        if self.lock.stale_after() < self.lock.poll_interval() {
            anyhow::bail!("Lock staleness timeout must not be shorter than the poll interval");
        }

        if self.lock.ui_wait_timeout_secs == 0 || self.lock.ui_restart_wait_timeout_secs == 0 {
            anyhow::bail!("UI lock wait timeouts must be greater than 0");
        }

        if self.signal.window_secs == 0 {
            anyhow::bail!("Change signal window must be greater than 0");
        }

        if !(1..=10_000).contains(&self.duplicates.max_directory_variants) {
            anyhow::bail!("Directory variant bound should be between 1 and 10000");
        }

        if self.fetcher.ytdlp_path.trim().is_empty() || self.fetcher.ffmpeg_path.trim().is_empty()
        {
            anyhow::bail!("Tool paths must not be empty");
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        Ok(())
    }
}
