//! Core business logic module
//!
//! This module contains the domain models, persistence, process coordination
//! and the archiving pipeline run by the daemon.

pub mod archiver;
pub mod change_signal;
pub mod config;
pub mod daemon_control;
pub mod downloads;
pub mod duplicate_detector;
pub mod fetcher;
pub mod file_registry;
pub mod hasher;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod playlists;
pub mod process_lock;
pub mod startup;
pub mod storage;
pub mod verifier;
pub mod ytdlp;

#[cfg(test)]
mod config_test;



// Re-export commonly used types
pub use config::AppConfig;
pub use models::{AppError, AppResult, Download, DownloadStatus, OutputFormat, Playlist};
pub use orchestrator::Orchestrator;
pub use storage::Database;
