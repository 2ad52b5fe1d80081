//! File registry commands

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task;
use tracing::{error, info};

use crate::core::file_registry::RegistrationSummary;
use crate::core::models::{AppResult, RegisteredFile};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryPage {
    pub total: usize,
    pub files: Vec<RegisteredFile>,
}

pub async fn get_registered_files(
    state: &AppState,
    offset: usize,
    limit: usize,
) -> AppResult<RegistryPage> {
    Ok(RegistryPage {
        total: state.registry.count()?,
        files: state.registry.get_page(offset, limit)?,
    })
}

/// Hash and register an existing archive so its content is never fetched again
pub async fn register_directory(state: &AppState, path: PathBuf) -> AppResult<RegistrationSummary> {
    info!("📂 Registering files under {:?}", path);

    let registry = state.registry.clone();
    let result = task::spawn_blocking(move || {
        registry.register_directory(&path, |percent, message| {
            info!(percent, "{}", message);
        })
    })
    .await?;

    match result {
        Ok(summary) => {
            info!(
                "✅ Registered {} files ({} errors)",
                summary.registered, summary.errors
            );
            Ok(summary)
        }
        Err(e) => {
            error!("❌ Failed to register directory: {}", e);
            Err(e)
        }
    }
}

/// Forget every registered file. Archived files on disk are untouched.
pub async fn clear_registry(state: &AppState) -> AppResult<usize> {
    let removed = state.registry.clear_all()?;
    info!("🧹 Cleared {} registry entries", removed);
    Ok(removed)
}
