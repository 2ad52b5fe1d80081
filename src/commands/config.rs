//! Configuration command handlers
//!
//! This module provides commands for managing application configuration,
//! including getting, updating, resetting, and importing/exporting settings.
//! A running daemon picks changed intervals and tool paths up on restart.

use std::path::Path;
use tracing::{error, info};

use crate::core::{
    models::{AppError, AppResult},
    AppConfig,
};
use crate::AppState;

/// Get current application configuration
pub async fn get_config(state: &AppState) -> AppConfig {
    info!("⚙️ Getting application configuration");
    state.config.read().await.clone()
}

/// Update application configuration
pub async fn update_config(state: &AppState, new_config: AppConfig) -> AppResult<()> {
    info!("🔧 Updating application configuration");

    match replace_config(state, new_config).await {
        Ok(()) => {
            info!("✅ Configuration updated successfully");
            Ok(())
        }
        Err(e) => {
            error!("❌ Failed to update configuration: {}", e);
            Err(e)
        }
    }
}

/// Reset configuration to default values
pub async fn reset_config(state: &AppState) -> AppResult<AppConfig> {
    info!("🔄 Resetting configuration to defaults");

    let default_config = AppConfig::default();
    replace_config(state, default_config.clone()).await?;
    Ok(default_config)
}

/// Export configuration to file
pub async fn export_config(state: &AppState, file_path: &Path) -> AppResult<()> {
    info!("💾 Exporting configuration to: {:?}", file_path);

    let json_data = state
        .config
        .read()
        .await
        .export()
        .map_err(|e| AppError::Config(e.to_string()))?;
    tokio::fs::write(file_path, json_data).await?;
    Ok(())
}

/// Import configuration from file
pub async fn import_config(state: &AppState, file_path: &Path) -> AppResult<AppConfig> {
    info!("📂 Importing configuration from: {:?}", file_path);

    if !tokio::fs::try_exists(file_path).await? {
        return Err(AppError::Config(format!(
            "Configuration file not found: {:?}",
            file_path
        )));
    }

    let content = tokio::fs::read_to_string(file_path).await?;
    let imported_config =
        AppConfig::import(&content).map_err(|e| AppError::Config(format!("{:#}", e)))?;

    match replace_config(state, imported_config.clone()).await {
        Ok(()) => {
            info!("✅ Configuration imported successfully");
            Ok(imported_config)
        }
        Err(e) => {
            error!("❌ Failed to import configuration: {}", e);
            Err(e)
        }
    }
}

async fn replace_config(state: &AppState, new_config: AppConfig) -> AppResult<()> {
    new_config
        .validate()
        .map_err(|e| AppError::Config(e.to_string()))?;

    if let Some(path) = &state.config_path {
        new_config
            .save_to(path)
            .map_err(|e| AppError::Config(format!("Failed to save configuration: {}", e)))?;
    }

    *state.config.write().await = new_config;
    Ok(())
}
