//! Corruption check by decoding the whole file with ffmpeg

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::core::fetcher::CorruptionVerifier;
use crate::core::models::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct FfmpegVerifier {
    program: String,
}

impl FfmpegVerifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn version(&self) -> AppResult<String> {
        let output = Command::new(&self.program)
            .arg("-version")
            .output()
            .await
            .map_err(|e| AppError::System(format!("Failed to run {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl CorruptionVerifier for FfmpegVerifier {
    async fn verify(&self, path: &Path) -> AppResult<()> {
        // decode to the null muxer; with -v error anything printed is a decode problem
        let output = Command::new(&self.program)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "null", "-"])
            .output()
            .await
            .map_err(|e| AppError::Verify(format!("Failed to run {}: {}", self.program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();

        if !output.status.success() {
            return Err(AppError::Verify(format!(
                "{} exited with {}: {}",
                self.program, output.status, stderr
            )));
        }

        if !stderr.is_empty() {
            return Err(AppError::Verify(stderr.lines().take(3).collect::<Vec<_>>().join("; ")));
        }

        debug!("Verified {:?}", path);
        Ok(())
    }
}
