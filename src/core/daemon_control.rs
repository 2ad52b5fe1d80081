//! Daemon process inspection and launch

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::{PidExt, ProcessExt, System, SystemExt};
use tokio::task;
use tracing::{info, warn};

use crate::core::models::{AppError, AppResult};

pub const DAEMON_SUBCOMMAND: &str = "daemon";

/// OS-level view of the daemon process
#[async_trait]
pub trait DaemonControl: Send + Sync {
    async fn is_daemon_running(&self) -> AppResult<bool>;

    async fn start_daemon(&self) -> AppResult<()>;
}

/// Finds daemons by scanning the process table for our own executable
/// started with the `daemon` subcommand
#[derive(Debug, Clone)]
pub struct ProcessDaemonControl {
    executable: PathBuf,
    startup_grace: Duration,
}

impl ProcessDaemonControl {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            startup_grace: Duration::from_millis(500),
        }
    }

    /// Control daemons built from the currently running binary
    pub fn current() -> AppResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// PIDs of running daemons other than this process
    pub fn find_daemon_pids(&self) -> AppResult<Vec<u32>> {
        let own_pid = sysinfo::get_current_pid()
            .map_err(|e| AppError::System(format!("cannot determine own pid: {}", e)))?;

        let mut system = System::new();
        system.refresh_processes();

        Ok(system
            .processes()
            .iter()
            .filter(|(pid, _)| **pid != own_pid)
            .filter(|(_, process)| {
                is_daemon_command(process.exe(), process.cmd(), &self.executable)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect())
    }
}

#[async_trait]
impl DaemonControl for ProcessDaemonControl {
    async fn is_daemon_running(&self) -> AppResult<bool> {
        let control = self.clone();
        let pids = task::spawn_blocking(move || control.find_daemon_pids()).await??;
        Ok(!pids.is_empty())
    }

    async fn start_daemon(&self) -> AppResult<()> {
        info!("🚀 Starting daemon: {:?} {}", self.executable, DAEMON_SUBCOMMAND);

        let child = Command::new(&self.executable)
            .arg(DAEMON_SUBCOMMAND)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::System(format!("failed to spawn daemon: {}", e)))?;
        info!("Daemon spawned with pid {}", child.id());

        tokio::time::sleep(self.startup_grace).await;

        if !self.is_daemon_running().await? {
            warn!("Daemon process is not visible after start");
            return Err(AppError::System(
                "daemon process exited right after start".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a process command line is our executable running the daemon subcommand
pub fn is_daemon_command(exe: &Path, cmd: &[String], expected: &Path) -> bool {
    let same_binary = exe == expected
        || (!exe.as_os_str().is_empty() && same_file_name(exe, expected))
        || cmd
            .first()
            .map(|argv0| same_file_name(Path::new(argv0), expected))
            .unwrap_or(false);

    same_binary && cmd.iter().skip(1).any(|arg| arg == DAEMON_SUBCOMMAND)
}

fn same_file_name(a: &Path, b: &Path) -> bool {
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_daemon_command_matching() {
        let exe = Path::new("/usr/bin/video-archiver");

        assert!(is_daemon_command(
            exe,
            &args(&["/usr/bin/video-archiver", "daemon"]),
            exe
        ));
        // argv0 alone is enough when the exe path is unavailable
        assert!(is_daemon_command(
            Path::new(""),
            &args(&["video-archiver", "daemon"]),
            exe
        ));
        assert!(!is_daemon_command(
            exe,
            &args(&["/usr/bin/video-archiver", "status"]),
            exe
        ));
        assert!(!is_daemon_command(
            Path::new("/usr/bin/other"),
            &args(&["/usr/bin/other", "daemon"]),
            exe
        ));
    }

    #[tokio::test]
    async fn test_no_daemon_for_unknown_binary() -> AppResult<()> {
        let control = ProcessDaemonControl::new("/nonexistent/video-archiver-test-binary");
        assert!(!control.is_daemon_running().await?);
        Ok(())
    }
}
