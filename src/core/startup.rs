//! Startup sequencing between daemon and UI processes
//!
//! The daemon holds the startup lock while it opens storage and checks its
//! tools, so a UI launched during that window waits instead of racing it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::config::LockConfig;
use crate::core::daemon_control::DaemonControl;
use crate::core::models::{AppError, AppResult};
use crate::core::process_lock::ProcessLock;

/// Result of the daemon side of the protocol
#[derive(Debug)]
pub enum DaemonStartup<T> {
    /// Another daemon holds the lock; this instance should exit
    AlreadyStarting,
    /// Initialisation finished and the lock is released
    Ready(T),
}

/// How the UI got past the startup lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiStartup {
    Unlocked,
    WaitedForDaemon,
    RestartedDaemon,
}

#[derive(Clone)]
pub struct StartupCoordinator {
    lock: ProcessLock,
    control: Arc<dyn DaemonControl>,
    ui_wait_timeout: Duration,
    restart_wait_timeout: Duration,
}

impl StartupCoordinator {
    pub fn new(
        lock: ProcessLock,
        control: Arc<dyn DaemonControl>,
        ui_wait_timeout: Duration,
        restart_wait_timeout: Duration,
    ) -> Self {
        Self {
            lock,
            control,
            ui_wait_timeout,
            restart_wait_timeout,
        }
    }

    pub fn from_config(
        lock: ProcessLock,
        control: Arc<dyn DaemonControl>,
        config: &LockConfig,
    ) -> Self {
        Self::new(
            lock,
            control,
            config.ui_wait_timeout(),
            config.ui_restart_wait_timeout(),
        )
    }

    pub fn lock(&self) -> &ProcessLock {
        &self.lock
    }

    /// Run daemon initialisation under the startup lock.
    ///
    /// The lock is released whether `init` succeeds or not.
    pub async fn run_daemon_startup<T, F, Fut>(&self, init: F) -> AppResult<DaemonStartup<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if self.lock.is_locked()? {
            warn!(
                "Startup lock {:?} is held, another daemon is starting",
                self.lock.path()
            );
            return Ok(DaemonStartup::AlreadyStarting);
        }

        self.lock.acquire()?;
        info!("🔒 Startup lock acquired, initialising daemon");

        let result = init().await;
        let released = self.lock.release();

        match result {
            Ok(value) => {
                released?;
                info!("🔓 Daemon initialised, startup lock released");
                Ok(DaemonStartup::Ready(value))
            }
            Err(e) => {
                if let Err(release_err) = released {
                    error!("Failed to release startup lock after init failure: {}", release_err);
                }
                Err(e)
            }
        }
    }

    /// Wait for a starting daemon, restarting it once if it vanished
    pub async fn run_ui_startup(&self) -> AppResult<UiStartup> {
        if !self.lock.is_locked()? {
            return Ok(UiStartup::Unlocked);
        }

        info!(
            "⏳ Daemon is starting, waiting up to {:?} for it to finish",
            self.ui_wait_timeout
        );
        if self.lock.wait_for_release(self.ui_wait_timeout).await? {
            return Ok(UiStartup::WaitedForDaemon);
        }

        if self.control.is_daemon_running().await? {
            return Err(AppError::Coordination(
                "timeout waiting for daemon startup, but daemon is running".to_string(),
            ));
        }

        warn!("Startup lock never cleared and no daemon is running, starting one");
        self.control.start_daemon().await?;

        if self.lock.wait_for_release(self.restart_wait_timeout).await? {
            Ok(UiStartup::RestartedDaemon)
        } else {
            Err(AppError::Coordination(
                "timeout waiting for restarted daemon to finish startup".to_string(),
            ))
        }
    }
}
