//! File-backed startup lock
//!
//! The lock file holds its creation time in unix milliseconds. A lock older
//! than the staleness timeout is treated as absent and removed on sight, so a
//! crashed daemon can never strand the UI for longer than that timeout.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::config::LockConfig;
use crate::core::models::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
    stale_after: Duration,
    poll_interval: Duration,
}

impl ProcessLock {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
            poll_interval,
        }
    }

    pub fn from_config(path: impl Into<PathBuf>, config: &LockConfig) -> Self {
        Self::new(path, config.stale_after(), config.poll_interval())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the lock file stamped with the current time.
    ///
    /// An existing token is overwritten; callers check [`is_locked`](Self::is_locked) first.
    pub fn acquire(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.lock_error("create directory for", e))?;
        }
        fs::write(&self.path, now_millis().to_string())
            .map_err(|e| self.lock_error("write", e))?;
        debug!("Acquired startup lock {:?}", self.path);
        Ok(())
    }

    /// Remove the lock file; removing an absent lock is not an error
    pub fn release(&self) -> AppResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Released startup lock {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.lock_error("remove", e)),
        }
    }

    /// Whether a fresh lock exists. Stale locks are deleted as a side effect.
    pub fn is_locked(&self) -> AppResult<bool> {
        let age = match self.lock_age()? {
            Some(age) => age,
            None => return Ok(false),
        };

        if age > self.stale_after {
            warn!(
                "Removing stale startup lock {:?} (age {:?}, limit {:?})",
                self.path, age, self.stale_after
            );
            self.release()?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Age of the current lock file, `None` when there is none.
    ///
    /// Unparseable content falls back to the file's modification time.
    pub fn lock_age(&self) -> AppResult<Option<Duration>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.lock_error("read", e)),
        };

        let created_millis = match content.trim().parse::<u64>() {
            Ok(millis) => millis,
            Err(_) => {
                let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(self.lock_error("inspect", e)),
                };
                system_time_millis(modified)
            }
        };

        // Clock skew can put the stamp in the future; treat that as brand new
        Ok(Some(Duration::from_millis(
            now_millis().saturating_sub(created_millis),
        )))
    }

    /// Poll until the lock is gone or `timeout` elapses. Returns whether it was released in time.
    pub async fn wait_for_release(&self, timeout: Duration) -> AppResult<bool> {
        let deadline = Instant::now() + timeout;

        loop {
            if !self.is_locked()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    fn lock_error(&self, action: &str, err: std::io::Error) -> AppError {
        AppError::Lock(format!("failed to {} lock file {:?}: {}", action, self.path, err))
    }
}

fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_millis() -> u64 {
    system_time_millis(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_lock(dir: &Path, stale_after: Duration) -> ProcessLock {
        ProcessLock::new(dir.join("daemon.lock"), stale_after, Duration::from_millis(10))
    }

    #[test]
    fn test_acquire_release_cycle() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_secs(60));

        assert!(!lock.is_locked()?);
        lock.acquire()?;
        assert!(lock.is_locked()?);
        assert!(lock.lock_age()?.is_some());

        lock.release()?;
        assert!(!lock.is_locked()?);
        // idempotent
        lock.release()?;
        Ok(())
    }

    #[test]
    fn test_stale_lock_is_removed() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_secs(60));

        let ten_minutes_ago = now_millis() - 10 * 60 * 1000;
        std::fs::write(lock.path(), ten_minutes_ago.to_string()).unwrap();

        assert!(!lock.is_locked()?);
        assert!(!lock.path().exists());
        Ok(())
    }

    #[test]
    fn test_unparseable_lock_uses_mtime() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_secs(60));

        std::fs::write(lock.path(), "garbage").unwrap();
        // freshly written, so the mtime says it is young
        assert!(lock.is_locked()?);
        assert!(lock.path().exists());
        Ok(())
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_secs(60));

        std::fs::write(lock.path(), (now_millis() + 60_000).to_string()).unwrap();
        assert_eq!(lock.lock_age()?, Some(Duration::ZERO));
        assert!(lock.is_locked()?);
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_for_release_sees_release() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_secs(60));
        lock.acquire()?;

        let releaser = lock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            releaser.release().unwrap();
        });

        assert!(lock.wait_for_release(Duration::from_secs(5)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_for_release_times_out() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_secs(60));
        lock.acquire()?;

        assert!(!lock.wait_for_release(Duration::from_millis(60)).await?);
        assert!(lock.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_for_release_outlives_staleness() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let lock = test_lock(dir.path(), Duration::from_millis(80));
        lock.acquire()?;

        assert!(lock.wait_for_release(Duration::from_secs(5)).await?);
        assert!(!lock.path().exists());
        Ok(())
    }
}
