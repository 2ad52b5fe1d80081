//! Cross-process change signal
//!
//! A single timestamp in the settings table. The UI stamps it when
//! configuration changes; the daemon treats a stamp younger than the window
//! as a pending wake-up and clears it back to the sentinel before acting.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::core::models::AppResult;
use crate::core::storage::{Database, SETTING_DAEMON_SIGNAL};

const CLEARED: &str = "0";

#[derive(Clone)]
pub struct ChangeSignal {
    db: Database,
    window: Duration,
}

impl ChangeSignal {
    pub fn new(db: Database, window: Duration) -> Self {
        Self { db, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn trigger(&self) -> AppResult<()> {
        self.db
            .set_setting(SETTING_DAEMON_SIGNAL, &now_millis().to_string())?;
        debug!("Change signal triggered");
        Ok(())
    }

    /// A missing or unparseable value reads as "not triggered"
    pub fn is_triggered(&self) -> AppResult<bool> {
        let stored = match self.db.get_setting(SETTING_DAEMON_SIGNAL)? {
            Some(value) => value,
            None => return Ok(false),
        };

        let stamp = match stored.trim().parse::<i64>() {
            Ok(stamp) if stamp > 0 => stamp,
            _ => return Ok(false),
        };

        let window = self.window.as_millis() as i64;
        Ok(now_millis() - stamp < window)
    }

    pub fn clear(&self) -> AppResult<()> {
        self.db.set_setting(SETTING_DAEMON_SIGNAL, CLEARED)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(window: Duration) -> AppResult<ChangeSignal> {
        Ok(ChangeSignal::new(Database::open_in_memory()?, window))
    }

    #[test]
    fn test_fresh_database_is_not_triggered() -> AppResult<()> {
        let signal = signal(Duration::from_secs(30))?;
        assert!(!signal.is_triggered()?);
        Ok(())
    }

    #[test]
    fn test_repeated_triggers_coalesce_until_cleared() -> AppResult<()> {
        let signal = signal(Duration::from_secs(30))?;

        for _ in 0..5 {
            signal.trigger()?;
        }
        assert!(signal.is_triggered()?);
        // still pending until somebody clears it
        assert!(signal.is_triggered()?);

        signal.clear()?;
        assert!(!signal.is_triggered()?);

        signal.trigger()?;
        assert!(signal.is_triggered()?);
        Ok(())
    }

    #[test]
    fn test_old_stamp_outside_window() -> AppResult<()> {
        let db = Database::open_in_memory()?;
        let signal = ChangeSignal::new(db.clone(), Duration::from_secs(30));

        let minute_ago = now_millis() - 60_000;
        db.set_setting(SETTING_DAEMON_SIGNAL, &minute_ago.to_string())?;
        assert!(!signal.is_triggered()?);
        Ok(())
    }

    #[test]
    fn test_garbage_and_missing_values() -> AppResult<()> {
        let db = Database::open_in_memory()?;
        let signal = ChangeSignal::new(db.clone(), Duration::from_secs(30));

        db.set_setting(SETTING_DAEMON_SIGNAL, "not-a-number")?;
        assert!(!signal.is_triggered()?);

        db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM settings WHERE setting_key = ?1",
                [SETTING_DAEMON_SIGNAL],
            )
        })?;
        assert!(!signal.is_triggered()?);
        Ok(())
    }

    #[tokio::test]
    async fn test_compressed_window_expires() -> AppResult<()> {
        let signal = signal(Duration::from_millis(40))?;
        signal.trigger()?;
        assert!(signal.is_triggered()?);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!signal.is_triggered()?);
        Ok(())
    }
}
