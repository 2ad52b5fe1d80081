//! 配置管理系统单元测试
//!
//! 测试 AppConfig 的默认值、序列化、验证以及文件读写

#[cfg(test)]
mod tests {
    use super::super::config::{AppConfig, DedupScope};
    use super::super::hasher::HashAlgorithm;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::tempdir;

    /// 创建测试用的压缩时间配置
    fn create_test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.daemon.full_scan_interval_secs = 60;
        config.daemon.work_check_interval_secs = 1;
        config.lock.stale_after_secs = 2;
        config.lock.poll_interval_ms = 10;
        config.signal.window_secs = 1;
        config.duplicates.scope = DedupScope::Playlist;
        config.duplicates.algorithm = HashAlgorithm::Sha256;
        config
    }

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();

        assert_eq!(config.storage.busy_timeout_ms, 30_000);
        assert_eq!(config.daemon.full_scan_interval(), Duration::from_secs(1800));
        assert_eq!(config.daemon.work_check_interval(), Duration::from_secs(5));
        assert_eq!(config.daemon.max_retry_count, 5);
        assert_eq!(config.lock.file_name, "daemon.lock");
        assert_eq!(config.lock.stale_after(), Duration::from_secs(600));
        assert_eq!(config.lock.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.lock.ui_wait_timeout(), Duration::from_secs(600));
        assert_eq!(config.lock.ui_restart_wait_timeout(), Duration::from_secs(300));
        assert_eq!(config.signal.window(), Duration::from_secs(30));
        assert_eq!(config.duplicates.scope, DedupScope::Global);
        assert_eq!(config.duplicates.max_directory_variants, 100);
        assert_eq!(config.duplicates.algorithm, HashAlgorithm::Md5);
        assert!(config.fetcher.verify_downloads);
        assert_eq!(config.logging.level, "info");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        let json = config.export().unwrap();
        assert!(json.contains("\"scope\": \"playlist\""));
        assert!(json.contains("\"algorithm\": \"sha256\""));

        let parsed = AppConfig::import(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "daemon": { "max_retry_count": 3 }, "logging": { "level": "debug" } }"#;
        let config = AppConfig::import(json).unwrap();

        assert_eq!(config.daemon.max_retry_count, 3);
        assert_eq!(config.daemon.full_scan_interval_secs, 1800);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.lock.file_name, "daemon.lock");
    }

    #[test]
    fn test_config_validation_invalid_intervals() {
        let mut config = create_test_config();
        config.daemon.work_check_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.daemon.full_scan_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.signal.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_lock() {
        let mut config = create_test_config();
        config.lock.stale_after_secs = 0;
        config.lock.poll_interval_ms = 100;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.lock.file_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_duplicates_and_logging() {
        let mut config = create_test_config();
        config.duplicates.max_directory_variants = 0;
        assert!(config.validate().is_err());

        config.duplicates.max_directory_variants = 10_001;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_import_invalid_json() {
        assert!(AppConfig::import("{ not json").is_err());
        assert!(AppConfig::import(r#"{ "duplicates": { "scope": "galaxy" } }"#).is_err());
    }

    #[test]
    fn test_load_from_creates_default_then_reads_back() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let created = AppConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, AppConfig::default());

        let mut changed = created;
        changed.daemon.max_retry_count = 2;
        changed.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.daemon.max_retry_count, 2);
    }

    #[test]
    fn test_resolved_paths() {
        let data_dir = Path::new("/var/lib/archiver");
        let mut config = AppConfig::default();

        assert_eq!(config.database_path(data_dir), data_dir.join("db.sqlite"));
        assert_eq!(config.lock_path(data_dir), data_dir.join("daemon.lock"));

        config.storage.database_path = Some(PathBuf::from("/tmp/other.sqlite"));
        assert_eq!(
            config.database_path(data_dir),
            PathBuf::from("/tmp/other.sqlite")
        );

        config.daemon.temp_directory = Some(PathBuf::from("/scratch"));
        assert_eq!(config.temp_directory(), PathBuf::from("/scratch"));
    }
}
