//! ratequeue configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;

/// Provider that gets a scheduler entry in the default config
pub const DEFAULT_PROVIDER: &str = "storage";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// One scheduler per named provider
    pub providers: BTreeMap<String, SchedulerConfig>,

    /// Logging configuration
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(DEFAULT_PROVIDER.to_string(), SchedulerConfig::default());
        Self {
            providers,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        for (name, scheduler) in &self.providers {
            scheduler
                .validate()
                .with_context(|| format!("Invalid scheduler config for provider '{}'", name))?;
        }
        Ok(())
    }

    /// Scheduler config for a provider, defaults if it has no entry
    pub fn scheduler(&self, provider: &str) -> SchedulerConfig {
        match self.providers.get(provider) {
            Some(config) => config.clone(),
            None => {
                tracing::debug!(%provider, "No scheduler config for provider, using defaults");
                SchedulerConfig::default()
            }
        }
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ratequeue.yml
        let local_config = PathBuf::from(".ratequeue.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ratequeue/ratequeue.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ratequeue").join("ratequeue.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when RUST_LOG is unset
    pub level: String,

    /// Log directory; defaults to the platform data dir
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl LogConfig {
    /// Resolve the log directory: RQ_LOG_DIR, then config, then data dir
    pub fn log_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os("RQ_LOG_DIR") {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ratequeue")
            .join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    /// Restores the working directory when dropped
    struct CwdGuard(PathBuf);

    impl CwdGuard {
        fn enter(dir: &Path) -> Self {
            let previous = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            Self(previous)
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.scheduler(DEFAULT_PROVIDER), SchedulerConfig::default());
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
providers:
  storage:
    min-dispatch-delay-ms: 500
    max-retries: 5
  completion:
    max-concurrent: 4
    transient-markers: ["overloaded"]
log:
  level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        let storage = config.scheduler("storage");
        assert_eq!(storage.min_dispatch_delay_ms, 500);
        assert_eq!(storage.max_retries, 5);
        assert_eq!(storage.max_concurrent, 1);

        let completion = config.scheduler("completion");
        assert_eq!(completion.max_concurrent, 4);
        assert_eq!(completion.transient_markers, vec!["overloaded".to_string()]);

        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_unknown_provider_gets_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler("songs"), SchedulerConfig::default());
    }

    #[test]
    fn test_validate_names_provider() {
        let mut config = Config::default();
        config.providers.insert(
            "broken".to_string(),
            SchedulerConfig {
                max_concurrent: 0,
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(&path, "providers:\n  storage:\n    max-retries: 1\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scheduler("storage").max_retries, 1);
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let path = PathBuf::from("/nonexistent/ratequeue.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_explicit_path_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "providers:\n  storage:\n    max-concurrent: 0\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_load_project_local_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".ratequeue.yml"),
            "providers:\n  storage:\n    min-dispatch-delay-ms: 250\n",
        )
        .unwrap();
        let _cwd = CwdGuard::enter(dir.path());

        let config = Config::load(None).unwrap();
        assert_eq!(config.scheduler("storage").min_dispatch_delay_ms, 250);
    }

    #[test]
    #[serial]
    fn test_broken_local_config_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".ratequeue.yml"), "providers: [not, a, map]\n").unwrap();
        let _cwd = CwdGuard::enter(dir.path());

        assert!(Config::load(None).is_ok());
    }

    #[test]
    fn test_log_dir_from_config() {
        let log = LogConfig {
            level: "info".to_string(),
            dir: Some(PathBuf::from("/tmp/rq-logs")),
        };
        if std::env::var_os("RQ_LOG_DIR").is_none() {
            assert_eq!(log.log_dir(), PathBuf::from("/tmp/rq-logs"));
        }
    }
}
