//! Runtime configuration.
//!
//! Built once at startup (defaults, optionally overlaid by a TOML file, then
//! by command-line flags) and handed to each component by reference.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::recent::default_recent_names_path;
use crate::retry::FixedDelay;
use crate::watch::WatchSettings;

/// `<home>/Documents/Assetto Corsa/cfg/race.ini`, or `race.ini` when no home
/// directory can be determined.
pub fn default_race_ini_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home
            .join("Documents")
            .join("Assetto Corsa")
            .join("cfg")
            .join("race.ini"),
        None => PathBuf::from("race.ini"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchTimings {
    /// Events closer than this to the last accepted one are dropped
    pub debounce_ms: u64,
    /// Pause after a qualifying event before reading the file
    pub settle_ms: u64,
    /// How long `stop` waits for the worker thread
    pub stop_timeout_ms: u64,
}

impl Default for WatchTimings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            settle_ms: 150,
            stop_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileRetry {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for FileRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 100,
        }
    }
}

impl FileRetry {
    pub fn strategy(&self) -> FixedDelay {
        FixedDelay::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Configuration for the interceptor and the session controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// File rewritten by the launcher and patched by us
    pub race_ini: PathBuf,
    pub watch: WatchTimings,
    pub file_retry: FileRetry,
    /// Give up on a hot phase after this many seconds (0 = never)
    pub hot_phase_timeout_secs: u64,
    /// Queue snapshot polling interval
    pub poll_interval_ms: u64,
    /// Capacity of the channel into the controller loop
    pub channel_capacity: usize,
    /// History of injected names (default: under the user config dir)
    pub recent_names: Option<PathBuf>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            race_ini: default_race_ini_path(),
            watch: WatchTimings::default(),
            file_retry: FileRetry::default(),
            hot_phase_timeout_secs: 120,
            poll_interval_ms: 2000,
            channel_capacity: 64,
            recent_names: None,
        }
    }
}

impl InterceptorConfig {
    pub fn builder() -> InterceptorConfigBuilder {
        InterceptorConfigBuilder::default()
    }

    /// Load from a TOML file. Missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.race_ini.file_name().is_none() {
            return Err(Error::Config(format!(
                "race_ini must name a file, got {}",
                self.race_ini.display()
            )));
        }
        if self.file_retry.max_attempts == 0 {
            return Err(Error::Config("file_retry.max_attempts must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn hot_phase_timeout(&self) -> Option<Duration> {
        (self.hot_phase_timeout_secs > 0).then(|| Duration::from_secs(self.hot_phase_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recent_names_path(&self) -> PathBuf {
        self.recent_names
            .clone()
            .unwrap_or_else(default_recent_names_path)
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            path: self.race_ini.clone(),
            debounce: Duration::from_millis(self.watch.debounce_ms),
            settle: Duration::from_millis(self.watch.settle_ms),
            stop_timeout: Duration::from_millis(self.watch.stop_timeout_ms),
        }
    }
}

/// Builder for InterceptorConfig
#[derive(Debug, Clone, Default)]
pub struct InterceptorConfigBuilder {
    base: Option<InterceptorConfig>,
    race_ini: Option<PathBuf>,
    debounce: Option<Duration>,
    settle: Option<Duration>,
    file_retry: Option<FileRetry>,
    hot_phase_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    recent_names: Option<PathBuf>,
}

impl InterceptorConfigBuilder {
    /// Start from a loaded config instead of the defaults
    pub fn base(mut self, config: InterceptorConfig) -> Self {
        self.base = Some(config);
        self
    }

    pub fn race_ini<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.race_ini = Some(path.into());
        self
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = Some(window);
        self
    }

    pub fn settle(mut self, delay: Duration) -> Self {
        self.settle = Some(delay);
        self
    }

    pub fn file_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.file_retry = Some(FileRetry {
            max_attempts,
            retry_delay_ms: retry_delay.as_millis() as u64,
        });
        self
    }

    /// `Duration::ZERO` disables the timeout
    pub fn hot_phase_timeout(mut self, timeout: Duration) -> Self {
        self.hot_phase_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn recent_names<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.recent_names = Some(path.into());
        self
    }

    pub fn build(self) -> InterceptorConfig {
        let mut config = self.base.unwrap_or_default();
        if let Some(path) = self.race_ini {
            config.race_ini = path;
        }
        if let Some(window) = self.debounce {
            config.watch.debounce_ms = window.as_millis() as u64;
        }
        if let Some(delay) = self.settle {
            config.watch.settle_ms = delay.as_millis() as u64;
        }
        if let Some(retry) = self.file_retry {
            config.file_retry = retry;
        }
        if let Some(timeout) = self.hot_phase_timeout {
            config.hot_phase_timeout_secs = timeout.as_secs();
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval_ms = interval.as_millis() as u64;
        }
        if let Some(path) = self.recent_names {
            config.recent_names = Some(path);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryStrategy;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = InterceptorConfig::default();
        assert!(
            config.race_ini.ends_with("Assetto Corsa/cfg/race.ini")
                || config.race_ini == Path::new("race.ini")
        );
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.watch.settle_ms, 150);
        assert_eq!(config.file_retry.strategy().max_attempts(), 5);
        assert_eq!(config.hot_phase_timeout(), Some(Duration::from_secs(120)));
        assert!(config.recent_names_path().ends_with("recent_names.json"));
        config.validate().unwrap();
    }

    #[test]
    fn test_builder_overrides() {
        let config = InterceptorConfig::builder()
            .race_ini("/tmp/cfg/race.ini")
            .debounce(Duration::from_millis(250))
            .settle(Duration::from_millis(300))
            .file_retry(8, Duration::from_millis(150))
            .hot_phase_timeout(Duration::ZERO)
            .build();

        assert_eq!(config.race_ini, PathBuf::from("/tmp/cfg/race.ini"));
        let settings = config.watch_settings();
        assert_eq!(settings.debounce, Duration::from_millis(250));
        assert_eq!(settings.settle, Duration::from_millis(300));
        assert_eq!(config.file_retry.max_attempts, 8);
        assert_eq!(config.file_retry.strategy().delay(1), Duration::from_millis(150));
        assert_eq!(config.hot_phase_timeout(), None);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interceptor.toml");
        fs::write(
            &path,
            "race_ini = \"C:/Users/rig/Documents/Assetto Corsa/cfg/race.ini\"\n\
             hot_phase_timeout_secs = 30\n\
             recent_names = \"D:/kiosk/recent.json\"\n\
             [watch]\n\
             settle_ms = 300\n\
             [file_retry]\n\
             max_attempts = 8\n",
        )
        .unwrap();

        let config = InterceptorConfig::load(&path).unwrap();
        assert_eq!(config.watch.settle_ms, 300);
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.file_retry.max_attempts, 8);
        assert_eq!(config.file_retry.retry_delay_ms, 100);
        assert_eq!(config.hot_phase_timeout_secs, 30);
        assert_eq!(config.recent_names_path(), PathBuf::from("D:/kiosk/recent.json"));
    }

    #[test]
    fn test_load_rejects_zero_attempts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interceptor.toml");
        fs::write(&path, "[file_retry]\nmax_attempts = 0\n").unwrap();

        let err = InterceptorConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = InterceptorConfig::load("definitely/not/here.toml").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_builder_keeps_loaded_base() {
        let base = InterceptorConfig {
            poll_interval_ms: 750,
            ..InterceptorConfig::default()
        };
        let config = InterceptorConfig::builder()
            .base(base)
            .race_ini("race.ini")
            .build();
        assert_eq!(config.poll_interval(), Duration::from_millis(750));
        assert_eq!(config.race_ini, PathBuf::from("race.ini"));
    }
}
