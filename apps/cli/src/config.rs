//! CLI configuration.
//!
//! Read from `~/.config/storepush/config.json` (or `--config <path>`). Every
//! field has a default, so a partial file is fine; an unparsable file is
//! reported and ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use storepush_protocol::DEFAULT_API_VERSION;
use storepush_resilience::BreakerConfig;
use storepush_upload::DEFAULT_MAX_CONCURRENCY;

/// Which store the CLI talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// HTTP upload gateway.
    #[default]
    Gateway,
    /// Mounted file share.
    Filesystem,
}

/// Circuit breaker settings, in file units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_successes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = BreakerConfig::default();
        Self {
            threshold: defaults.threshold,
            reset_timeout_ms: defaults.reset_timeout.as_millis() as u64,
            half_open_successes: defaults.half_open_successes,
        }
    }
}

impl From<&BreakerSettings> for BreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            threshold: settings.threshold,
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
            half_open_successes: settings.half_open_successes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorePushConfig {
    /// Gateway base URL.
    pub endpoint: String,
    pub api_version: String,
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub backend: BackendKind,
    /// Mount point used by the `filesystem` backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem_root: Option<PathBuf>,
    pub breaker: BreakerSettings,
}

impl Default for StorePushConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:19080".into(),
            api_version: DEFAULT_API_VERSION.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout_secs: 60,
            backend: BackendKind::Gateway,
            filesystem_root: None,
            breaker: BreakerSettings::default(),
        }
    }
}

impl StorePushConfig {
    /// Loads `path`, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&default_config_path()?),
        }
    }

    /// Loads `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("storepush").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StorePushConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, StorePushConfig::default());
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.api_version, "6.0");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"endpoint":"https://gw.example:19080","backend":"filesystem","breaker":{"threshold":2}}"#,
        )
        .unwrap();

        let config = StorePushConfig::load_from(&path).unwrap();
        assert_eq!(config.endpoint, "https://gw.example:19080");
        assert_eq!(config.backend, BackendKind::Filesystem);
        assert_eq!(config.breaker.threshold, 2);
        assert_eq!(config.breaker.reset_timeout_ms, 30_000);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let config = StorePushConfig::load_from(&path).unwrap();
        assert_eq!(config, StorePushConfig::default());
    }

    #[test]
    fn breaker_settings_convert() {
        let settings = BreakerSettings {
            threshold: 3,
            reset_timeout_ms: 1500,
            half_open_successes: 1,
        };
        let config = BreakerConfig::from(&settings);
        assert_eq!(config.threshold, 3);
        assert_eq!(config.reset_timeout, Duration::from_millis(1500));
        assert_eq!(config.half_open_successes, 1);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = StorePushConfig {
            filesystem_root: Some(PathBuf::from("/mnt/share")),
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"backend\": \"gateway\""));
        let back: StorePushConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
