//! Persistent application configuration
//!
//! Stores sweep and reporting settings in a JSON file at
//! `<config_dir>/echotest/config.json` (or a path given on the command line).
//! Every field has a default, so partial files are fine.

use echotest_core::report::store::DEFAULT_RESULTS_DIR;
use echotest_core::report::webhook::{WebhookConfig, DEFAULT_RETRIES};
use echotest_core::sweep::{SweepConfig, DEFAULT_INTER_TRIAL, DEFAULT_SETTLE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reference signal used when none is configured
pub const DEFAULT_REFERENCE_URL: &str = "https://cdn.jsdelivr.net/gh/EsssNi/EchoEchoTest@main/-18.wav";

fn default_reference_url() -> String {
    DEFAULT_REFERENCE_URL.to_string()
}

fn default_duration_secs() -> u32 {
    echotest_core::DEFAULT_DURATION_SECS
}

fn default_sample_rate() -> u32 {
    echotest_core::DEFAULT_SAMPLE_RATE
}

fn default_levels() -> Vec<u8> {
    echotest_core::DEFAULT_VOLUME_LEVELS.to_vec()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RESULTS_DIR)
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE.as_millis() as u64
}

fn default_inter_trial_ms() -> u64 {
    DEFAULT_INTER_TRIAL.as_millis() as u64
}

fn default_webhook_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_webhook_retry_delay_ms() -> u64 {
    1000
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// URL of the reference WAV file
    #[serde(default = "default_reference_url")]
    pub reference_url: String,
    /// Webhook receiving each trial (None = local results only)
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Trial length in seconds
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,
    /// Sample rate in Hz the reference must match
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Output volume levels, visited in order
    #[serde(default = "default_levels")]
    pub levels: Vec<u8>,
    /// Directory for per-level result files
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Wait after a volume change
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Wait between trials
    #[serde(default = "default_inter_trial_ms")]
    pub inter_trial_ms: u64,
    #[serde(default = "default_webhook_retries")]
    pub webhook_retries: u32,
    #[serde(default = "default_webhook_retry_delay_ms")]
    pub webhook_retry_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reference_url: default_reference_url(),
            webhook_url: None,
            duration_secs: default_duration_secs(),
            sample_rate: default_sample_rate(),
            levels: default_levels(),
            results_dir: default_results_dir(),
            settle_ms: default_settle_ms(),
            inter_trial_ms: default_inter_trial_ms(),
            webhook_retries: default_webhook_retries(),
            webhook_retry_delay_ms: default_webhook_retry_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Default config file path: `<config_dir>/echotest/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("echotest")
            .join("config.json")
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Sweep parameters derived from this config
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            levels: self.levels.clone(),
            duration: Duration::from_secs(self.duration_secs as u64),
            sample_rate: self.sample_rate,
            settle: Duration::from_millis(self.settle_ms),
            inter_trial: Duration::from_millis(self.inter_trial_ms),
        }
    }

    /// Webhook parameters, if a webhook is configured
    pub fn webhook_config(&self, token: Option<String>) -> Option<WebhookConfig> {
        self.webhook_url.as_ref().map(|url| WebhookConfig {
            url: url.clone(),
            token,
            retries: self.webhook_retries,
            retry_delay: Duration::from_millis(self.webhook_retry_delay_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.webhook_url, None);
        assert_eq!(config.duration_secs, 10);
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.levels, vec![75, 88, 100]);
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.webhook_retries, 3);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"webhook_url": "http://localhost/hook", "levels": [50]}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.webhook_url.as_deref(), Some("http://localhost/hook"));
        assert_eq!(config.levels, vec![50]);
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.settle_ms, 1000);
        assert_eq!(config.inter_trial_ms, 1500);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("echotest").join("config.json");

        let config = AppConfig {
            duration_secs: 3,
            levels: vec![20, 40],
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path), config);
    }

    #[test]
    fn test_unparsable_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }

    #[test]
    fn test_sweep_and_webhook_config() {
        let config = AppConfig {
            webhook_url: Some("http://example.test/hook".to_string()),
            ..Default::default()
        };

        let sweep = config.sweep_config();
        assert_eq!(sweep.duration, Duration::from_secs(10));
        assert_eq!(sweep.inter_trial, Duration::from_millis(1500));

        let webhook = config.webhook_config(Some("tok".to_string())).unwrap();
        assert_eq!(webhook.url, "http://example.test/hook");
        assert_eq!(webhook.token.as_deref(), Some("tok"));
        assert_eq!(webhook.retry_delay, Duration::from_secs(1));

        assert!(AppConfig::default().webhook_config(None).is_none());
    }
}
