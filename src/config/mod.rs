//! Configuration management for AlertGate
//!
//! Defaults, then `config/default` and `config/local` (any format the
//! `config` crate reads), then `ALERTGATE__*` environment variables.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::backtesting::BacktestConfig;
use crate::filters::{CooldownConfig, FilterConfig};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    /// Confluence thresholds for code embedding the alert pipeline; the
    /// backtest job only validates them
    #[serde(default)]
    pub filter: FilterConfig,
    /// Cooldown bounds for code embedding the alert pipeline; the backtest
    /// job only validates them
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    pub persistence: PersistenceConfig,
    pub job: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; RUST_LOG wins when set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Root of the daily signal and price CSV files
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Seconds between backtest runs; 0 runs once and exits
    pub interval_secs: u64,
    /// Where to write the report (.yaml/.yml for YAML, JSON otherwise)
    #[serde(default)]
    pub report_path: Option<String>,
    /// Number of signal types listed in the summary
    pub top_signal_types: usize,
    /// Metrics cache TTL in seconds
    pub cache_ttl_secs: u64,
}

impl JobConfig {
    pub fn report_path(&self) -> Option<PathBuf> {
        self.report_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ALERTGATE__*)
            .add_source(Environment::with_prefix("ALERTGATE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Backtest defaults
            .set_default("backtest.lookback_days", 30)?
            .set_default("backtest.min_sample_size", 30)?
            .set_default("backtest.win_threshold", 0.0)?
            .set_default("backtest.reference_timeframe", "4h")?
            .set_default("backtest.batch_size", 20)?
            .set_default("backtest.target_win_rate", 0.7)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            // Job defaults
            .set_default("job.interval_secs", 0)?
            .set_default("job.top_signal_types", 5)?
            .set_default("job.cache_ttl_secs", 3600)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.backtest
            .validate()
            .context("Invalid backtest configuration")?;
        if self.cooldown.min_minutes > self.cooldown.max_minutes {
            bail!(
                "cooldown.min_minutes ({}) exceeds cooldown.max_minutes ({})",
                self.cooldown.min_minutes,
                self.cooldown.max_minutes
            );
        }
        if self.persistence.data_dir.trim().is_empty() {
            bail!("persistence.data_dir must not be empty");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let timeframes: Vec<String> = self
            .backtest
            .timeframes
            .iter()
            .map(|tf| tf.to_string())
            .collect();
        format!(
            "data_dir={} lookback_days={} timeframes={:?} min_sample={} win_threshold={} interval_secs={}",
            self.persistence.data_dir,
            self.backtest.lookback_days,
            timeframes,
            self.backtest.min_sample_size,
            self.backtest.win_threshold,
            self.job.interval_secs
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;
    use config::FileFormat;

    fn from_yaml(yaml: &str) -> AppConfig {
        AppConfig::builder()
            .unwrap()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_yaml("{}");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.backtest.lookback_days, 30);
        assert_eq!(config.backtest.timeframes, Timeframe::ALL.to_vec());
        assert_eq!(config.backtest.reference_timeframe, Timeframe::Hour4);
        assert_eq!(config.backtest.confidence_buckets.len(), 5);
        assert_eq!(config.filter.min_triggered, 2);
        assert_eq!(config.cooldown.max_minutes, 120);
        assert_eq!(config.job.report_path(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides() {
        let config = from_yaml(
            r#"
backtest:
  lookback_days: 7
  timeframes: ["1h", "24h"]
  win_threshold: 0.005
cooldown:
  base_minutes: 45
job:
  interval_secs: 600
  report_path: reports/backtest.yaml
"#,
        );
        assert_eq!(config.backtest.lookback_days, 7);
        assert_eq!(
            config.backtest.timeframes,
            vec![Timeframe::Hour1, Timeframe::Hour24]
        );
        assert_eq!(config.cooldown.base_minutes, 45.0);
        assert_eq!(config.cooldown.min_minutes, 15);
        assert_eq!(
            config.job.report_path(),
            Some(PathBuf::from("reports/backtest.yaml"))
        );
        assert!(config.digest().contains("lookback_days=7"));
    }

    #[test]
    fn test_validate_rejects_bad_bucket() {
        let config = from_yaml(
            r#"
backtest:
  confidence_buckets:
    - { min: 0.9, max: 0.8 }
"#,
        );
        assert!(config.validate().is_err());
    }
}
