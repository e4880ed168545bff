//! AlertGate backtest job
//!
//! Replays persisted alerts against recorded prices and writes a report,
//! once or on a fixed interval until Ctrl-C.

use alertgate::backtesting::{BacktestEngine, BacktestError, BacktestReport, MetricsCache};
use alertgate::config::AppConfig;
use alertgate::logging::init_logging;
use alertgate::persistence::CsvStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Cache TTL ceiling, one year
const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 3600;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    info!("🚀 AlertGate v{} starting", env!("CARGO_PKG_VERSION"));
    info!(config = %config.digest(), "Configuration loaded");

    let store = Arc::new(
        CsvStore::new(&config.persistence.data_dir).context("Failed to open data directory")?,
    );
    let ttl_secs = config.job.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64;
    let cache = Arc::new(MetricsCache::new(chrono::Duration::seconds(ttl_secs)));
    let engine = BacktestEngine::new(store.clone(), store).with_cache(cache);

    if config.job.interval_secs == 0 {
        return run_once(&engine, &config).await;
    }

    let mut ticker =
        tokio::time::interval(std::time::Duration::from_secs(config.job.interval_secs));
    info!(interval_secs = config.job.interval_secs, "⏱️ Periodic backtest enabled");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_once(&engine, &config).await {
                    error!(error = %e, "Backtest run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

async fn run_once(engine: &BacktestEngine, config: &AppConfig) -> Result<()> {
    let report = match engine.run(&config.backtest).await {
        Ok(report) => report,
        Err(BacktestError::NoSignals { lookback_days }) => {
            warn!(lookback_days, "No signals to backtest, skipping run");
            return Ok(());
        }
        Err(e) => return Err(e).context("Backtest failed"),
    };

    info!("📊 {}", report.summary());
    for recommendation in &report.recommendations {
        info!("💡 {}", recommendation);
    }

    let top = engine
        .best_performing_signal_types(&config.backtest, config.job.top_signal_types, Utc::now())
        .await
        .context("Failed to rank signal types")?;
    for (rank, entry) in top.iter().enumerate() {
        info!(
            rank = rank + 1,
            signal_type = %entry.signal_type,
            win_rate = entry.metrics.win_rate,
            sample_size = entry.metrics.sample_size,
            "Top signal type"
        );
    }

    if let Some(path) = config.job.report_path() {
        write_report(&path, &report)?;
        info!(path = %path.display(), "💾 Report written");
    }

    Ok(())
}

fn write_report(path: &Path, report: &BacktestReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create report directory")?;
    }

    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let body = if yaml {
        serde_yaml::to_string(report).context("Failed to serialize report as YAML")?
    } else {
        serde_json::to_string_pretty(report).context("Failed to serialize report as JSON")?
    };

    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}
