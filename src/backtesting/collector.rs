//! Backtest Data Collector
//!
//! Joins persisted signals with realised prices. Signals are resolved in
//! bounded batches; lookups within a batch run concurrently.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{BacktestConfig, BacktestError, HistoricalSignal, HorizonOutcome};
use crate::persistence::{PersistedSignal, PriceHistory, SignalStore};
use crate::types::Timeframe;

/// Tolerance for the entry bar around the signal timestamp
pub fn entry_tolerance() -> Duration {
    Duration::minutes(5)
}

pub struct BacktestCollector {
    signals: Arc<dyn SignalStore>,
    prices: Arc<dyn PriceHistory>,
}

impl BacktestCollector {
    pub fn new(signals: Arc<dyn SignalStore>, prices: Arc<dyn PriceHistory>) -> Self {
        Self { signals, prices }
    }

    /// Collect every signal newer than `now - lookback_days`
    pub async fn collect(
        &self,
        config: &BacktestConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistoricalSignal>, BacktestError> {
        config.validate()?;

        let cutoff = now - Duration::days(i64::from(config.lookback_days));
        let persisted = self
            .signals
            .signals_since(cutoff)
            .await
            .context("Failed to load signal history")?;

        info!(
            signals = persisted.len(),
            lookback_days = config.lookback_days,
            "Collecting backtest data"
        );

        let mut collected = Vec::with_capacity(persisted.len());
        let mut failed = 0usize;

        for (batch_idx, batch) in persisted.chunks(config.batch_size).enumerate() {
            let results = join_all(batch.iter().map(|s| self.resolve(s, config))).await;

            for (signal, result) in batch.iter().zip(results) {
                match result {
                    Ok(Some(historical)) => collected.push(historical),
                    Ok(None) => {
                        debug!(signal_id = %signal.id, asset = %signal.asset, "No entry price, signal excluded");
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(signal_id = %signal.id, asset = %signal.asset, error = %e, "Price lookup failed, signal excluded");
                    }
                }
            }
            debug!(batch = batch_idx, resolved = collected.len(), "Batch complete");
        }

        collected.sort_by_key(|s| s.timestamp);
        info!(
            collected = collected.len(),
            failed,
            "Backtest data collection finished"
        );
        Ok(collected)
    }

    /// Resolve one signal; `Ok(None)` when no entry bar lies within tolerance
    async fn resolve(
        &self,
        signal: &PersistedSignal,
        config: &BacktestConfig,
    ) -> Result<Option<HistoricalSignal>> {
        let entry = self
            .prices
            .closest_bar(&signal.asset, signal.timestamp, entry_tolerance())
            .await
            .context("entry price lookup")?;

        let Some(entry) = entry else {
            return Ok(None);
        };

        let mut historical = HistoricalSignal {
            id: signal.id.clone(),
            asset: signal.asset.clone(),
            direction: signal.direction,
            confidence: signal.confidence,
            signal_type: signal.signal_type.clone(),
            timestamp: signal.timestamp,
            entry_price: entry.price,
            outcome_1h: None,
            outcome_4h: None,
            outcome_24h: None,
        };

        for timeframe in Timeframe::ALL {
            let target = signal.timestamp + timeframe.offset();
            let exit = match self
                .prices
                .closest_bar(&signal.asset, target, timeframe.tolerance())
                .await
            {
                Ok(exit) => exit,
                Err(e) => {
                    // A failed exit lookup only loses this horizon
                    debug!(signal_id = %signal.id, timeframe = %timeframe, error = %e, "Exit lookup failed");
                    None
                }
            };

            let outcome = exit.map(|bar| {
                let return_pct = signal.direction.forward_return(entry.price, bar.price);
                HorizonOutcome {
                    exit_price: bar.price,
                    return_pct,
                    is_win: return_pct >= config.win_threshold,
                }
            });
            historical.set_outcome(timeframe, outcome);
        }

        Ok(Some(historical))
    }
}
