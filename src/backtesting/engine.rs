//! Backtest Engine
//!
//! Collector -> metrics -> calibrator, assembled into one immutable report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    BacktestCollector, BacktestConfig, BacktestError, BacktestMetrics, ConfidenceBucket,
    ConfidenceCalibrator, HistoricalSignal, MetricsCache, MetricsCalculator, ThresholdSearch,
};
use crate::persistence::{PriceHistory, SignalStore};
use crate::types::{Direction, Timeframe};

const MIN_HEALTHY_WIN_RATE: f64 = 0.60;
const MIN_HEALTHY_RISK_REWARD: f64 = 1.5;
const MAX_HEALTHY_DRAWDOWN: f64 = 0.20;

/// Metrics for one (signal type, direction) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTypeBreakdown {
    pub signal_type: String,
    pub direction: Direction,
    pub metrics: BacktestMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTypeRanking {
    pub signal_type: String,
    pub metrics: BacktestMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub generated_at: DateTime<Utc>,
    pub lookback_days: u32,
    pub total_signals: usize,
    pub metrics_by_timeframe: BTreeMap<Timeframe, BacktestMetrics>,
    pub reference_timeframe: Timeframe,
    /// Breakdown on the reference timeframe, pairs below the sample floor dropped
    pub by_signal_type: Vec<SignalTypeBreakdown>,
    pub calibration: Vec<ConfidenceBucket>,
    pub optimal_threshold: ThresholdSearch,
    pub recommendations: Vec<String>,
}

impl BacktestReport {
    /// Metrics on the reference timeframe (zeroed if it was not requested)
    pub fn reference_metrics(&self) -> BacktestMetrics {
        self.metrics_by_timeframe
            .get(&self.reference_timeframe)
            .cloned()
            .unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        let m = self.reference_metrics();
        format!(
            "signals={} tf={} win_rate={:.1}% rr={:.2} sharpe={:.2} max_dd={:.1}% n={}",
            self.total_signals,
            self.reference_timeframe,
            m.win_rate * 100.0,
            m.risk_reward_ratio,
            m.sharpe_ratio,
            m.max_drawdown * 100.0,
            m.sample_size
        )
    }
}

pub struct BacktestEngine {
    collector: BacktestCollector,
    cache: Option<Arc<MetricsCache>>,
}

impl BacktestEngine {
    pub fn new(signals: Arc<dyn SignalStore>, prices: Arc<dyn PriceHistory>) -> Self {
        Self {
            collector: BacktestCollector::new(signals, prices),
            cache: None,
        }
    }

    /// Share a caller-owned metrics cache with this engine
    pub fn with_cache(mut self, cache: Arc<MetricsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn run(&self, config: &BacktestConfig) -> Result<BacktestReport, BacktestError> {
        self.run_at(config, Utc::now()).await
    }

    pub async fn run_at(
        &self,
        config: &BacktestConfig,
        now: DateTime<Utc>,
    ) -> Result<BacktestReport, BacktestError> {
        let signals = self.collect_non_empty(config, now).await?;
        let report = Self::build_report(&signals, config, now)?;

        if let Some(cache) = &self.cache {
            for (signal_type, metrics) in per_signal_type(&signals, config.reference_timeframe) {
                cache.insert(&signal_type, config.reference_timeframe, metrics, now);
            }
        }

        info!(summary = %report.summary(), "Backtest complete");
        Ok(report)
    }

    /// Signal types ranked by win rate on the reference timeframe.
    ///
    /// Served from the cache when it holds fresh entries.
    pub async fn best_performing_signal_types(
        &self,
        config: &BacktestConfig,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<SignalTypeRanking>, BacktestError> {
        config.validate()?;
        let timeframe = config.reference_timeframe;

        let cached = self
            .cache
            .as_ref()
            .map(|c| c.fresh_entries(timeframe, now))
            .unwrap_or_default();

        let per_type = if cached.is_empty() {
            let signals = self.collect_non_empty(config, now).await?;
            let computed = per_signal_type(&signals, timeframe);
            if let Some(cache) = &self.cache {
                for (signal_type, metrics) in &computed {
                    cache.insert(signal_type, timeframe, metrics.clone(), now);
                }
            }
            computed
        } else {
            cached
        };

        let mut ranking: Vec<SignalTypeRanking> = per_type
            .into_iter()
            .filter(|(_, m)| m.sample_size >= config.min_sample_size && m.sample_size > 0)
            .map(|(signal_type, metrics)| SignalTypeRanking {
                signal_type,
                metrics,
            })
            .collect();

        ranking.sort_by(|a, b| {
            b.metrics
                .win_rate
                .total_cmp(&a.metrics.win_rate)
                .then(b.metrics.sample_size.cmp(&a.metrics.sample_size))
                .then_with(|| a.signal_type.cmp(&b.signal_type))
        });
        ranking.truncate(limit);
        Ok(ranking)
    }

    async fn collect_non_empty(
        &self,
        config: &BacktestConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistoricalSignal>, BacktestError> {
        let signals = self.collector.collect(config, now).await?;
        if signals.is_empty() {
            warn!(lookback_days = config.lookback_days, "No signals available for backtest");
            return Err(BacktestError::NoSignals {
                lookback_days: config.lookback_days,
            });
        }
        Ok(signals)
    }

    /// Assemble a report from already collected signals
    pub fn build_report(
        signals: &[HistoricalSignal],
        config: &BacktestConfig,
        now: DateTime<Utc>,
    ) -> Result<BacktestReport, BacktestError> {
        config.validate()?;
        let reference = config.reference_timeframe;

        let metrics_by_timeframe: BTreeMap<Timeframe, BacktestMetrics> = config
            .timeframes
            .iter()
            .map(|tf| (*tf, MetricsCalculator::calculate(signals, *tf)))
            .collect();

        let by_signal_type = breakdown(signals, reference, config.min_sample_size);
        let calibration = ConfidenceCalibrator::calibrate(signals, config, reference)?;
        let optimal_threshold = ConfidenceCalibrator::find_optimal_threshold(
            signals,
            reference,
            config.target_win_rate,
            config.min_sample_size,
        );

        let mut recommendations = ConfidenceCalibrator::recommend(&calibration, &optimal_threshold);
        let reference_metrics = metrics_by_timeframe
            .get(&reference)
            .cloned()
            .unwrap_or_else(|| MetricsCalculator::calculate(signals, reference));
        recommendations.extend(health_checks(&reference_metrics, reference));

        Ok(BacktestReport {
            generated_at: now,
            lookback_days: config.lookback_days,
            total_signals: signals.len(),
            metrics_by_timeframe,
            reference_timeframe: reference,
            by_signal_type,
            calibration,
            optimal_threshold,
            recommendations,
        })
    }
}

/// Run a one-off backtest against the given stores
pub async fn run_backtest(
    signals: Arc<dyn SignalStore>,
    prices: Arc<dyn PriceHistory>,
    config: &BacktestConfig,
) -> Result<BacktestReport, BacktestError> {
    BacktestEngine::new(signals, prices).run(config).await
}

fn per_signal_type(signals: &[HistoricalSignal], timeframe: Timeframe) -> Vec<(String, BacktestMetrics)> {
    let mut groups: HashMap<&str, Vec<HistoricalSignal>> = HashMap::new();
    for signal in signals {
        groups
            .entry(signal.signal_type.as_str())
            .or_default()
            .push(signal.clone());
    }
    groups
        .into_iter()
        .map(|(signal_type, group)| {
            (
                signal_type.to_string(),
                MetricsCalculator::calculate(&group, timeframe),
            )
        })
        .collect()
}

fn breakdown(
    signals: &[HistoricalSignal],
    timeframe: Timeframe,
    min_sample_size: usize,
) -> Vec<SignalTypeBreakdown> {
    let mut groups: BTreeMap<(&str, Direction), Vec<HistoricalSignal>> = BTreeMap::new();
    for signal in signals {
        groups
            .entry((signal.signal_type.as_str(), signal.direction))
            .or_default()
            .push(signal.clone());
    }

    groups
        .into_iter()
        .map(|((signal_type, direction), group)| SignalTypeBreakdown {
            signal_type: signal_type.to_string(),
            direction,
            metrics: MetricsCalculator::calculate(&group, timeframe),
        })
        .filter(|b| b.metrics.sample_size >= min_sample_size && b.metrics.sample_size > 0)
        .collect()
}

fn health_checks(metrics: &BacktestMetrics, timeframe: Timeframe) -> Vec<String> {
    if metrics.is_empty() {
        return vec![format!(
            "No signals resolved at the {} horizon; performance metrics are empty",
            timeframe
        )];
    }

    let mut recommendations = Vec::new();
    if metrics.win_rate < MIN_HEALTHY_WIN_RATE {
        recommendations.push(format!(
            "Win rate {:.1}% is below {:.0}%; tighten the confluence filter or raise the minimum confidence",
            metrics.win_rate * 100.0,
            MIN_HEALTHY_WIN_RATE * 100.0
        ));
    }
    if metrics.risk_reward_ratio < MIN_HEALTHY_RISK_REWARD {
        recommendations.push(format!(
            "Risk/reward {:.2} is below {:.1}; widen targets or tighten stops",
            metrics.risk_reward_ratio, MIN_HEALTHY_RISK_REWARD
        ));
    }
    if metrics.max_drawdown > MAX_HEALTHY_DRAWDOWN {
        recommendations.push(format!(
            "Max drawdown {:.1}% exceeds {:.0}%; reduce alert frequency during losing streaks",
            metrics.max_drawdown * 100.0,
            MAX_HEALTHY_DRAWDOWN * 100.0
        ));
    }
    recommendations
}
