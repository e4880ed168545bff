//! Backtesting Module
//!
//! Replays historical signals against realised prices:
//! - Forward-return collection at 1h/4h/24h
//! - Performance metrics (win rate, risk/reward, Sharpe, drawdown, Wilson CI)
//! - Confidence calibration and threshold search
//! - Report assembly

pub mod cache;
pub mod calibration;
pub mod collector;
pub mod engine;
pub mod metrics;

pub use cache::MetricsCache;
pub use calibration::{
    ConfidenceBucket, ConfidenceCalibrator, ThresholdResult, ThresholdSearch,
};
pub use collector::BacktestCollector;
pub use engine::{run_backtest, BacktestEngine, BacktestReport, SignalTypeBreakdown, SignalTypeRanking};
pub use metrics::{BacktestMetrics, MetricsCalculator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Direction, Timeframe};

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid confidence bucket [{min}, {max}]: bounds must satisfy 0 <= min <= max <= 1")]
    InvalidBucket { min: f64, max: f64 },

    #[error("unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    #[error("backtest requires at least one timeframe")]
    EmptyTimeframes,

    #[error("invalid backtest config: {0}")]
    InvalidConfig(String),

    #[error("no signals found in the last {lookback_days} days")]
    NoSignals { lookback_days: u32 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Inclusive confidence range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRange {
    pub min: f64,
    pub max: f64,
}

impl ConfidenceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, confidence: f64) -> bool {
        confidence >= self.min && confidence <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        let well_formed = self.min.is_finite()
            && self.max.is_finite()
            && self.min >= 0.0
            && self.max <= 1.0
            && self.min <= self.max;
        if well_formed {
            Ok(())
        } else {
            Err(BacktestError::InvalidBucket {
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub lookback_days: u32,
    pub min_sample_size: usize,
    pub confidence_buckets: Vec<ConfidenceRange>,
    pub timeframes: Vec<Timeframe>,
    /// Minimum return counted as a win
    pub win_threshold: f64,
    /// Timeframe used for calibration and the per-type breakdown
    pub reference_timeframe: Timeframe,
    /// Signals resolved concurrently per batch
    pub batch_size: usize,
    pub target_win_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            min_sample_size: 30,
            confidence_buckets: vec![
                ConfidenceRange::new(0.5, 0.6),
                ConfidenceRange::new(0.6, 0.7),
                ConfidenceRange::new(0.7, 0.8),
                ConfidenceRange::new(0.8, 0.9),
                ConfidenceRange::new(0.9, 1.0),
            ],
            timeframes: Timeframe::ALL.to_vec(),
            win_threshold: 0.0,
            reference_timeframe: Timeframe::Hour4,
            batch_size: 20,
            target_win_rate: 0.7,
        }
    }
}

impl BacktestConfig {
    /// Build timeframes from their string names, rejecting unknown ones
    pub fn with_timeframe_names(mut self, names: &[&str]) -> Result<Self, BacktestError> {
        self.timeframes = names
            .iter()
            .map(|n| Timeframe::parse(n).ok_or_else(|| BacktestError::UnsupportedTimeframe(n.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        for range in &self.confidence_buckets {
            range.validate()?;
        }
        if self.timeframes.is_empty() {
            return Err(BacktestError::EmptyTimeframes);
        }
        if self.batch_size == 0 {
            return Err(BacktestError::InvalidConfig("batch_size must be positive".into()));
        }
        if !self.win_threshold.is_finite() {
            return Err(BacktestError::InvalidConfig("win_threshold must be finite".into()));
        }
        if !(0.0..=1.0).contains(&self.target_win_rate) {
            return Err(BacktestError::InvalidConfig(
                "target_win_rate must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one signal at one horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonOutcome {
    pub exit_price: f64,
    pub return_pct: f64,
    pub is_win: bool,
}

/// A historical signal joined with realised prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSignal {
    pub id: String,
    pub asset: String,
    pub direction: Direction,
    pub confidence: f64,
    pub signal_type: String,
    pub timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub outcome_1h: Option<HorizonOutcome>,
    pub outcome_4h: Option<HorizonOutcome>,
    pub outcome_24h: Option<HorizonOutcome>,
}

impl HistoricalSignal {
    pub fn outcome(&self, timeframe: Timeframe) -> Option<&HorizonOutcome> {
        match timeframe {
            Timeframe::Hour1 => self.outcome_1h.as_ref(),
            Timeframe::Hour4 => self.outcome_4h.as_ref(),
            Timeframe::Hour24 => self.outcome_24h.as_ref(),
        }
    }

    pub fn exit_price(&self, timeframe: Timeframe) -> Option<f64> {
        self.outcome(timeframe).map(|o| o.exit_price)
    }

    pub fn return_at(&self, timeframe: Timeframe) -> Option<f64> {
        self.outcome(timeframe).map(|o| o.return_pct)
    }

    pub fn is_win_at(&self, timeframe: Timeframe) -> Option<bool> {
        self.outcome(timeframe).map(|o| o.is_win)
    }

    pub(crate) fn set_outcome(&mut self, timeframe: Timeframe, outcome: Option<HorizonOutcome>) {
        match timeframe {
            Timeframe::Hour1 => self.outcome_1h = outcome,
            Timeframe::Hour4 => self.outcome_4h = outcome,
            Timeframe::Hour24 => self.outcome_24h = outcome,
        }
    }
}

/// Count (wins, total) over signals resolved at `timeframe`
pub fn win_counts<'a>(
    signals: impl IntoIterator<Item = &'a HistoricalSignal>,
    timeframe: Timeframe,
) -> (usize, usize) {
    signals
        .into_iter()
        .filter_map(|s| s.is_win_at(timeframe))
        .fold((0, 0), |(wins, total), is_win| {
            (wins + usize::from(is_win), total + 1)
        })
}
