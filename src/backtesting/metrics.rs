//! Metrics Calculator
//!
//! Aggregate performance statistics over the signals resolved at one horizon.
//! An empty input is a valid result (all zeros), not an error.

use serde::{Deserialize, Serialize};

use super::HistoricalSignal;
use crate::types::Timeframe;

/// z for a two-sided 95% interval
const Z_95: f64 = 1.96;

/// Backtest performance metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,
    /// Mean return of winning signals
    pub avg_return: f64,
    /// Mean absolute return of losing signals
    pub avg_loss: f64,
    /// avg_return / avg_loss; +inf with wins and no losses, written as `"inf"`
    #[serde(with = "unbounded_ratio")]
    pub risk_reward_ratio: f64,
    pub sample_size: usize,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline of the compounded curve
    pub max_drawdown: f64,
    /// 95% Wilson score interval for the win rate
    pub confidence_interval: (f64, f64),
    /// Compounded return minus 1
    pub total_return: f64,
}

impl Default for BacktestMetrics {
    fn default() -> Self {
        Self {
            win_rate: 0.0,
            avg_return: 0.0,
            avg_loss: 0.0,
            risk_reward_ratio: 0.0,
            sample_size: 0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            confidence_interval: (0.0, 0.0),
            total_return: 0.0,
        }
    }
}

impl BacktestMetrics {
    pub fn is_empty(&self) -> bool {
        self.sample_size == 0
    }
}

/// f64 that keeps ±infinity through JSON as the strings `"inf"` / `"-inf"`
mod unbounded_ratio {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => match text.trim().to_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid ratio: {}", other))),
            },
        }
    }
}

pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Metrics over signals with a resolved outcome at `timeframe`
    pub fn calculate(signals: &[HistoricalSignal], timeframe: Timeframe) -> BacktestMetrics {
        let mut resolved: Vec<(&HistoricalSignal, f64, bool)> = signals
            .iter()
            .filter_map(|s| s.outcome(timeframe).map(|o| (s, o.return_pct, o.is_win)))
            .collect();

        if resolved.is_empty() {
            return BacktestMetrics::default();
        }

        // Compounding order matters for drawdown
        resolved.sort_by_key(|(s, _, _)| s.timestamp);

        let returns: Vec<f64> = resolved.iter().map(|(_, r, _)| *r).collect();
        let wins: Vec<f64> = resolved
            .iter()
            .filter(|(_, _, w)| *w)
            .map(|(_, r, _)| *r)
            .collect();
        let losses: Vec<f64> = resolved
            .iter()
            .filter(|(_, _, w)| !*w)
            .map(|(_, r, _)| r.abs())
            .collect();

        let sample_size = returns.len();
        let win_rate = wins.len() as f64 / sample_size as f64;
        let avg_return = mean(&wins).unwrap_or(0.0);
        let avg_loss = mean(&losses).unwrap_or(0.0);

        let risk_reward_ratio = if wins.is_empty() {
            0.0
        } else if losses.is_empty() || avg_loss == 0.0 {
            f64::INFINITY
        } else {
            avg_return / avg_loss
        };

        let (max_drawdown, total_return) = drawdown_and_total(&returns);

        BacktestMetrics {
            win_rate,
            avg_return,
            avg_loss,
            risk_reward_ratio,
            sample_size,
            sharpe_ratio: sharpe_ratio(&returns),
            max_drawdown,
            confidence_interval: wilson_interval(wins.len(), sample_size),
            total_return,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// mean / sample std-dev (n - 1); 0 below two samples or with zero spread
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let avg = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev > 0.0 && std_dev.is_finite() {
        avg / std_dev
    } else {
        0.0
    }
}

/// (max drawdown, total return) of the compounded equity curve starting at 1.0
pub fn drawdown_and_total(returns: &[f64]) -> (f64, f64) {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_drawdown = 0.0_f64;

    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }

    (max_drawdown, equity - 1.0)
}

/// 95% Wilson score interval for `wins / total`, clamped to [0, 1]
pub fn wilson_interval(wins: usize, total: usize) -> (f64, f64) {
    if total == 0 {
        return (0.0, 0.0);
    }
    let n = total as f64;
    let p = wins as f64 / n;
    let z2 = Z_95 * Z_95;

    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = Z_95 * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    // Keep the point estimate inside its own interval under rounding
    let lo = (center - margin).clamp(0.0, 1.0).min(p);
    let hi = (center + margin).clamp(0.0, 1.0).max(p);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::test_support::resolved;
    use crate::types::Direction;

    #[test]
    fn test_empty_input_is_all_zero() {
        let metrics = MetricsCalculator::calculate(&[], Timeframe::Hour4);
        assert_eq!(metrics, BacktestMetrics::default());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_single_winner() {
        let signals = vec![resolved(0, "t", Direction::Buy, 0.8, 0.03, 0.0)];
        let metrics = MetricsCalculator::calculate(&signals, Timeframe::Hour1);
        assert_eq!(metrics.win_rate, 1.0);
        assert_eq!(metrics.avg_return, 0.03);
        assert_eq!(metrics.avg_loss, 0.0);
        assert!(metrics.risk_reward_ratio.is_infinite() && metrics.risk_reward_ratio > 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_unbounded_ratio_survives_json() {
        let signals = vec![resolved(0, "t", Direction::Buy, 0.8, 0.03, 0.0)];
        let metrics = MetricsCalculator::calculate(&signals, Timeframe::Hour1);

        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains(r#""risk_reward_ratio":"inf""#));
        let back: BacktestMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metrics);

        let finite: BacktestMetrics =
            serde_json::from_str(&json.replace(r#""inf""#, "2")).unwrap();
        assert_eq!(finite.risk_reward_ratio, 2.0);
        assert!(serde_json::from_str::<BacktestMetrics>(&json.replace(r#""inf""#, r#""lots""#)).is_err());
    }

    #[test]
    fn test_no_wins_zero_risk_reward() {
        let signals: Vec<_> = (0..3)
            .map(|i| resolved(i, "t", Direction::Sell, 0.6, -0.01, 0.0))
            .collect();
        let metrics = MetricsCalculator::calculate(&signals, Timeframe::Hour1);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.risk_reward_ratio, 0.0);
        assert!((metrics.avg_loss - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_seventy_thirty_scenario() {
        let threshold = 0.02;
        let signals: Vec<_> = (0..100)
            .map(|i| {
                let r = if i < 70 { 0.05 } else { -0.02 };
                resolved(i, "t", Direction::Buy, 0.7, r, threshold)
            })
            .collect();

        let m = MetricsCalculator::calculate(&signals, Timeframe::Hour4);
        assert_eq!(m.sample_size, 100);
        assert!((m.win_rate - 0.70).abs() < 1e-12);
        assert!((m.avg_return - 0.05).abs() < 1e-12);
        assert!((m.avg_loss - 0.02).abs() < 1e-12);
        assert!((m.risk_reward_ratio - 2.5).abs() < 1e-9);

        let (lo, hi) = m.confidence_interval;
        assert!((lo - 0.61).abs() < 0.01, "lo = {}", lo);
        assert!((hi - 0.78).abs() < 0.01, "hi = {}", hi);
    }

    #[test]
    fn test_drawdown_follows_chronological_order() {
        // Out-of-order input: the calculator sorts by timestamp
        let signals = vec![
            resolved(2, "t", Direction::Buy, 0.7, -0.5, 0.0),
            resolved(0, "t", Direction::Buy, 0.7, 1.0, 0.0),
            resolved(1, "t", Direction::Buy, 0.7, 0.0, 0.0),
        ];
        let m = MetricsCalculator::calculate(&signals, Timeframe::Hour1);
        // 1.0 -> 2.0 -> 2.0 -> 1.0
        assert!((m.max_drawdown - 0.5).abs() < 1e-12);
        assert!(m.total_return.abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_uses_sample_std_dev() {
        let s = sharpe_ratio(&[0.01, 0.03]);
        // mean 0.02, sample sd = sqrt(0.0002) ≈ 0.014142
        assert!((s - 0.02 / 0.0002_f64.sqrt()).abs() < 1e-9);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01]), 0.0);
    }

    #[test]
    fn test_wilson_bounds_hold() {
        for total in [1usize, 2, 5, 10, 37, 100, 1000] {
            for wins in 0..=total {
                let p = wins as f64 / total as f64;
                let (lo, hi) = wilson_interval(wins, total);
                assert!(0.0 <= lo && lo <= p && p <= hi && hi <= 1.0);
            }
        }
    }

    #[test]
    fn test_unresolved_horizon_ignored() {
        let mut signal = resolved(0, "t", Direction::Buy, 0.7, 0.04, 0.0);
        signal.set_outcome(Timeframe::Hour24, None);
        let m = MetricsCalculator::calculate(&[signal], Timeframe::Hour24);
        assert_eq!(m.sample_size, 0);
    }
}
