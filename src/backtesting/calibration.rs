//! Confidence Calibrator
//!
//! Compares the win rate a confidence level claims with the win rate it
//! actually delivered, and searches for the lowest-risk confidence cut-off.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{win_counts, BacktestConfig, BacktestError, HistoricalSignal};
use crate::types::Timeframe;

/// Maximum mean calibration error before recalibration is advised
const MAX_MEAN_CALIBRATION_ERROR: f64 = 0.10;
/// Buckets with fewer samples are flagged as unreliable
const MIN_BUCKET_SAMPLES: usize = 20;

/// Predicted vs actual win rate for one confidence range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBucket {
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Midpoint of the range
    pub predicted_win_rate: f64,
    pub actual_win_rate: f64,
    pub sample_size: usize,
    pub calibration_error: f64,
}

impl ConfidenceBucket {
    pub fn label(&self) -> String {
        format!(
            "{:.0}%-{:.0}%",
            self.min_confidence * 100.0,
            self.max_confidence * 100.0
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    pub actual_win_rate: f64,
    pub sample_size: usize,
}

/// Outcome of the threshold search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThresholdSearch {
    /// Highest threshold meeting both the target win rate and the sample floor
    TargetMet(ThresholdResult),
    /// Nothing met the target; the best candidate seen instead. Candidates
    /// meeting the sample floor rank above thinner ones, then by win rate,
    /// then by the higher threshold, so this can carry a lower win rate than
    /// a threshold with fewer signals
    BestEffort(ThresholdResult),
    /// No signal cleared even the lowest threshold
    NoData,
}

impl ThresholdSearch {
    pub fn result(&self) -> Option<&ThresholdResult> {
        match self {
            ThresholdSearch::TargetMet(r) | ThresholdSearch::BestEffort(r) => Some(r),
            ThresholdSearch::NoData => None,
        }
    }

    pub fn target_met(&self) -> bool {
        matches!(self, ThresholdSearch::TargetMet(_))
    }
}

/// Candidate thresholds, strictest first: 0.95, 0.90, ..., 0.50
fn candidate_thresholds() -> impl Iterator<Item = f64> {
    (0..10).map(|i| (95 - 5 * i) as f64 / 100.0)
}

pub struct ConfidenceCalibrator;

impl ConfidenceCalibrator {
    /// One bucket per configured range
    pub fn calibrate(
        signals: &[HistoricalSignal],
        config: &BacktestConfig,
        timeframe: Timeframe,
    ) -> Result<Vec<ConfidenceBucket>, BacktestError> {
        config.validate()?;

        Ok(config
            .confidence_buckets
            .iter()
            .map(|range| {
                let (wins, total) = win_counts(
                    signals.iter().filter(|s| range.contains(s.confidence)),
                    timeframe,
                );
                let predicted = range.midpoint();

                if total == 0 {
                    warn!(
                        min = range.min,
                        max = range.max,
                        timeframe = %timeframe,
                        "Empty confidence bucket"
                    );
                }

                let actual = if total > 0 {
                    wins as f64 / total as f64
                } else {
                    0.0
                };

                ConfidenceBucket {
                    min_confidence: range.min,
                    max_confidence: range.max,
                    predicted_win_rate: predicted,
                    actual_win_rate: actual,
                    sample_size: total,
                    calibration_error: (predicted - actual).abs(),
                }
            })
            .collect())
    }

    /// Highest threshold whose filtered win rate reaches `target_win_rate`
    /// over at least `min_sample_size` signals.
    pub fn find_optimal_threshold(
        signals: &[HistoricalSignal],
        timeframe: Timeframe,
        target_win_rate: f64,
        min_sample_size: usize,
    ) -> ThresholdSearch {
        // (meets sample floor, win rate, threshold) ranked lexicographically
        let mut best: Option<(bool, ThresholdResult)> = None;

        for threshold in candidate_thresholds() {
            let (wins, total) = win_counts(
                signals.iter().filter(|s| s.confidence >= threshold),
                timeframe,
            );
            if total == 0 {
                continue;
            }

            let candidate = ThresholdResult {
                threshold,
                actual_win_rate: wins as f64 / total as f64,
                sample_size: total,
            };
            let enough = total >= min_sample_size;

            if enough && candidate.actual_win_rate >= target_win_rate {
                debug!(threshold, win_rate = candidate.actual_win_rate, "Threshold meets target");
                return ThresholdSearch::TargetMet(candidate);
            }

            // Scanning high to low, so strict `>` keeps the higher threshold on ties
            let better = match &best {
                None => true,
                Some((best_enough, b)) => {
                    (enough && !best_enough)
                        || (enough == *best_enough && candidate.actual_win_rate > b.actual_win_rate)
                }
            };
            if better {
                best = Some((enough, candidate));
            }
        }

        match best {
            Some((_, result)) => ThresholdSearch::BestEffort(result),
            None => ThresholdSearch::NoData,
        }
    }

    /// Advisory hints derived from calibration quality
    pub fn recommend(buckets: &[ConfidenceBucket], optimal: &ThresholdSearch) -> Vec<String> {
        let mut recommendations = Vec::new();
        let populated: Vec<&ConfidenceBucket> =
            buckets.iter().filter(|b| b.sample_size > 0).collect();

        if !populated.is_empty() {
            let mean_error = populated.iter().map(|b| b.calibration_error).sum::<f64>()
                / populated.len() as f64;
            if mean_error > MAX_MEAN_CALIBRATION_ERROR {
                recommendations.push(format!(
                    "Mean calibration error is {:.1}%; confidence scores do not match observed win rates and should be recalibrated",
                    mean_error * 100.0
                ));
            }
        }

        for bucket in buckets.iter().filter(|b| b.sample_size < MIN_BUCKET_SAMPLES) {
            recommendations.push(format!(
                "Confidence bucket {} has only {} samples; treat its win rate as unreliable",
                bucket.label(),
                bucket.sample_size
            ));
        }

        let over = populated
            .iter()
            .filter(|b| b.predicted_win_rate > b.actual_win_rate)
            .count();
        let under = populated
            .iter()
            .filter(|b| b.predicted_win_rate < b.actual_win_rate)
            .count();
        if over > under {
            recommendations.push(format!(
                "Signals are systematically overconfident ({} of {} buckets underperform their claimed win rate); lower reported confidence",
                over,
                populated.len()
            ));
        } else if under > over {
            recommendations.push(format!(
                "Signals are systematically underconfident ({} of {} buckets beat their claimed win rate); confidence can be raised",
                under,
                populated.len()
            ));
        }

        match optimal {
            ThresholdSearch::TargetMet(r) => recommendations.push(format!(
                "Use a minimum confidence of {:.0}% (win rate {:.1}% over {} signals)",
                r.threshold * 100.0,
                r.actual_win_rate * 100.0,
                r.sample_size
            )),
            ThresholdSearch::BestEffort(r) => recommendations.push(format!(
                "No confidence threshold reaches the target win rate; best observed is {:.0}% with win rate {:.1}% over {} signals",
                r.threshold * 100.0,
                r.actual_win_rate * 100.0,
                r.sample_size
            )),
            ThresholdSearch::NoData => recommendations
                .push("No signals above 50% confidence; threshold cannot be calibrated".to_string()),
        }

        recommendations
    }
}
