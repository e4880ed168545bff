//! Confluence Filter
//!
//! Gates whether a candidate deserves any further analysis. Each indicator is
//! checked against its severity tiers; at most one tier fires per indicator.
//! A candidate proceeds only when several indicators agree, never on a single
//! extreme reading.

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSnapshot;
use crate::types::{AdxDirection, RiskLevel, SignalTag};

/// Thresholds and weights for the confluence rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Minimum number of fired rules
    pub min_triggered: usize,
    /// Minimum confluence score
    pub min_score: f64,

    // RSI tiers (inclusive)
    pub rsi_critical_oversold: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_critical_overbought: f64,
    pub rsi_critical_weight: f64,
    pub rsi_weight: f64,

    // VWAP deviation tiers, absolute percent
    pub vwap_extreme_pct: f64,
    pub vwap_deviation_pct: f64,
    pub vwap_extreme_weight: f64,
    pub vwap_weight: f64,

    // Bollinger %B tiers
    pub bb_outside_lower: f64,
    pub bb_near_lower: f64,
    pub bb_near_upper: f64,
    pub bb_outside_upper: f64,
    pub bb_outside_weight: f64,
    pub bb_near_weight: f64,

    // ADX tiers
    pub adx_very_strong: f64,
    pub adx_strong: f64,
    pub adx_very_strong_weight: f64,
    pub adx_strong_weight: f64,

    // ATR% tiers
    pub atr_extreme_pct: f64,
    pub atr_high_pct: f64,
    pub atr_extreme_weight: f64,
    pub atr_high_weight: f64,

    // OBV z-score tiers, absolute
    pub obv_extreme_z: f64,
    pub obv_z: f64,
    pub obv_extreme_weight: f64,
    pub obv_weight: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_triggered: 2,
            min_score: 0.2,
            rsi_critical_oversold: 20.0,
            rsi_oversold: 25.0,
            rsi_overbought: 75.0,
            rsi_critical_overbought: 80.0,
            rsi_critical_weight: 0.25,
            rsi_weight: 0.15,
            vwap_extreme_pct: 5.0,
            vwap_deviation_pct: 3.0,
            vwap_extreme_weight: 0.2,
            vwap_weight: 0.1,
            bb_outside_lower: 0.0,
            bb_near_lower: 0.1,
            bb_near_upper: 0.9,
            bb_outside_upper: 1.0,
            bb_outside_weight: 0.2,
            bb_near_weight: 0.1,
            adx_very_strong: 40.0,
            adx_strong: 25.0,
            adx_very_strong_weight: 0.2,
            adx_strong_weight: 0.1,
            atr_extreme_pct: 5.0,
            atr_high_pct: 3.0,
            atr_extreme_weight: 0.15,
            atr_high_weight: 0.1,
            obv_extreme_z: 3.0,
            obv_z: 2.0,
            obv_extreme_weight: 0.2,
            obv_weight: 0.1,
        }
    }
}

/// Result of one confluence evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub should_proceed: bool,
    /// Fired rule names, in evaluation order
    pub triggered_indicators: Vec<String>,
    /// Semantic tags per fired rule (not deduplicated)
    pub signal_candidates: Vec<SignalTag>,
    /// Sum of fired weights; may exceed 1.0
    pub confluence_score: f64,
    pub risk_level: RiskLevel,
}

impl FilterResult {
    pub fn triggered_count(&self) -> usize {
        self.triggered_indicators.len()
    }
}

/// A fired tier
#[derive(Debug, Clone, Copy, PartialEq)]
struct RuleHit {
    name: &'static str,
    tag: SignalTag,
    weight: f64,
}

impl RuleHit {
    fn new(name: &'static str, tag: SignalTag, weight: f64) -> Self {
        // Negative weights would break score monotonicity
        Self {
            name,
            tag,
            weight: weight.max(0.0),
        }
    }
}

/// Multi-indicator confluence gate
#[derive(Debug, Clone, Default)]
pub struct ConfluenceFilter {
    config: FilterConfig,
}

impl ConfluenceFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate all rules against a snapshot
    pub fn evaluate(&self, snapshot: &IndicatorSnapshot) -> FilterResult {
        let hits: Vec<RuleHit> = [
            self.check_rsi(snapshot),
            self.check_vwap(snapshot),
            self.check_bollinger(snapshot),
            self.check_adx(snapshot),
            self.check_atr(snapshot),
            self.check_obv(snapshot),
        ]
        .into_iter()
        .flatten()
        .collect();

        let confluence_score: f64 = hits.iter().map(|h| h.weight).sum();
        let should_proceed =
            hits.len() >= self.config.min_triggered && confluence_score >= self.config.min_score;

        FilterResult {
            should_proceed,
            triggered_indicators: hits.iter().map(|h| h.name.to_string()).collect(),
            signal_candidates: hits.iter().map(|h| h.tag).collect(),
            confluence_score,
            risk_level: RiskLevel::from_score(confluence_score),
        }
    }

    fn check_rsi(&self, snapshot: &IndicatorSnapshot) -> Option<RuleHit> {
        let rsi = snapshot.rsi.value()?;
        let c = &self.config;

        if rsi <= c.rsi_critical_oversold {
            Some(RuleHit::new("RSI_CRITICAL_OVERSOLD", SignalTag::Oversold, c.rsi_critical_weight))
        } else if rsi <= c.rsi_oversold {
            Some(RuleHit::new("RSI_OVERSOLD", SignalTag::Oversold, c.rsi_weight))
        } else if rsi >= c.rsi_critical_overbought {
            Some(RuleHit::new(
                "RSI_CRITICAL_OVERBOUGHT",
                SignalTag::Overbought,
                c.rsi_critical_weight,
            ))
        } else if rsi >= c.rsi_overbought {
            Some(RuleHit::new("RSI_OVERBOUGHT", SignalTag::Overbought, c.rsi_weight))
        } else {
            None
        }
    }

    fn check_vwap(&self, snapshot: &IndicatorSnapshot) -> Option<RuleHit> {
        let deviation = snapshot.vwap_deviation_pct.value()?;
        let c = &self.config;
        let above = deviation > 0.0;

        if deviation.abs() >= c.vwap_extreme_pct {
            let name = if above {
                "VWAP_EXTREME_ABOVE"
            } else {
                "VWAP_EXTREME_BELOW"
            };
            Some(RuleHit::new(name, SignalTag::MeanReversion, c.vwap_extreme_weight))
        } else if deviation.abs() >= c.vwap_deviation_pct {
            let name = if above {
                "VWAP_DEVIATION_ABOVE"
            } else {
                "VWAP_DEVIATION_BELOW"
            };
            Some(RuleHit::new(name, SignalTag::MeanReversion, c.vwap_weight))
        } else {
            None
        }
    }

    fn check_bollinger(&self, snapshot: &IndicatorSnapshot) -> Option<RuleHit> {
        let pb = snapshot.percent_b.value()?;
        let c = &self.config;

        if pb <= c.bb_outside_lower {
            Some(RuleHit::new("BB_BELOW_LOWER_BAND", SignalTag::Oversold, c.bb_outside_weight))
        } else if pb <= c.bb_near_lower {
            Some(RuleHit::new("BB_NEAR_LOWER_BAND", SignalTag::Oversold, c.bb_near_weight))
        } else if pb >= c.bb_outside_upper {
            Some(RuleHit::new("BB_ABOVE_UPPER_BAND", SignalTag::Overbought, c.bb_outside_weight))
        } else if pb >= c.bb_near_upper {
            Some(RuleHit::new("BB_NEAR_UPPER_BAND", SignalTag::Overbought, c.bb_near_weight))
        } else {
            None
        }
    }

    fn check_adx(&self, snapshot: &IndicatorSnapshot) -> Option<RuleHit> {
        let adx = snapshot.adx.value()?;
        let c = &self.config;
        let tag = match snapshot.adx_direction {
            Some(AdxDirection::Up) => SignalTag::TrendUp,
            Some(AdxDirection::Down) => SignalTag::TrendDown,
            _ => SignalTag::Trending,
        };

        if adx >= c.adx_very_strong {
            Some(RuleHit::new("ADX_VERY_STRONG_TREND", tag, c.adx_very_strong_weight))
        } else if adx >= c.adx_strong {
            Some(RuleHit::new("ADX_STRONG_TREND", tag, c.adx_strong_weight))
        } else {
            None
        }
    }

    fn check_atr(&self, snapshot: &IndicatorSnapshot) -> Option<RuleHit> {
        let atr = snapshot.atr_pct.value()?;
        let c = &self.config;

        if atr >= c.atr_extreme_pct {
            Some(RuleHit::new(
                "ATR_EXTREME_VOLATILITY",
                SignalTag::VolatilityExpansion,
                c.atr_extreme_weight,
            ))
        } else if atr >= c.atr_high_pct {
            Some(RuleHit::new(
                "ATR_HIGH_VOLATILITY",
                SignalTag::VolatilityExpansion,
                c.atr_high_weight,
            ))
        } else {
            None
        }
    }

    fn check_obv(&self, snapshot: &IndicatorSnapshot) -> Option<RuleHit> {
        let z = snapshot.obv_z_score.value()?;
        let c = &self.config;
        let accumulating = z > 0.0;
        let tag = if accumulating {
            SignalTag::VolumeAccumulation
        } else {
            SignalTag::VolumeDistribution
        };

        if z.abs() >= c.obv_extreme_z {
            let name = if accumulating {
                "OBV_EXTREME_ACCUMULATION"
            } else {
                "OBV_EXTREME_DISTRIBUTION"
            };
            Some(RuleHit::new(name, tag, c.obv_extreme_weight))
        } else if z.abs() >= c.obv_z {
            let name = if accumulating {
                "OBV_ACCUMULATION"
            } else {
                "OBV_DISTRIBUTION"
            };
            Some(RuleHit::new(name, tag, c.obv_weight))
        } else {
            None
        }
    }
}

/// Evaluate a snapshot with the default rule set
pub fn apply_confluence_filter(snapshot: &IndicatorSnapshot) -> FilterResult {
    ConfluenceFilter::default().evaluate(snapshot)
}
