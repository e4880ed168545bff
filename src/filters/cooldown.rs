//! Adaptive cooldown
//!
//! Scales a base quiet period per asset by volatility, trend strength, RSI
//! extremity and signal conviction. The calculator is pure; the gate composes
//! it with the last-alert lookup and always fails open.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::indicators::IndicatorSnapshot;
use crate::persistence::LastSignalLookup;
use crate::types::SignalStrength;

pub const MIN_COOLDOWN_MINUTES: i64 = 15;
pub const MAX_COOLDOWN_MINUTES: i64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub base_minutes: f64,
    pub min_minutes: i64,
    pub max_minutes: i64,
    /// ATR% at which the volatility factor is 1.0
    pub reference_atr_pct: f64,
    pub min_volatility_factor: f64,
    pub max_volatility_factor: f64,
    pub strong_trend_adx: f64,
    pub strong_trend_factor: f64,
    pub weak_trend_factor: f64,
    pub rsi_lower: f64,
    pub rsi_upper: f64,
    pub rsi_extreme_factor: f64,
    pub high_strength_factor: f64,
    pub medium_strength_factor: f64,
    pub low_strength_factor: f64,
    pub weak_strength_factor: f64,
    // Neutral values substituted for missing readings
    pub default_atr_pct: f64,
    pub default_adx: f64,
    pub default_rsi: f64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            base_minutes: 30.0,
            min_minutes: MIN_COOLDOWN_MINUTES,
            max_minutes: MAX_COOLDOWN_MINUTES,
            reference_atr_pct: 2.0,
            min_volatility_factor: 0.5,
            max_volatility_factor: 2.0,
            strong_trend_adx: 25.0,
            strong_trend_factor: 0.7,
            weak_trend_factor: 1.3,
            rsi_lower: 30.0,
            rsi_upper: 70.0,
            rsi_extreme_factor: 0.8,
            high_strength_factor: 0.6,
            medium_strength_factor: 0.8,
            low_strength_factor: 1.0,
            weak_strength_factor: 1.2,
            default_atr_pct: 2.0,
            default_adx: 20.0,
            default_rsi: 50.0,
        }
    }
}

/// Outcome of a cooldown check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownDecision {
    pub skip: bool,
    pub cooldown_minutes: i64,
    /// Whole minutes left in the quiet period, rounded up; 0 when not skipping
    pub remaining_minutes: i64,
}

impl CooldownDecision {
    fn proceed(cooldown_minutes: i64) -> Self {
        Self {
            skip: false,
            cooldown_minutes,
            remaining_minutes: 0,
        }
    }
}

/// `true` iff strictly less than `cooldown_minutes` have elapsed since `last`
pub fn is_within_cooldown(last: DateTime<Utc>, now: DateTime<Utc>, cooldown_minutes: i64) -> bool {
    now - last < Duration::minutes(cooldown_minutes)
}

#[derive(Debug, Clone, Default)]
pub struct CooldownCalculator {
    config: CooldownConfig,
}

impl CooldownCalculator {
    pub fn new(config: CooldownConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    fn volatility_factor(&self, snapshot: &IndicatorSnapshot) -> f64 {
        let c = &self.config;
        let atr = snapshot
            .atr_pct
            .value()
            .filter(|v| *v > 0.0)
            .unwrap_or(c.default_atr_pct);
        let (lo, hi) = (
            c.min_volatility_factor.min(c.max_volatility_factor),
            c.max_volatility_factor.max(c.min_volatility_factor),
        );
        (c.reference_atr_pct / atr).clamp(lo, hi)
    }

    fn trend_factor(&self, snapshot: &IndicatorSnapshot) -> f64 {
        let c = &self.config;
        if snapshot.adx.or(c.default_adx) > c.strong_trend_adx {
            c.strong_trend_factor
        } else {
            c.weak_trend_factor
        }
    }

    fn rsi_factor(&self, snapshot: &IndicatorSnapshot) -> f64 {
        let c = &self.config;
        let rsi = snapshot.rsi.or(c.default_rsi);
        if rsi < c.rsi_lower || rsi > c.rsi_upper {
            c.rsi_extreme_factor
        } else {
            1.0
        }
    }

    fn strength_factor(&self, confidence: f64) -> f64 {
        let c = &self.config;
        match SignalStrength::from_confidence(confidence) {
            SignalStrength::High => c.high_strength_factor,
            SignalStrength::Medium => c.medium_strength_factor,
            SignalStrength::Low => c.low_strength_factor,
            SignalStrength::Weak => c.weak_strength_factor,
        }
    }

    /// Cooldown in whole minutes, always within `[min_minutes, max_minutes]`
    pub fn compute_cooldown(&self, snapshot: &IndicatorSnapshot, confidence: f64) -> i64 {
        let c = &self.config;
        let raw = c.base_minutes
            * self.volatility_factor(snapshot)
            * self.trend_factor(snapshot)
            * self.rsi_factor(snapshot)
            * self.strength_factor(confidence);

        let (lo, hi) = (c.min_minutes.min(c.max_minutes), c.max_minutes.max(c.min_minutes));
        if !raw.is_finite() {
            return hi;
        }
        (raw.round() as i64).clamp(lo, hi)
    }

    /// Full decision given the last emitted signal time
    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        confidence: f64,
        last_signal_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CooldownDecision {
        let cooldown_minutes = self.compute_cooldown(snapshot, confidence);

        // Never block the first signal
        let Some(last) = last_signal_time else {
            return CooldownDecision::proceed(cooldown_minutes);
        };

        if !is_within_cooldown(last, now, cooldown_minutes) {
            return CooldownDecision::proceed(cooldown_minutes);
        }

        let elapsed_secs = (now - last).num_seconds().max(0);
        let remaining_secs = (cooldown_minutes * 60 - elapsed_secs).max(0);
        CooldownDecision {
            skip: true,
            cooldown_minutes,
            remaining_minutes: (remaining_secs + 59) / 60,
        }
    }

    pub fn should_skip(
        &self,
        snapshot: &IndicatorSnapshot,
        confidence: f64,
        last_signal_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        self.evaluate(snapshot, confidence, last_signal_time, now).skip
    }
}

/// Cooldown check backed by the last-alert lookup
pub struct CooldownGate {
    calculator: CooldownCalculator,
    lookup: Arc<dyn LastSignalLookup>,
}

impl CooldownGate {
    pub fn new(calculator: CooldownCalculator, lookup: Arc<dyn LastSignalLookup>) -> Self {
        Self { calculator, lookup }
    }

    pub fn calculator(&self) -> &CooldownCalculator {
        &self.calculator
    }

    /// Decision for `asset` at `now`; a failed lookup proceeds
    pub async fn check_at(
        &self,
        asset: &str,
        snapshot: &IndicatorSnapshot,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> CooldownDecision {
        let last = match self.lookup.last_signal_time(asset).await {
            Ok(last) => last,
            Err(e) => {
                warn!(asset = %asset, error = %e, "Cooldown lookup failed, proceeding with signal");
                None
            }
        };

        let decision = self.calculator.evaluate(snapshot, confidence, last, now);
        if decision.skip {
            debug!(
                asset = %asset,
                cooldown_minutes = decision.cooldown_minutes,
                remaining_minutes = decision.remaining_minutes,
                "Signal suppressed by cooldown"
            );
        }
        decision
    }

    pub async fn should_skip_due_to_cooldown(
        &self,
        asset: &str,
        snapshot: &IndicatorSnapshot,
        confidence: f64,
    ) -> bool {
        self.check_at(asset, snapshot, confidence, Utc::now())
            .await
            .skip
    }
}
