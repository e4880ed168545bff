//! Indicator snapshot
//!
//! Six technical readings for one asset at one point in time. Every value goes
//! through [`Reading`] so downstream rules only ever see `value | absent`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::AdxDirection;

/// A single optional indicator value.
///
/// Non-finite numbers and unparseable inputs are absent. Absence means a rule
/// does not fire; it is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading(Option<f64>);

impl Reading {
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(Some(value))
        } else {
            Self(None)
        }
    }

    pub fn absent() -> Self {
        Self(None)
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// Value or the supplied neutral default
    pub fn or(&self, default: f64) -> f64 {
        self.0.unwrap_or(default)
    }

    /// Parse a loosely-typed JSON value (number, numeric string, or null)
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(Self::new).unwrap_or_default(),
            Value::String(s) => s
                .trim()
                .trim_end_matches('%')
                .parse::<f64>()
                .map(Self::new)
                .unwrap_or_default(),
            _ => Self::absent(),
        }
    }
}

impl From<f64> for Reading {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Option<f64>> for Reading {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::new).unwrap_or_default()
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().map(Reading::parse).unwrap_or_default())
    }
}

/// Raw indicator payload as produced by the upstream analysis step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndicators {
    #[serde(default)]
    rsi: Reading,
    #[serde(default, alias = "vwap_deviation_pct", alias = "vwapDeviation")]
    vwap_deviation_pct: Reading,
    #[serde(default, alias = "percent_b", alias = "bbPercentB")]
    percent_b: Reading,
    #[serde(default)]
    adx: Reading,
    #[serde(default, alias = "adx_direction")]
    adx_direction: Option<Value>,
    #[serde(default, alias = "atr_pct")]
    atr_pct: Reading,
    #[serde(default, alias = "obv_zscore", alias = "obvZscore")]
    obv_z_score: Reading,
}

impl From<RawIndicators> for IndicatorSnapshot {
    fn from(raw: RawIndicators) -> Self {
        let adx_direction = match raw.adx_direction {
            Some(Value::String(s)) => AdxDirection::parse(&s),
            _ => None,
        };
        Self {
            rsi: raw.rsi,
            vwap_deviation_pct: raw.vwap_deviation_pct,
            percent_b: raw.percent_b,
            adx: raw.adx,
            adx_direction,
            atr_pct: raw.atr_pct,
            obv_z_score: raw.obv_z_score,
        }
    }
}

/// Immutable technical readings for one asset per analysis cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawIndicators", rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    /// Relative Strength Index [0, 100]
    pub rsi: Reading,
    /// Distance of price from VWAP in percent
    pub vwap_deviation_pct: Reading,
    /// Bollinger %B (0 = lower band, 1 = upper band)
    pub percent_b: Reading,
    /// Trend strength magnitude
    pub adx: Reading,
    pub adx_direction: Option<AdxDirection>,
    /// ATR as a percent of price
    pub atr_pct: Reading,
    /// Standardised on-balance-volume deviation
    pub obv_z_score: Reading,
}

impl IndicatorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rsi(mut self, value: f64) -> Self {
        self.rsi = Reading::new(value);
        self
    }

    pub fn with_vwap_deviation(mut self, pct: f64) -> Self {
        self.vwap_deviation_pct = Reading::new(pct);
        self
    }

    pub fn with_percent_b(mut self, value: f64) -> Self {
        self.percent_b = Reading::new(value);
        self
    }

    pub fn with_adx(mut self, value: f64, direction: AdxDirection) -> Self {
        self.adx = Reading::new(value);
        self.adx_direction = Some(direction);
        self
    }

    pub fn with_atr_pct(mut self, pct: f64) -> Self {
        self.atr_pct = Reading::new(pct);
        self
    }

    pub fn with_obv_z_score(mut self, z: f64) -> Self {
        self.obv_z_score = Reading::new(z);
        self
    }

    /// Parse from a loosely-typed JSON object
    pub fn from_json(value: &Value) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Number of readings that are present
    pub fn present_count(&self) -> usize {
        [
            self.rsi,
            self.vwap_deviation_pct,
            self.percent_b,
            self.adx,
            self.atr_pct,
            self.obv_z_score,
        ]
        .iter()
        .filter(|r| r.is_present())
        .count()
    }
}
