//! Core types used throughout AlertGate
//!
//! Defines directions, horizons, risk tiers and signal tags shared by the
//! real-time gate and the backtest engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

impl Direction {
    /// Parse from string (accepts BUY/LONG/UP, SELL/SHORT/DOWN, NEUTRAL/HOLD)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "LONG" | "UP" => Some(Direction::Buy),
            "SELL" | "SHORT" | "DOWN" => Some(Direction::Sell),
            "NEUTRAL" | "HOLD" => Some(Direction::Neutral),
            _ => None,
        }
    }

    /// Signed forward return of a move from `entry` to `exit`.
    ///
    /// BUY profits when price rises, SELL when it falls. NEUTRAL carries no
    /// directional bet, so it measures the magnitude of the move instead.
    /// A non-positive entry price yields 0.0.
    pub fn forward_return(&self, entry: f64, exit: f64) -> f64 {
        if entry <= 0.0 || !entry.is_finite() || !exit.is_finite() {
            return 0.0;
        }
        match self {
            Direction::Buy => (exit - entry) / entry,
            Direction::Sell => (entry - exit) / entry,
            Direction::Neutral => (exit - entry).abs() / entry,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Forward-return horizons measured by the backtest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "24h")]
    Hour24,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::Hour1, Timeframe::Hour4, Timeframe::Hour24];

    /// Offset from the signal timestamp to the exit bar
    pub fn offset(&self) -> chrono::Duration {
        match self {
            Timeframe::Hour1 => chrono::Duration::hours(1),
            Timeframe::Hour4 => chrono::Duration::hours(4),
            Timeframe::Hour24 => chrono::Duration::hours(24),
        }
    }

    /// Maximum distance between the target time and an acceptable exit bar
    pub fn tolerance(&self) -> chrono::Duration {
        match self {
            Timeframe::Hour1 => chrono::Duration::minutes(30),
            Timeframe::Hour4 => chrono::Duration::hours(1),
            Timeframe::Hour24 => chrono::Duration::hours(2),
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1h" | "1hour" => Some(Timeframe::Hour1),
            "4h" | "4hour" => Some(Timeframe::Hour4),
            "24h" | "1d" | "24hour" => Some(Timeframe::Hour24),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Hour1 => write!(f, "1h"),
            Timeframe::Hour4 => write!(f, "4h"),
            Timeframe::Hour24 => write!(f, "24h"),
        }
    }
}

/// Direction reported alongside ADX (ADX itself is direction-less)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdxDirection {
    Up,
    Down,
    Neutral,
}

impl AdxDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "UP" | "BULLISH" => Some(AdxDirection::Up),
            "DOWN" | "BEARISH" => Some(AdxDirection::Down),
            "NEUTRAL" | "FLAT" => Some(AdxDirection::Neutral),
            _ => None,
        }
    }
}

/// Risk tier assigned by the confluence filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// HIGH at >= 0.5, MEDIUM at >= 0.3, LOW otherwise
    pub fn from_score(score: f64) -> Self {
        if score >= 0.5 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Conviction bucket derived from a confidence scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStrength {
    High,
    Medium,
    Low,
    Weak,
}

impl SignalStrength {
    /// HIGH >= 0.8, MEDIUM >= 0.6, LOW >= 0.4, WEAK otherwise (including NaN)
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            SignalStrength::High
        } else if confidence >= 0.6 {
            SignalStrength::Medium
        } else if confidence >= 0.4 {
            SignalStrength::Low
        } else {
            SignalStrength::Weak
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStrength::High => write!(f, "HIGH"),
            SignalStrength::Medium => write!(f, "MEDIUM"),
            SignalStrength::Low => write!(f, "LOW"),
            SignalStrength::Weak => write!(f, "WEAK"),
        }
    }
}

/// Coarse semantic tag attached to a fired confluence rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalTag {
    Oversold,
    Overbought,
    MeanReversion,
    TrendUp,
    TrendDown,
    Trending,
    VolatilityExpansion,
    VolumeAccumulation,
    VolumeDistribution,
}

impl fmt::Display for SignalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalTag::Oversold => write!(f, "OVERSOLD"),
            SignalTag::Overbought => write!(f, "OVERBOUGHT"),
            SignalTag::MeanReversion => write!(f, "MEAN_REVERSION"),
            SignalTag::TrendUp => write!(f, "TREND_UP"),
            SignalTag::TrendDown => write!(f, "TREND_DOWN"),
            SignalTag::Trending => write!(f, "TRENDING"),
            SignalTag::VolatilityExpansion => write!(f, "VOLATILITY_EXPANSION"),
            SignalTag::VolumeAccumulation => write!(f, "VOLUME_ACCUMULATION"),
            SignalTag::VolumeDistribution => write!(f, "VOLUME_DISTRIBUTION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_return_by_direction() {
        assert!((Direction::Buy.forward_return(100.0, 110.0) - 0.10).abs() < 1e-12);
        assert!((Direction::Sell.forward_return(100.0, 110.0) + 0.10).abs() < 1e-12);
        assert!((Direction::Neutral.forward_return(100.0, 90.0) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_zero_entry_price_yields_zero_return() {
        assert_eq!(Direction::Buy.forward_return(0.0, 110.0), 0.0);
        assert_eq!(Direction::Sell.forward_return(0.0, 110.0), 0.0);
    }

    #[test]
    fn test_timeframe_parse_and_display() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::parse(&tf.to_string()), Some(tf));
        }
        assert_eq!(Timeframe::parse("15m"), None);
    }

    #[test]
    fn test_risk_level_cutoffs() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(1.7), RiskLevel::High);
    }

    #[test]
    fn test_signal_strength_buckets() {
        assert_eq!(SignalStrength::from_confidence(0.8), SignalStrength::High);
        assert_eq!(SignalStrength::from_confidence(0.79), SignalStrength::Medium);
        assert_eq!(SignalStrength::from_confidence(0.4), SignalStrength::Low);
        assert_eq!(SignalStrength::from_confidence(0.1), SignalStrength::Weak);
        assert_eq!(SignalStrength::from_confidence(f64::NAN), SignalStrength::Weak);
    }
}
