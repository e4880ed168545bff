//! Persistence boundary
//!
//! The quantitative core only reads history. These traits describe the stores
//! it consumes; `CsvStore` is the file-backed implementation used by the job
//! binary and by integration tests.

mod csv_store;

pub use csv_store::{CsvStore, PriceRecord, SignalRecord};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// A previously emitted signal as stored by the alert pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSignal {
    pub id: String,
    pub asset: String,
    pub direction: Direction,
    pub confidence: f64,
    pub signal_type: String,
    pub timestamp: DateTime<Utc>,
}

/// A single price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Historical signal store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// All signals with `timestamp >= cutoff`
    async fn signals_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PersistedSignal>>;
}

/// Historical price source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Bar closest to `target`, or `None` if nothing lies within `tolerance`
    async fn closest_bar(
        &self,
        asset: &str,
        target: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<Option<PriceBar>>;
}

/// Lookup of the most recent emitted signal per asset
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LastSignalLookup: Send + Sync {
    async fn last_signal_time(&self, asset: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Pick the bar closest to `target` within `tolerance` (inclusive).
///
/// `bars` must be sorted by timestamp. On an exact tie the earlier bar wins.
pub fn closest_within(
    bars: &[PriceBar],
    target: DateTime<Utc>,
    tolerance: Duration,
) -> Option<PriceBar> {
    let idx = bars.partition_point(|b| b.timestamp < target);
    let before = idx.checked_sub(1).and_then(|i| bars.get(i));
    let after = bars.get(idx);

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if (target - b.timestamp) <= (a.timestamp - target) {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };

    if (best.timestamp - target).abs() <= tolerance {
        Some(*best)
    } else {
        None
    }
}
