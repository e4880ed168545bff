//! Metrics cache with an explicit TTL
//!
//! Owned by the caller and handed to the engine; entries older than the TTL
//! are evicted when read.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::BacktestMetrics;
use crate::types::Timeframe;

type CacheKey = (String, Timeframe);

pub struct MetricsCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, (BacktestMetrics, DateTime<Utc>)>>,
}

impl MetricsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached metrics for a signal type, if still fresh at `now`
    pub fn get(&self, signal_type: &str, timeframe: Timeframe, now: DateTime<Utc>) -> Option<BacktestMetrics> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let key = (signal_type.to_string(), timeframe);

        let expired = match entries.get(&key) {
            Some((_, stored_at)) => now - *stored_at >= self.ttl,
            None => return None,
        };
        if expired {
            entries.remove(&key);
            return None;
        }
        entries.get(&key).map(|(metrics, _)| metrics.clone())
    }

    pub fn insert(
        &self,
        signal_type: &str,
        timeframe: Timeframe,
        metrics: BacktestMetrics,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert((signal_type.to_string(), timeframe), (metrics, now));
    }

    /// Every fresh entry for `timeframe`; expired entries are evicted
    pub fn fresh_entries(&self, timeframe: Timeframe, now: DateTime<Utc>) -> Vec<(String, BacktestMetrics)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, (_, stored_at)| now - *stored_at < ttl);
        entries
            .iter()
            .filter(|((_, tf), _)| *tf == timeframe)
            .map(|((signal_type, _), (metrics, _))| (signal_type.clone(), metrics.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entries_expire_on_read() {
        let cache = MetricsCache::new(Duration::minutes(10));
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let metrics = BacktestMetrics {
            win_rate: 0.6,
            sample_size: 40,
            ..BacktestMetrics::default()
        };

        cache.insert("breakout", Timeframe::Hour4, metrics.clone(), t0);
        assert_eq!(
            cache.get("breakout", Timeframe::Hour4, t0 + Duration::minutes(9)),
            Some(metrics)
        );
        assert_eq!(cache.get("breakout", Timeframe::Hour1, t0), None);

        assert_eq!(
            cache.get("breakout", Timeframe::Hour4, t0 + Duration::minutes(10)),
            None
        );
        assert!(cache.is_empty());
    }
}
