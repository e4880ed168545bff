//! Backtest engine tests against in-memory and CSV-backed stores

#[cfg(test)]
mod tests {
    use alertgate::backtesting::{
        BacktestConfig, BacktestEngine, BacktestError, BacktestReport, MetricsCache,
        ThresholdSearch,
    };
    use alertgate::persistence::{
        closest_within, CsvStore, PersistedSignal, PriceBar, PriceHistory, PriceRecord,
        SignalRecord, SignalStore,
    };
    use alertgate::run_backtest;
    use alertgate::types::{Direction, Timeframe};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // ============================================================================
    // In-memory store
    // ============================================================================

    #[derive(Default)]
    struct MemoryStore {
        signals: Vec<PersistedSignal>,
        bars: HashMap<String, Vec<PriceBar>>,
        listings: AtomicUsize,
    }

    impl MemoryStore {
        fn add_signal(&mut self, signal: PersistedSignal, entry: f64, exit: f64) {
            let bars = self.bars.entry(signal.asset.clone()).or_default();
            bars.push(PriceBar {
                price: entry,
                timestamp: signal.timestamp,
            });
            for tf in Timeframe::ALL {
                bars.push(PriceBar {
                    price: exit,
                    timestamp: signal.timestamp + tf.offset(),
                });
            }
            bars.sort_by_key(|b| b.timestamp);
            self.signals.push(signal);
        }
    }

    #[async_trait]
    impl SignalStore for MemoryStore {
        async fn signals_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PersistedSignal>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .signals
                .iter()
                .filter(|s| s.timestamp >= cutoff)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl PriceHistory for MemoryStore {
        async fn closest_bar(
            &self,
            asset: &str,
            target: DateTime<Utc>,
            tolerance: Duration,
        ) -> Result<Option<PriceBar>> {
            Ok(self
                .bars
                .get(asset)
                .and_then(|bars| closest_within(bars, target, tolerance)))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000, 0).unwrap()
    }

    fn signal(i: usize, signal_type: &str, direction: Direction, confidence: f64) -> PersistedSignal {
        PersistedSignal {
            id: format!("sig-{}", i),
            asset: format!("ASSET{}", i),
            direction,
            confidence,
            signal_type: signal_type.to_string(),
            timestamp: t0() + Duration::hours(i as i64),
        }
    }

    /// 40 confident BUY bounces winning 75%, 40 hesitant SELL reversions winning 50%
    fn populated_store() -> MemoryStore {
        let mut store = MemoryStore::default();
        for i in 0..40 {
            let exit = if i % 4 == 0 { 98.0 } else { 103.0 };
            store.add_signal(signal(i, "oversold_bounce", Direction::Buy, 0.85), 100.0, exit);
        }
        for i in 40..80 {
            let exit = if i % 2 == 0 { 97.0 } else { 102.0 };
            store.add_signal(signal(i, "vwap_reversion", Direction::Sell, 0.55), 100.0, exit);
        }

        // Outside the lookback window
        let mut stale = signal(80, "oversold_bounce", Direction::Buy, 0.9);
        stale.timestamp = t0() - Duration::days(60);
        store.add_signal(stale, 100.0, 50.0);

        // No price history at all
        store.signals.push(signal(81, "oversold_bounce", Direction::Buy, 0.9));
        store
    }

    fn now() -> DateTime<Utc> {
        t0() + Duration::days(10)
    }

    // ============================================================================
    // Engine
    // ============================================================================

    #[tokio::test]
    async fn test_full_report() {
        let store = Arc::new(populated_store());
        let engine = BacktestEngine::new(store.clone(), store);
        let config = BacktestConfig::default();

        let report = engine.run_at(&config, now()).await.unwrap();

        assert_eq!(report.total_signals, 80);
        assert_eq!(report.generated_at, now());

        let overall = report.reference_metrics();
        assert_eq!(overall.sample_size, 80);
        assert!((overall.win_rate - 50.0 / 80.0).abs() < 1e-12);
        let (lo, hi) = overall.confidence_interval;
        assert!(lo <= overall.win_rate && overall.win_rate <= hi);

        for tf in Timeframe::ALL {
            assert_eq!(report.metrics_by_timeframe[&tf].sample_size, 80);
        }

        assert_eq!(report.by_signal_type.len(), 2);
        let bounce = report
            .by_signal_type
            .iter()
            .find(|b| b.signal_type == "oversold_bounce")
            .unwrap();
        assert_eq!(bounce.direction, Direction::Buy);
        assert!((bounce.metrics.win_rate - 0.75).abs() < 1e-12);

        match report.optimal_threshold {
            ThresholdSearch::TargetMet(r) => {
                assert_eq!(r.threshold, 0.85);
                assert_eq!(r.sample_size, 40);
            }
            other => panic!("expected a threshold meeting the target, got {:?}", other),
        }

        // 0.5-0.6 bucket holds the SELL signals: predicted 0.55, actual 0.5
        let low = &report.calibration[0];
        assert_eq!(low.sample_size, 40);
        assert!((low.calibration_error - 0.05).abs() < 1e-9);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("Use a minimum confidence of 85%")));
    }

    #[tokio::test]
    async fn test_timeframe_subset() {
        let store = Arc::new(populated_store());
        let engine = BacktestEngine::new(store.clone(), store);
        let config = BacktestConfig::default()
            .with_timeframe_names(&["1h", "24h"])
            .unwrap();

        let report = engine.run_at(&config, now()).await.unwrap();
        assert_eq!(report.metrics_by_timeframe.len(), 2);
        assert!(!report.metrics_by_timeframe.contains_key(&Timeframe::Hour4));
    }

    #[tokio::test]
    async fn test_empty_window_fails_loudly() {
        let store = Arc::new(populated_store());
        let engine = BacktestEngine::new(store.clone(), store);
        let config = BacktestConfig {
            lookback_days: 1,
            ..BacktestConfig::default()
        };

        let result = engine.run_at(&config, now() + Duration::days(30)).await;
        assert!(matches!(result, Err(BacktestError::NoSignals { lookback_days: 1 })));
    }

    #[tokio::test]
    async fn test_best_performing_served_from_cache() {
        let store = Arc::new(populated_store());
        let cache = Arc::new(MetricsCache::new(Duration::minutes(30)));
        let engine = BacktestEngine::new(store.clone(), store.clone()).with_cache(cache.clone());
        let config = BacktestConfig::default();

        engine.run_at(&config, now()).await.unwrap();
        assert_eq!(store.listings.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 2);

        let ranking = engine
            .best_performing_signal_types(&config, 5, now() + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(store.listings.load(Ordering::SeqCst), 1);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].signal_type, "oversold_bounce");
        assert_eq!(ranking[1].signal_type, "vwap_reversion");

        // Expired entries force a fresh collection
        let ranking = engine
            .best_performing_signal_types(&config, 1, now() + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(store.listings.load(Ordering::SeqCst), 2);
        assert_eq!(ranking.len(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let store = Arc::new(populated_store());
        let engine = BacktestEngine::new(store.clone(), store);
        let report =
            tokio_test::block_on(engine.run_at(&BacktestConfig::default(), now())).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_signals"], 80);
        assert_eq!(json["reference_timeframe"], "4h");
        assert!(json["metrics_by_timeframe"]["24h"].is_object());
        assert_eq!(json["optimal_threshold"]["status"], "target_met");

        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(yaml.contains("by_signal_type"));
    }

    #[tokio::test]
    async fn test_lossless_breakdown_reads_back_from_json() {
        let mut store = MemoryStore::default();
        for i in 0..30 {
            store.add_signal(signal(i, "trend_follow", Direction::Buy, 0.9), 100.0, 104.0);
        }
        let store = Arc::new(store);
        let engine = BacktestEngine::new(store.clone(), store);
        let report = engine.run_at(&BacktestConfig::default(), now()).await.unwrap();

        let breakdown = &report.by_signal_type[0];
        assert!(breakdown.metrics.risk_reward_ratio.is_infinite());

        let json = serde_json::to_string_pretty(&report).unwrap();
        let back: BacktestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.by_signal_type, report.by_signal_type);
        assert_eq!(
            back.reference_metrics().risk_reward_ratio,
            f64::INFINITY
        );
    }

    // ============================================================================
    // CSV store end to end
    // ============================================================================

    fn temp_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "alertgate_it_{}_{}_{}",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_csv_store_end_to_end() {
        let dir = temp_data_dir("e2e");
        let store = Arc::new(CsvStore::new(&dir).unwrap());
        let start = Utc::now() - Duration::days(3);

        for i in 0..12i64 {
            let ts = start + Duration::hours(i * 2);
            let asset = format!("COIN{}", i);
            let exit = if i % 3 == 0 { 99.0 } else { 101.5 };

            store
                .append_signal(SignalRecord {
                    timestamp: ts.timestamp_millis(),
                    id: format!("csv-{}", i),
                    asset: asset.clone(),
                    direction: "BUY".to_string(),
                    confidence: 0.72,
                    signal_type: "breakout".to_string(),
                })
                .await
                .unwrap();

            let mut bars = vec![(ts + Duration::minutes(2), 100.0)];
            for tf in Timeframe::ALL {
                bars.push((ts + tf.offset() - Duration::minutes(10), exit));
            }
            for (bar_ts, price) in bars {
                store
                    .append_price(PriceRecord {
                        timestamp: bar_ts.timestamp_millis(),
                        asset: asset.clone(),
                        price,
                        source: Some("test".to_string()),
                        volume: None,
                    })
                    .await
                    .unwrap();
            }
        }

        let config = BacktestConfig {
            lookback_days: 7,
            min_sample_size: 5,
            ..BacktestConfig::default()
        };
        let report = run_backtest(store.clone(), store.clone(), &config)
            .await
            .unwrap();

        assert_eq!(report.total_signals, 12);
        let m = report.reference_metrics();
        assert_eq!(m.sample_size, 12);
        assert!((m.win_rate - 8.0 / 12.0).abs() < 1e-12);
        assert_eq!(report.by_signal_type.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
