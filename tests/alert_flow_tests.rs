//! Alert cycle tests: raw indicators through filter, cooldown and delivery

#[cfg(test)]
mod tests {
    use alertgate::filters::{
        apply_confluence_filter, ConfluenceFilter, CooldownCalculator, CooldownConfig,
        CooldownGate, FilterConfig, FilterResult,
    };
    use alertgate::indicators::IndicatorSnapshot;
    use alertgate::persistence::{CsvStore, SignalStore};
    use alertgate::pipeline::{AlertPipeline, CycleOutcome, SignalCandidate, SignalReasoner};
    use alertgate::types::{Direction, RiskLevel, SignalTag};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Buys whenever the filter saw oversold conditions
    struct OversoldReasoner;

    #[async_trait]
    impl SignalReasoner for OversoldReasoner {
        async fn propose(
            &self,
            _asset: &str,
            _snapshot: &IndicatorSnapshot,
            filter: &FilterResult,
        ) -> Result<Option<SignalCandidate>> {
            if !filter.signal_candidates.contains(&SignalTag::Oversold) {
                return Ok(None);
            }
            Ok(Some(SignalCandidate {
                direction: Direction::Buy,
                confidence: 0.82,
                signal_type: "oversold_bounce".to_string(),
                rationale: filter.triggered_indicators.join(", "),
            }))
        }
    }

    fn temp_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "alertgate_flow_{}_{}_{}",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_filter_on_raw_payload() {
        let payload = json!({
            "rsi": "15",
            "vwapDeviationPct": 5.0,
            "percentB": 0.1,
            "adx": null,
            "atrPct": "n/a"
        });
        let snapshot = IndicatorSnapshot::from_json(&payload).unwrap();
        let result = apply_confluence_filter(&snapshot);

        assert!(result
            .triggered_indicators
            .contains(&"RSI_CRITICAL_OVERSOLD".to_string()));
        assert!(result
            .triggered_indicators
            .iter()
            .any(|name| name.starts_with("VWAP_")));
        assert!(result.confluence_score > 0.2);
        assert!(result.should_proceed);
        assert!(matches!(result.risk_level, RiskLevel::Medium | RiskLevel::High));
    }

    #[test]
    fn test_cooldown_floor_on_fast_market() {
        let payload = json!({ "atrPct": 8, "adx": 35, "rsi": 75 });
        let snapshot = IndicatorSnapshot::from_json(&payload).unwrap();
        assert_eq!(
            CooldownCalculator::default().compute_cooldown(&snapshot, 0.9),
            15
        );
    }

    #[tokio::test]
    async fn test_second_alert_is_cooled_down() {
        let dir = temp_data_dir("cycle");
        let store = Arc::new(CsvStore::new(&dir).unwrap());
        let pipeline = AlertPipeline::new(
            ConfluenceFilter::new(FilterConfig::default()),
            Arc::new(OversoldReasoner),
            CooldownGate::new(
                CooldownCalculator::new(CooldownConfig::default()),
                store.clone(),
            ),
            store.clone(),
        );

        let snapshot = IndicatorSnapshot::from_json(&json!({
            "rsi": 17.5,
            "percentB": -0.1,
            "obvZScore": 3.4
        }))
        .unwrap();
        let first_at: DateTime<Utc> = Utc::now() - Duration::minutes(20);

        let first = pipeline.run_cycle("SOL", snapshot, first_at).await.unwrap();
        assert!(matches!(first, CycleOutcome::Emitted(_)));

        let second = pipeline
            .run_cycle("SOL", snapshot, first_at + Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(second, CycleOutcome::CooledDown { .. }));

        // Another asset is unaffected
        let other = pipeline
            .run_cycle("ETH", snapshot, first_at + Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(other, CycleOutcome::Emitted(_)));

        let persisted = store
            .signals_since(first_at - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(persisted.len(), 2);
        assert!(persisted.iter().all(|s| s.signal_type == "oversold_bounce"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
