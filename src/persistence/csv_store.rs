//! CSV-backed signal and price store
//!
//! Daily files under `<data_dir>/signals/signals_YYYY-MM-DD.csv` and
//! `<data_dir>/prices/prices_YYYY-MM-DD.csv`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::{closest_within, LastSignalLookup, PersistedSignal, PriceBar, PriceHistory, SignalStore};
use crate::pipeline::AlertSink;
use crate::types::Direction;

/// Signal record for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub id: String,
    pub asset: String,
    pub direction: String,
    pub confidence: f64,
    pub signal_type: String,
}

/// Price record for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub asset: String,
    pub price: f64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl From<&PersistedSignal> for SignalRecord {
    fn from(signal: &PersistedSignal) -> Self {
        Self {
            timestamp: signal.timestamp.timestamp_millis(),
            id: signal.id.clone(),
            asset: signal.asset.clone(),
            direction: signal.direction.to_string(),
            confidence: signal.confidence,
            signal_type: signal.signal_type.clone(),
        }
    }
}

impl SignalRecord {
    fn into_signal(self) -> Option<PersistedSignal> {
        let direction = Direction::parse(&self.direction)?;
        let timestamp = Utc.timestamp_millis_opt(self.timestamp).single()?;
        Some(PersistedSignal {
            id: self.id,
            asset: self.asset,
            direction,
            confidence: self.confidence,
            signal_type: self.signal_type,
            timestamp,
        })
    }
}

/// File-backed store implementing every history trait
pub struct CsvStore {
    data_dir: PathBuf,
    /// Sorted price bars per asset, loaded lazily
    price_cache: RwLock<HashMap<String, Arc<Vec<PriceBar>>>>,
    write_lock: AsyncMutex<()>,
}

impl CsvStore {
    /// Open (and create if needed) a store rooted at `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join("signals")).context("Failed to create signals directory")?;
        fs::create_dir_all(data_dir.join("prices")).context("Failed to create prices directory")?;

        Ok(Self {
            data_dir,
            price_cache: RwLock::new(HashMap::new()),
            write_lock: AsyncMutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
        let file_has_data =
            path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context("Failed to open CSV file")?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    fn daily_file(&self, kind: &str, ts_ms: i64) -> Result<PathBuf> {
        let date = Utc
            .timestamp_millis_opt(ts_ms)
            .single()
            .context("Timestamp out of range")?
            .format("%Y-%m-%d");
        Ok(self.data_dir.join(kind).join(format!("{}_{}.csv", kind, date)))
    }

    /// Append a signal to its daily file
    pub async fn append_signal(&self, record: SignalRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.daily_file("signals", record.timestamp)?;
        let mut writer = Self::create_writer(&path)?;
        writer
            .serialize(&record)
            .context("Failed to write signal record")?;
        writer.flush().context("Failed to flush signal writer")?;
        Ok(())
    }

    /// Append a price to its daily file
    pub async fn append_price(&self, record: PriceRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.daily_file("prices", record.timestamp)?;
        let mut writer = Self::create_writer(&path)?;
        writer
            .serialize(&record)
            .context("Failed to write price record")?;
        writer.flush().context("Failed to flush price writer")?;

        if let Ok(mut cache) = self.price_cache.write() {
            cache.remove(&record.asset.to_uppercase());
        }
        Ok(())
    }

    /// Daily files of one kind dated on or after `since`, oldest first
    fn daily_files(&self, kind: &str, since: Option<NaiveDate>) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let dir = self.data_dir.join(kind);
        let prefix = format!("{}_", kind);
        let mut files = Vec::new();

        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))? {
            let path = entry?.path();
            let date = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(&prefix))
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

            if let Some(date) = date {
                if since.map_or(true, |d| date >= d) {
                    files.push((date, path));
                }
            }
        }

        files.sort_by_key(|(date, _)| *date);
        Ok(files)
    }

    /// Load signal records from files dated on or after `since`
    pub fn load_signal_history(&self, since: Option<NaiveDate>) -> Result<Vec<SignalRecord>> {
        let mut records = Vec::new();

        for (_, path) in self.daily_files("signals", since)? {
            let file = fs::File::open(&path).context("Failed to open signal file")?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

            for result in reader.deserialize() {
                let record: SignalRecord = result.context("Failed to deserialize signal record")?;
                records.push(record);
            }
        }

        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Load all price records for an asset
    pub fn load_price_history(&self, asset: &str) -> Result<Vec<PriceRecord>> {
        let mut records = Vec::new();

        for (_, path) in self.daily_files("prices", None)? {
            let file = fs::File::open(&path).context("Failed to open price file")?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

            for result in reader.deserialize() {
                let record: PriceRecord = result.context("Failed to deserialize price record")?;
                if record.asset.eq_ignore_ascii_case(asset) {
                    records.push(record);
                }
            }
        }

        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    fn price_bars(&self, asset: &str) -> Result<Arc<Vec<PriceBar>>> {
        let key = asset.to_uppercase();
        if let Some(bars) = self.price_cache.read().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(bars);
        }

        let bars: Vec<PriceBar> = self
            .load_price_history(asset)?
            .into_iter()
            .filter(|r| r.price.is_finite())
            .filter_map(|r| {
                Utc.timestamp_millis_opt(r.timestamp)
                    .single()
                    .map(|timestamp| PriceBar {
                        price: r.price,
                        timestamp,
                    })
            })
            .collect();
        debug!(asset = %asset, bars = bars.len(), "Loaded price history");

        let bars = Arc::new(bars);
        if let Ok(mut cache) = self.price_cache.write() {
            cache.insert(key, bars.clone());
        }
        Ok(bars)
    }
}

#[async_trait]
impl SignalStore for CsvStore {
    async fn signals_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PersistedSignal>> {
        let cutoff_ms = cutoff.timestamp_millis();
        let records = self.load_signal_history(Some(cutoff.date_naive()))?;

        Ok(records
            .into_iter()
            .filter(|r| r.timestamp >= cutoff_ms)
            .filter_map(|r| {
                let id = r.id.clone();
                let signal = r.into_signal();
                if signal.is_none() {
                    warn!(signal_id = %id, "Skipping signal row with unknown direction or timestamp");
                }
                signal
            })
            .collect())
    }
}

#[async_trait]
impl PriceHistory for CsvStore {
    async fn closest_bar(
        &self,
        asset: &str,
        target: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<Option<PriceBar>> {
        let bars = self.price_bars(asset)?;
        Ok(closest_within(&bars, target, tolerance))
    }
}

#[async_trait]
impl AlertSink for CsvStore {
    async fn emit(&self, alert: &PersistedSignal) -> Result<()> {
        self.append_signal(SignalRecord::from(alert)).await
    }
}

#[async_trait]
impl LastSignalLookup for CsvStore {
    async fn last_signal_time(&self, asset: &str) -> Result<Option<DateTime<Utc>>> {
        // Newest files first; the first file with a match holds the answer
        for (_, path) in self.daily_files("signals", None)?.into_iter().rev() {
            let file = fs::File::open(&path).context("Failed to open signal file")?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

            let mut newest: Option<i64> = None;
            for result in reader.deserialize() {
                let record: SignalRecord = result.context("Failed to deserialize signal record")?;
                if record.asset.eq_ignore_ascii_case(asset) {
                    newest = Some(newest.map_or(record.timestamp, |n| n.max(record.timestamp)));
                }
            }

            if let Some(ts) = newest {
                return Ok(Utc.timestamp_millis_opt(ts).single());
            }
        }
        Ok(None)
    }
}
