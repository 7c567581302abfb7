// =============================================================================
// Candle store — one gzip parquet table per (symbol, timeframe) key
// =============================================================================
//
// Saves go through a tmp sibling + rename so a crash mid-write never leaves
// a truncated table behind. A sidecar `.lock` file carries an exclusive
// advisory lock; the guard releases it on drop, on every exit path.
// =============================================================================

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, TimestampMillisecondArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use fs2::FileExt;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};

use crate::candles::series::{Candle, CandleSeries};
use crate::types::ms_to_utc;

/// Exclusive advisory lock on one cache key. Held for the duration of an
/// `ensure_range` call; dropping it releases the lock.
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Filesystem-backed candle table storage.
pub struct CandleStore {
    dir: PathBuf,
}

impl CandleStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create candle store directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Table path for a key: `{dir}/{symbol_lower}_{timeframe_lower}.parquet`.
    pub fn path_for(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.parquet",
            symbol.to_lowercase(),
            timeframe.to_lowercase()
        ))
    }

    pub fn exists(&self, symbol: &str, timeframe: &str) -> bool {
        self.path_for(symbol, timeframe).is_file()
    }

    /// Take the exclusive lock for a key, blocking until it is free.
    pub fn lock(&self, symbol: &str, timeframe: &str) -> Result<StoreLock> {
        let path = self.path_for(symbol, timeframe).with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", path.display()))?;
        debug!(path = %path.display(), "store lock acquired");
        Ok(StoreLock { file })
    }

    /// Load the full table for a key.
    pub fn load(&self, symbol: &str, timeframe: &str) -> Result<CandleSeries> {
        let path = self.path_for(symbol, timeframe);
        let file = File::open(&path)
            .with_context(|| format!("failed to open candle table {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("failed to read parquet metadata from {}", path.display()))?
            .build()
            .context("failed to build parquet reader")?;

        let mut candles = Vec::new();
        for batch in reader {
            let batch = batch.context("failed to decode parquet batch")?;
            decode_batch(&batch, &mut candles)?;
        }

        debug!(path = %path.display(), rows = candles.len(), "candle table loaded");
        CandleSeries::new(candles)
            .with_context(|| format!("candle table {} violates ordering", path.display()))
    }

    /// Persist the table for a key atomically (tmp sibling + rename).
    pub fn save(&self, symbol: &str, timeframe: &str, series: &CandleSeries) -> Result<()> {
        let path = self.path_for(symbol, timeframe);
        let tmp = path.with_extension("parquet.tmp");

        let batch = encode_batch(series)?;
        let file = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::GZIP(GzipLevel::default()))
            .build();
        let mut writer = ArrowWriter::try_new(file, schema(), Some(props))
            .context("failed to open parquet writer")?;
        writer.write(&batch).context("failed to write parquet batch")?;
        writer.close().context("failed to finalize parquet file")?;

        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move {} into place", tmp.display()))?;

        info!(path = %path.display(), rows = series.len(), "candle table saved");
        Ok(())
    }
}

impl std::fmt::Debug for CandleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleStore").field("dir", &self.dir).finish()
    }
}

fn schema() -> Arc<Schema> {
    let ts = DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()));
    Arc::new(Schema::new(vec![
        Field::new("open_time", ts.clone(), false),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("close_time", ts, false),
        Field::new("quote_volume", DataType::Float64, false),
        Field::new("trades", DataType::UInt64, false),
        Field::new("taker_buy_volume", DataType::Float64, false),
        Field::new("taker_buy_quote_volume", DataType::Float64, false),
    ]))
}

fn encode_batch(series: &CandleSeries) -> Result<RecordBatch> {
    let candles = series.candles();

    let open_time: Vec<i64> = candles.iter().map(|c| c.open_time.timestamp_millis()).collect();
    let close_time: Vec<i64> = candles.iter().map(|c| c.close_time.timestamp_millis()).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMillisecondArray::from(open_time).with_timezone("UTC")),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.open))),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.high))),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.low))),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.close))),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.volume))),
        Arc::new(TimestampMillisecondArray::from(close_time).with_timezone("UTC")),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.quote_volume))),
        Arc::new(UInt64Array::from_iter_values(candles.iter().map(|c| c.trades))),
        Arc::new(Float64Array::from_iter_values(candles.iter().map(|c| c.taker_buy_volume))),
        Arc::new(Float64Array::from_iter_values(
            candles.iter().map(|c| c.taker_buy_quote_volume),
        )),
    ];

    RecordBatch::try_new(schema(), columns).context("failed to assemble record batch")
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<Candle>) -> Result<()> {
    let open_time = timestamp_column(batch, 0, "open_time")?;
    let open = f64_column(batch, 1, "open")?;
    let high = f64_column(batch, 2, "high")?;
    let low = f64_column(batch, 3, "low")?;
    let close = f64_column(batch, 4, "close")?;
    let volume = f64_column(batch, 5, "volume")?;
    let close_time = timestamp_column(batch, 6, "close_time")?;
    let quote_volume = f64_column(batch, 7, "quote_volume")?;
    let trades = u64_column(batch, 8, "trades")?;
    let taker_buy_volume = f64_column(batch, 9, "taker_buy_volume")?;
    let taker_buy_quote_volume = f64_column(batch, 10, "taker_buy_quote_volume")?;

    out.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        out.push(Candle {
            open_time: ms_to_utc(open_time.value(i))?,
            open: open.value(i),
            high: high.value(i),
            low: low.value(i),
            close: close.value(i),
            volume: volume.value(i),
            close_time: ms_to_utc(close_time.value(i))?,
            quote_volume: quote_volume.value(i),
            trades: trades.value(i),
            taker_buy_volume: taker_buy_volume.value(i),
            taker_buy_quote_volume: taker_buy_quote_volume.value(i),
        });
    }
    Ok(())
}

fn f64_column<'a>(batch: &'a RecordBatch, idx: usize, name: &str) -> Result<&'a Float64Array> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Float64Array>()
        .with_context(|| format!("column {name} is not Float64"))
}

fn u64_column<'a>(batch: &'a RecordBatch, idx: usize, name: &str) -> Result<&'a UInt64Array> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .with_context(|| format!("column {name} is not UInt64"))
}

fn timestamp_column<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    name: &str,
) -> Result<&'a TimestampMillisecondArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .with_context(|| format!("column {name} is not a millisecond timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candles::series::test_support::minute_candles;

    #[test]
    fn path_is_lowercased_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        let path = store.path_for("BTCUSDT", "5M");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "btcusdt_5m.parquet"
        );
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        let series = CandleSeries::new(minute_candles(100, 160)).unwrap();

        assert!(!store.exists("BTCUSDT", "1m"));
        store.save("BTCUSDT", "1m", &series).unwrap();
        assert!(store.exists("BTCUSDT", "1m"));

        let loaded = store.load("BTCUSDT", "1m").unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn save_overwrites_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();

        let short = CandleSeries::new(minute_candles(0, 5)).unwrap();
        let long = CandleSeries::new(minute_candles(0, 20)).unwrap();
        store.save("ETHUSDT", "1m", &short).unwrap();
        store.save("ETHUSDT", "1m", &long).unwrap();

        assert_eq!(store.load("ETHUSDT", "1m").unwrap().len(), 21);
    }

    #[test]
    fn empty_table_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        store.save("XRPUSDT", "1h", &CandleSeries::empty()).unwrap();
        assert!(store.load("XRPUSDT", "1h").unwrap().is_empty());
    }

    #[test]
    fn lock_can_be_retaken_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        drop(store.lock("BTCUSDT", "1m").unwrap());
        // The previous guard released the lock on drop.
        let _second = store.lock("BTCUSDT", "1m").unwrap();
    }
}
