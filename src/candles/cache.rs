// =============================================================================
// Candle cache — incremental range coverage over a persisted table
// =============================================================================
//
// `ensure_range` reconciles a requested time range against the cached table
// and fetches only the uncovered deltas. Remote fetches are inclusive of
// both endpoints, and each delta shares one endpoint with a candle already
// in the table; the shared boundary row is dropped before the merge so open
// times stay strictly increasing.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::candles::series::{Candle, CandleSeries};
use crate::candles::store::CandleStore;
use crate::market::MarketDataSource;
use crate::types::DateRange;

/// How a requested range relates to the cached data range.
///
/// The four variants are mutually exclusive; exact boundary equality always
/// classifies as `Covered` so repeating a request never refetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coverage {
    /// Requested data ends before or inside the table; fetch the gap from
    /// the requested start up to the table start.
    ExtendBackward,
    /// Requested data spills past both table edges; fetch both gaps.
    ExtendBoth,
    /// Requested data begins inside or after the table; fetch the gap from
    /// the table end up to the requested end.
    ExtendForward,
    /// The table already spans the request; nothing to fetch.
    Covered,
}

pub(crate) fn classify(requested: &DateRange, data: &DateRange) -> Coverage {
    if requested.end < data.start || (requested.start < data.start && requested.end <= data.end) {
        Coverage::ExtendBackward
    } else if requested.start < data.start && requested.end > data.end {
        Coverage::ExtendBoth
    } else if requested.start > data.end || requested.end > data.end {
        Coverage::ExtendForward
    } else {
        Coverage::Covered
    }
}

/// Incremental candle cache over one remote market-data source.
pub struct CandleCache<S: MarketDataSource> {
    source: S,
    store: CandleStore,
}

impl<S: MarketDataSource> CandleCache<S> {
    pub fn new(source: S, store: CandleStore) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    /// Make the cached table for `(symbol, timeframe)` cover at least
    /// `requested`, fetching only the uncovered portion, and return it.
    ///
    /// The table is re-persisted on every call, including when no fetch was
    /// needed. The per-key store lock is held for the whole call.
    pub fn ensure_range(
        &self,
        symbol: &str,
        timeframe: &str,
        requested: &DateRange,
    ) -> Result<CandleSeries> {
        let symbol = symbol.to_uppercase();
        let _guard = self.store.lock(&symbol, timeframe)?;

        let mut series = if self.store.exists(&symbol, timeframe) {
            self.store.load(&symbol, timeframe)?
        } else {
            CandleSeries::empty()
        };

        match series.data_range() {
            None => {
                // First request for this key (or an empty table on disk):
                // fetch the whole range.
                info!(
                    symbol = %symbol,
                    timeframe,
                    range = %requested,
                    "no cached candles, fetching full range"
                );
                let candles = self.fetch(&symbol, timeframe, requested.start, requested.end)?;
                series = CandleSeries::new(candles)?;
            }
            Some(data) => {
                debug!(
                    symbol = %symbol,
                    timeframe,
                    requested = %requested,
                    cached = %data,
                    "reconciling requested range against cached range"
                );
                match classify(requested, &data) {
                    Coverage::ExtendBackward => {
                        debug!("requested range extends below the cached table");
                        self.extend_backward(&mut series, &symbol, timeframe, requested.start, data.start)?;
                    }
                    Coverage::ExtendBoth => {
                        debug!("requested range extends below and above the cached table");
                        self.extend_backward(&mut series, &symbol, timeframe, requested.start, data.start)?;
                        self.extend_forward(&mut series, &symbol, timeframe, data.end, requested.end)?;
                    }
                    Coverage::ExtendForward => {
                        debug!("requested range extends above the cached table");
                        self.extend_forward(&mut series, &symbol, timeframe, data.end, requested.end)?;
                    }
                    Coverage::Covered => {
                        debug!("requested range already covered, nothing to fetch");
                    }
                }
            }
        }

        self.store.save(&symbol, timeframe, &series)?;
        Ok(series)
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let range = DateRange::new(start, end)?;
        self.source
            .fetch_candles(symbol, timeframe, &range)
            .with_context(|| format!("failed to fetch {symbol} {timeframe} candles for {range}"))
    }

    /// Fetch `[start, table_start]` and splice it in front. The fetch is
    /// endpoint-inclusive and `table_start` is already cached, so the last
    /// fetched row is dropped.
    fn extend_backward(
        &self,
        series: &mut CandleSeries,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        table_start: DateTime<Utc>,
    ) -> Result<()> {
        let mut head = self.fetch(symbol, timeframe, start, table_start)?;
        head.pop();
        if head.is_empty() {
            debug!("no candles available before the cached range");
            return Ok(());
        }
        debug!(rows = head.len(), "prepending candles");
        series.prepend(head)
    }

    /// Fetch `[table_end, end]` and splice it onto the tail. The first
    /// fetched row duplicates the cached table end and is dropped.
    fn extend_forward(
        &self,
        series: &mut CandleSeries,
        symbol: &str,
        timeframe: &str,
        table_end: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        let mut tail = self.fetch(symbol, timeframe, table_end, end)?;
        if !tail.is_empty() {
            tail.remove(0);
        }
        if tail.is_empty() {
            debug!("no candles available after the cached range");
            return Ok(());
        }
        debug!(rows = tail.len(), "appending candles");
        series.append(tail)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::candles::series::test_support::candle_at;
    use crate::types::ms_to_utc;

    const MINUTE_MS: i64 = 60_000;

    /// Market-data stub serving a synthetic one-minute grid and recording
    /// every range it is asked for.
    struct GridSource {
        calls: RefCell<Vec<DateRange>>,
    }

    impl GridSource {
        fn new() -> Self {
            Self { calls: RefCell::new(Vec::new()) }
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn call(&self, idx: usize) -> DateRange {
            self.calls.borrow()[idx]
        }
    }

    impl MarketDataSource for GridSource {
        fn fetch_candles(
            &self,
            _symbol: &str,
            _timeframe: &str,
            range: &DateRange,
        ) -> Result<Vec<Candle>> {
            self.calls.borrow_mut().push(*range);
            let start = range.start.timestamp_millis();
            let end = range.end.timestamp_millis();
            let mut out = Vec::new();
            let mut t = start;
            // Inclusive of candles opening at both endpoints.
            while t <= end {
                out.push(candle_at(t));
                t += MINUTE_MS;
            }
            Ok(out)
        }
    }

    fn minutes(start_min: i64, end_min: i64) -> DateRange {
        DateRange::new(
            ms_to_utc(start_min * MINUTE_MS).unwrap(),
            ms_to_utc(end_min * MINUTE_MS).unwrap(),
        )
        .unwrap()
    }

    fn cache_in(dir: &std::path::Path) -> CandleCache<GridSource> {
        CandleCache::new(GridSource::new(), CandleStore::new(dir).unwrap())
    }

    fn assert_strictly_increasing(series: &CandleSeries) {
        let times: Vec<_> = series.candles().iter().map(|c| c.open_time).collect();
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1], "open times not strictly increasing");
        }
    }

    // --- classification -----------------------------------------------------

    #[test]
    fn classify_disjoint_and_overlapping_ranges() {
        let data = minutes(100, 200);
        assert_eq!(classify(&minutes(10, 50), &data), Coverage::ExtendBackward);
        assert_eq!(classify(&minutes(50, 150), &data), Coverage::ExtendBackward);
        assert_eq!(classify(&minutes(50, 250), &data), Coverage::ExtendBoth);
        assert_eq!(classify(&minutes(150, 250), &data), Coverage::ExtendForward);
        assert_eq!(classify(&minutes(250, 300), &data), Coverage::ExtendForward);
        assert_eq!(classify(&minutes(120, 180), &data), Coverage::Covered);
    }

    #[test]
    fn classify_exact_boundaries_as_covered() {
        let data = minutes(100, 200);
        // Identical range, shared start, shared end, single point inside.
        assert_eq!(classify(&minutes(100, 200), &data), Coverage::Covered);
        assert_eq!(classify(&minutes(100, 150), &data), Coverage::Covered);
        assert_eq!(classify(&minutes(150, 200), &data), Coverage::Covered);
        assert_eq!(classify(&minutes(150, 150), &data), Coverage::Covered);
        assert_eq!(classify(&minutes(100, 100), &data), Coverage::Covered);
        assert_eq!(classify(&minutes(200, 200), &data), Coverage::Covered);
    }

    #[test]
    fn classify_touching_ranges_as_extensions() {
        let data = minutes(100, 200);
        assert_eq!(classify(&minutes(50, 100), &data), Coverage::ExtendBackward);
        assert_eq!(classify(&minutes(200, 250), &data), Coverage::ExtendForward);
    }

    // --- first fetch / idempotence ------------------------------------------

    #[test]
    fn cold_cache_fetches_full_range_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();

        assert_eq!(cache.source.call_count(), 1);
        assert_eq!(cache.source.call(0), minutes(100, 200));
        assert_eq!(series.len(), 101);
        assert!(cache.store().exists("BTCUSDT", "1m"));
    }

    #[test]
    fn repeated_request_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        let first = cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let second = cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();

        // The second call touches the network zero times.
        assert_eq!(cache.source.call_count(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn contained_request_fetches_nothing_and_keeps_table() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(120, 180)).unwrap();

        assert_eq!(cache.source.call_count(), 1);
        // The full cached table comes back, not just the slice.
        assert_eq!(series.len(), 101);
    }

    #[test]
    fn boundary_equal_requests_fetch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        for range in [minutes(100, 200), minutes(100, 150), minutes(150, 200), minutes(150, 150)] {
            cache.ensure_range("BTCUSDT", "1m", &range).unwrap();
        }
        assert_eq!(cache.source.call_count(), 1);
    }

    // --- backward extension -------------------------------------------------

    #[test]
    fn earlier_start_prepends_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(50, 150)).unwrap();

        assert_eq!(cache.source.call_count(), 2);
        // Delta fetch runs from the requested start to the cached start.
        assert_eq!(cache.source.call(1), minutes(50, 100));
        // 51 fetched, boundary row dropped, plus the original 101.
        assert_eq!(series.len(), 50 + 101);
        assert_eq!(series.first_open_time(), Some(ms_to_utc(50 * MINUTE_MS).unwrap()));
        assert_strictly_increasing(&series);
    }

    #[test]
    fn disjoint_earlier_range_fills_the_gap() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        // Entirely before the table, with a gap from 20 to 100: the delta
        // fetch still runs through the cached start, leaving no hole.
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(10, 20)).unwrap();

        assert_eq!(cache.source.call(1), minutes(10, 100));
        assert_eq!(series.len(), 90 + 101);
        assert_strictly_increasing(&series);
    }

    // --- forward extension --------------------------------------------------

    #[test]
    fn later_end_appends_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(150, 260)).unwrap();

        assert_eq!(cache.source.call_count(), 2);
        assert_eq!(cache.source.call(1), minutes(200, 260));
        assert_eq!(series.len(), 101 + 60);
        assert_eq!(series.last_open_time(), Some(ms_to_utc(260 * MINUTE_MS).unwrap()));
        assert_strictly_increasing(&series);
    }

    #[test]
    fn disjoint_later_range_fills_the_gap() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(290, 300)).unwrap();

        assert_eq!(cache.source.call(1), minutes(200, 300));
        assert_eq!(series.len(), 101 + 100);
        assert_strictly_increasing(&series);
    }

    // --- both-side extension ------------------------------------------------

    #[test]
    fn straddling_range_fetches_both_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(60, 240)).unwrap();

        assert_eq!(cache.source.call_count(), 3);
        assert_eq!(cache.source.call(1), minutes(60, 100));
        assert_eq!(cache.source.call(2), minutes(200, 240));
        // prepend_len - 1 + original_len + append_len - 1.
        assert_eq!(series.len(), (41 - 1) + 101 + (41 - 1));
        assert_eq!(series.first_open_time(), Some(ms_to_utc(60 * MINUTE_MS).unwrap()));
        assert_eq!(series.last_open_time(), Some(ms_to_utc(240 * MINUTE_MS).unwrap()));
        assert_strictly_increasing(&series);
    }

    // --- persistence behavior -----------------------------------------------

    #[test]
    fn extensions_are_persisted_across_cache_instances() {
        let dir = tempfile::tempdir().unwrap();

        {
            let cache = cache_in(dir.path());
            cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
            cache.ensure_range("BTCUSDT", "1m", &minutes(50, 200)).unwrap();
        }

        // A fresh cache over the same directory sees the extended table and
        // needs no fetch for the union range.
        let cache = cache_in(dir.path());
        let series = cache.ensure_range("BTCUSDT", "1m", &minutes(50, 200)).unwrap();
        assert_eq!(cache.source.call_count(), 0);
        assert_eq!(series.len(), 151);
    }

    #[test]
    fn covered_request_still_resaves_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        let path = cache.store().path_for("BTCUSDT", "1m");
        std::fs::remove_file(&path).unwrap();

        // Recreate the table from a fresh full fetch, then confirm a covered
        // request still rewrites the file.
        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        assert!(path.is_file());
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();
        cache.ensure_range("BTCUSDT", "1m", &minutes(120, 180)).unwrap();
        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert!(after >= before);
        assert!(path.is_file());
    }

    #[test]
    fn symbol_key_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.ensure_range("btcusdt", "1m", &minutes(100, 200)).unwrap();
        cache.ensure_range("BTCUSDT", "1m", &minutes(100, 200)).unwrap();
        assert_eq!(cache.source.call_count(), 1);
    }
}
