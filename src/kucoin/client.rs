// =============================================================================
// KuCoin kline clients — public candle endpoints, no signing required
// =============================================================================
//
// The two venues disagree on almost everything: spot keys candles in
// seconds, serves strings, orders newest-first and caps pages at 1500 rows;
// futures keys in milliseconds, serves numbers, orders oldest-first and caps
// pages at 500. Both normalize into the shared `Candle` model here, with
// fields the venue does not report left at zero.
// =============================================================================

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde_json::Value;
use tracing::debug;

use crate::candles::Candle;
use crate::market::MarketDataSource;
use crate::types::{ms_to_utc, DateRange};

/// Accepted timeframe tokens: `(short, venue token, minutes)`.
const TIMEFRAMES: &[(&str, &str, i64)] = &[
    ("1m", "1min", 1),
    ("3m", "3min", 3),
    ("5m", "5min", 5),
    ("15m", "15min", 15),
    ("30m", "30min", 30),
    ("1h", "1hour", 60),
    ("2h", "2hour", 120),
    ("4h", "4hour", 240),
    ("6h", "6hour", 360),
    ("8h", "8hour", 480),
    ("12h", "12hour", 720),
    ("1d", "1day", 1440),
    ("1w", "1week", 10080),
];

const SPOT_PAGE_LIMIT: usize = 1500;
const FUTURES_PAGE_LIMIT: usize = 500;

/// Resolve a timeframe in either vocabulary to `(venue token, minutes)`.
fn lookup_timeframe(timeframe: &str) -> Result<(&'static str, i64)> {
    TIMEFRAMES
        .iter()
        .find(|(short, long, _)| *short == timeframe || *long == timeframe)
        .map(|(_, long, minutes)| (*long, *minutes))
        .with_context(|| format!("unsupported KuCoin timeframe {timeframe:?}"))
}

/// Unwrap a KuCoin response envelope, checking the venue status code.
fn unwrap_envelope(body: Value, what: &str) -> Result<Value> {
    let code = body["code"].as_str().unwrap_or("");
    if code != "200000" {
        let msg = body["msg"].as_str().unwrap_or("unknown error");
        bail!("KuCoin {what} returned code {code}: {msg}");
    }
    Ok(body["data"].clone())
}

// ---------------------------------------------------------------------------
// Spot
// ---------------------------------------------------------------------------

/// KuCoin spot kline client (`api.kucoin.com`).
pub struct KucoinSpot {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl KucoinSpot {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.kucoin.com".to_string(),
            http: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build reqwest client"),
        }
    }

    fn get_data(&self, url: &str, what: &str) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("{what} request failed"))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .with_context(|| format!("failed to parse {what} response"))?;
        if !status.is_success() {
            bail!("KuCoin {what} returned {status}: {body}");
        }
        unwrap_envelope(body, what)
    }
}

impl Default for KucoinSpot {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataSource for KucoinSpot {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        let (token, minutes) = lookup_timeframe(timeframe)?;
        let step_ms = minutes * 60_000;

        let start_s = range.start.timestamp();
        // endAt is exclusive; push it past the last candle we want.
        let mut end_cursor = range.end.timestamp() + 1;
        let mut candles: Vec<Candle> = Vec::new();

        loop {
            let url = format!(
                "{}/api/v1/market/candles?type={token}&symbol={symbol}&startAt={start_s}&endAt={end_cursor}",
                self.base_url
            );
            let data = self.get_data(&url, "/api/v1/market/candles")?;
            let page = parse_spot_rows(&data, step_ms)?;
            if page.is_empty() {
                break;
            }

            let full_page = page.len() >= SPOT_PAGE_LIMIT;
            // Rows arrive newest-first; the oldest row bounds the next page.
            let oldest_s = page
                .iter()
                .map(|c| c.open_time.timestamp())
                .min()
                .unwrap_or(start_s);
            candles.extend(page);

            if !full_page || oldest_s <= start_s {
                break;
            }
            end_cursor = oldest_s;
        }

        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        candles.retain(|c| c.open_time >= range.start && c.open_time <= range.end);

        debug!(symbol, timeframe, count = candles.len(), "kucoin spot klines fetched");
        Ok(candles)
    }
}

/// Spot rows: `[time(s), open, close, high, low, volume, turnover]`, strings.
fn parse_spot_rows(data: &Value, step_ms: i64) -> Result<Vec<Candle>> {
    let rows = data.as_array().context("spot candles payload is not an array")?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let arr = row.as_array().context("spot candle entry is not an array")?;
        if arr.len() < 7 {
            bail!("spot candle entry has {} fields, expected 7", arr.len());
        }
        let open_ms = field_f64(&arr[0])? as i64 * 1000;
        candles.push(Candle {
            open_time: ms_to_utc(open_ms)?,
            open: field_f64(&arr[1])?,
            close: field_f64(&arr[2])?,
            high: field_f64(&arr[3])?,
            low: field_f64(&arr[4])?,
            volume: field_f64(&arr[5])?,
            close_time: ms_to_utc(open_ms + step_ms - 1)?,
            quote_volume: field_f64(&arr[6])?,
            trades: 0,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
        });
    }
    Ok(candles)
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

/// KuCoin futures kline client (`api-futures.kucoin.com`).
pub struct KucoinFutures {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl KucoinFutures {
    pub fn new() -> Self {
        Self {
            base_url: "https://api-futures.kucoin.com".to_string(),
            http: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build reqwest client"),
        }
    }

    fn get_data(&self, url: &str, what: &str) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("{what} request failed"))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .with_context(|| format!("failed to parse {what} response"))?;
        if !status.is_success() {
            bail!("KuCoin {what} returned {status}: {body}");
        }
        unwrap_envelope(body, what)
    }
}

impl Default for KucoinFutures {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataSource for KucoinFutures {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        let (_, minutes) = lookup_timeframe(timeframe)?;
        let step_ms = minutes * 60_000;

        let end_ms = range.end.timestamp_millis();
        let mut cursor = range.start.timestamp_millis();
        let mut candles: Vec<Candle> = Vec::new();

        while cursor <= end_ms {
            let url = format!(
                "{}/api/v1/kline/query?symbol={symbol}&granularity={minutes}&from={cursor}&to={end_ms}",
                self.base_url
            );
            let data = self.get_data(&url, "/api/v1/kline/query")?;
            let page = parse_futures_rows(&data, step_ms)?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            candles.extend(page);

            let last_open = candles
                .last()
                .map(|c| c.open_time.timestamp_millis())
                .unwrap_or(end_ms);
            if page_len < FUTURES_PAGE_LIMIT || last_open >= end_ms {
                break;
            }
            cursor = last_open + 1;
        }

        candles.retain(|c| c.open_time >= range.start && c.open_time <= range.end);

        debug!(symbol, timeframe, count = candles.len(), "kucoin futures klines fetched");
        Ok(candles)
    }
}

/// Futures rows: `[time(ms), open, high, low, close, volume]`, numbers.
fn parse_futures_rows(data: &Value, step_ms: i64) -> Result<Vec<Candle>> {
    let rows = data.as_array().context("futures kline payload is not an array")?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let arr = row.as_array().context("futures kline entry is not an array")?;
        if arr.len() < 6 {
            bail!("futures kline entry has {} fields, expected 6", arr.len());
        }
        let open_ms = field_f64(&arr[0])? as i64;
        candles.push(Candle {
            open_time: ms_to_utc(open_ms)?,
            open: field_f64(&arr[1])?,
            high: field_f64(&arr[2])?,
            low: field_f64(&arr[3])?,
            close: field_f64(&arr[4])?,
            volume: field_f64(&arr[5])?,
            close_time: ms_to_utc(open_ms + step_ms - 1)?,
            quote_volume: 0.0,
            trades: 0,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
        });
    }
    Ok(candles)
}

/// KuCoin serves numbers as strings on spot and as numbers on futures.
fn field_f64(val: &Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        bail!("expected string or number, got: {val}")
    }
}

/// Candle span for a timeframe token; used to derive close times.
pub fn timeframe_duration(timeframe: &str) -> Result<Duration> {
    let (_, minutes) = lookup_timeframe(timeframe)?;
    Ok(Duration::minutes(minutes))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn timeframe_lookup_accepts_both_vocabularies() {
        assert_eq!(lookup_timeframe("5m").unwrap(), ("5min", 5));
        assert_eq!(lookup_timeframe("5min").unwrap(), ("5min", 5));
        assert_eq!(lookup_timeframe("1h").unwrap(), ("1hour", 60));
        assert_eq!(lookup_timeframe("1week").unwrap(), ("1week", 10080));
        assert!(lookup_timeframe("7m").is_err());
    }

    #[test]
    fn timeframe_duration_matches_minutes() {
        assert_eq!(timeframe_duration("15min").unwrap(), Duration::minutes(15));
        assert_eq!(timeframe_duration("1d").unwrap(), Duration::days(1));
    }

    #[test]
    fn spot_rows_parse_and_reorder_fields() {
        // Venue order is [time, open, close, high, low, volume, turnover].
        let data = json!([
            ["1700000300", "101", "103", "104", "100", "12.5", "1250"],
            ["1700000000", "100", "101", "102", "99", "10.0", "1000"],
        ]);
        let candles = parse_spot_rows(&data, 5 * 60_000).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time.timestamp(), 1_700_000_300);
        assert_eq!(candles[0].open, 101.0);
        assert_eq!(candles[0].close, 103.0);
        assert_eq!(candles[0].high, 104.0);
        assert_eq!(candles[0].low, 100.0);
        assert_eq!(candles[0].quote_volume, 1250.0);
        assert_eq!(
            candles[0].close_time.timestamp_millis(),
            1_700_000_300_000 + 5 * 60_000 - 1
        );
    }

    #[test]
    fn spot_rows_reject_short_entries() {
        let data = json!([["1700000000", "100", "101"]]);
        assert!(parse_spot_rows(&data, 60_000).is_err());
    }

    #[test]
    fn futures_rows_parse_numeric_fields() {
        // Venue order is [time, open, high, low, close, volume].
        let data = json!([
            [1700000000000i64, 100.0, 102.0, 99.0, 101.0, 10.0],
            [1700000060000i64, 101.0, 104.0, 100.0, 103.0, 12.5],
        ]);
        let candles = parse_futures_rows(&data, 60_000).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].open_time.timestamp_millis(), 1_700_000_060_000);
        assert_eq!(candles[1].high, 104.0);
        assert_eq!(candles[1].close, 103.0);
        assert_eq!(candles[1].trades, 0);
    }

    #[test]
    fn envelope_rejects_error_codes() {
        let ok = json!({ "code": "200000", "data": [1, 2, 3] });
        assert_eq!(unwrap_envelope(ok, "x").unwrap(), json!([1, 2, 3]));

        let err = json!({ "code": "400100", "msg": "Param error" });
        assert!(unwrap_envelope(err, "x").is_err());
    }
}
