// =============================================================================
// Binance REST transport — HMAC-SHA256 signed requests, three API bases
// =============================================================================
//
// SECURITY: the secret key is never logged or serialized. All signed
// requests carry X-MBX-APIKEY as a header and a recvWindow of 5 000 ms to
// tolerate minor clock drift between this process and Binance servers.
//
// One client serves the spot (`api.`), USD-margined (`fapi.`) and
// coin-margined (`dapi.`) bases; the market adapters pick the base per call.
// =============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::binance::limits::UsedWeight;
use crate::candles::Candle;
use crate::types::{ms_to_utc, DateRange};

type HmacSha256 = Hmac<Sha256>;

/// Default recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5000;

/// Most rows one klines request may return.
const KLINES_PAGE_LIMIT: usize = 1000;

/// Per-minute request-weight ceiling used by the usage tracker.
const WEIGHT_LIMIT_1M: u32 = 1200;

/// Which Binance API base a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiBase {
    Spot,
    Usdm,
    Coinm,
}

/// Binance REST client with HMAC-SHA256 request signing.
pub struct BinanceClient {
    secret: String,
    spot_base: String,
    usdm_base: String,
    coinm_base: String,
    http: reqwest::blocking::Client,
    weight: UsedWeight,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient`.
    ///
    /// # Arguments
    /// * `api_key` — Binance API key (sent as a header, never in query params).
    /// * `secret`  — Binance secret key used exclusively for HMAC signing.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        // The API key header is required for all signed endpoints.
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let http = reqwest::blocking::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        debug!("BinanceClient initialised");

        Self {
            secret,
            spot_base: "https://api.binance.com".to_string(),
            usdm_base: "https://fapi.binance.com".to_string(),
            coinm_base: "https://dapi.binance.com".to_string(),
            http,
            weight: UsedWeight::new(WEIGHT_LIMIT_1M),
        }
    }

    fn base_url(&self, base: ApiBase) -> &str {
        match base {
            ApiBase::Spot => &self.spot_base,
            ApiBase::Usdm => &self.usdm_base,
            ApiBase::Coinm => &self.coinm_base,
        }
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current UNIX timestamp in milliseconds.
    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    /// Build the full query string for a signed request (appends timestamp,
    /// recvWindow, and signature).
    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    // -------------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------------

    fn execute(&self, req: reqwest::blocking::RequestBuilder, what: &str) -> Result<Value> {
        let resp = req.send().with_context(|| format!("{what} request failed"))?;

        self.weight.record(resp.headers());

        let status = resp.status();
        let body: Value = resp
            .json()
            .with_context(|| format!("failed to parse {what} response"))?;

        if !status.is_success() {
            bail!("Binance {what} returned {status}: {body}");
        }
        Ok(body)
    }

    /// GET a public (unsigned) endpoint.
    pub(crate) fn get_public(&self, base: ApiBase, path: &str, query: &str) -> Result<Value> {
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url(base))
        } else {
            format!("{}{path}?{query}", self.base_url(base))
        };
        self.execute(self.http.get(&url), path)
    }

    /// GET a signed endpoint.
    pub(crate) fn get_signed(&self, base: ApiBase, path: &str, params: &str) -> Result<Value> {
        let url = format!("{}{path}?{}", self.base_url(base), self.signed_query(params));
        self.execute(self.http.get(&url), path)
    }

    /// POST a signed endpoint.
    pub(crate) fn post_signed(&self, base: ApiBase, path: &str, params: &str) -> Result<Value> {
        let url = format!("{}{path}?{}", self.base_url(base), self.signed_query(params));
        self.execute(self.http.post(&url), path)
    }

    /// DELETE a signed endpoint.
    pub(crate) fn delete_signed(&self, base: ApiBase, path: &str, params: &str) -> Result<Value> {
        let url = format!("{}{path}?{}", self.base_url(base), self.signed_query(params));
        self.execute(self.http.delete(&url), path)
    }

    // -------------------------------------------------------------------------
    // Klines
    // -------------------------------------------------------------------------

    /// Fetch klines for `[range.start, range.end]`, paging past the per-
    /// request row cap. Candles opening at both endpoints are included.
    pub(crate) fn fetch_klines(
        &self,
        base: ApiBase,
        path: &str,
        symbol: &str,
        interval: &str,
        range: &DateRange,
    ) -> Result<Vec<Candle>> {
        let end_ms = range.end.timestamp_millis();
        let mut cursor = range.start.timestamp_millis();
        let mut candles: Vec<Candle> = Vec::new();

        while cursor <= end_ms {
            let query = format!(
                "symbol={symbol}&interval={interval}&startTime={cursor}&endTime={end_ms}&limit={KLINES_PAGE_LIMIT}"
            );
            let body = self.get_public(base, path, &query)?;
            let rows = body.as_array().context("klines response is not an array")?;
            if rows.is_empty() {
                break;
            }

            for row in rows {
                candles.push(parse_kline_row(row)?);
            }

            let last_open = candles
                .last()
                .map(|c| c.open_time.timestamp_millis())
                .unwrap_or(end_ms);
            if rows.len() < KLINES_PAGE_LIMIT || last_open >= end_ms {
                break;
            }
            cursor = last_open + 1;
        }

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    // -------------------------------------------------------------------------
    // Shared parsing helpers
    // -------------------------------------------------------------------------

    /// Parse a JSON value that may be either a string or a number into `f64`.
    pub(crate) fn parse_str_f64(val: &Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            bail!("expected string or number, got: {val}")
        }
    }
}

/// Parse one kline row from Binance's array-of-arrays response.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
fn parse_kline_row(row: &Value) -> Result<Candle> {
    let arr = row.as_array().context("kline entry is not an array")?;
    if arr.len() < 11 {
        bail!("kline entry has {} fields, expected at least 11", arr.len());
    }

    let open_time = ms_to_utc(arr[0].as_i64().context("kline open time is not an integer")?)?;
    let close_time = ms_to_utc(arr[6].as_i64().context("kline close time is not an integer")?)?;

    Ok(Candle {
        open_time,
        open: BinanceClient::parse_str_f64(&arr[1])?,
        high: BinanceClient::parse_str_f64(&arr[2])?,
        low: BinanceClient::parse_str_f64(&arr[3])?,
        close: BinanceClient::parse_str_f64(&arr[4])?,
        volume: BinanceClient::parse_str_f64(&arr[5])?,
        close_time,
        quote_volume: BinanceClient::parse_str_f64(&arr[7])?,
        trades: arr[8].as_u64().unwrap_or(0),
        taker_buy_volume: BinanceClient::parse_str_f64(&arr[9])?,
        taker_buy_quote_volume: BinanceClient::parse_str_f64(&arr[10])?,
    })
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("secret", &"<redacted>")
            .field("spot_base", &self.spot_base)
            .field("usdm_base", &self.usdm_base)
            .field("coinm_base", &self.coinm_base)
            .finish()
    }
}
