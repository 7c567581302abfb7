// =============================================================================
// Settings — environment-driven configuration read once at startup
// =============================================================================

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::orders::DEFAULT_PRICE_TOLERANCE;

/// Process configuration. API keys may be empty for public-data-only use;
/// signed calls will then fail at the venue.
#[derive(Debug, Clone)]
pub struct Settings {
    pub binance_api_key: String,
    pub binance_api_secret: String,
    /// Directory holding the parquet candle tables.
    pub data_dir: PathBuf,
    /// Fractional tolerance for price reconciliation.
    pub price_tolerance: f64,
}

impl Settings {
    /// Read settings from the environment (after `.env` loading).
    ///
    /// Variables: `BINANCE_API_KEY`, `BINANCE_API_SECRET`,
    /// `TRADEDESK_DATA_DIR` (default `data`),
    /// `TRADEDESK_PRICE_TOLERANCE` (default 0.001).
    pub fn from_env() -> Result<Self> {
        let binance_api_key = env::var("BINANCE_API_KEY").unwrap_or_default();
        let binance_api_secret = env::var("BINANCE_API_SECRET").unwrap_or_default();
        let data_dir = env::var("TRADEDESK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let price_tolerance = parse_tolerance(env::var("TRADEDESK_PRICE_TOLERANCE").ok().as_deref())?;

        debug!(
            data_dir = %data_dir.display(),
            price_tolerance,
            has_api_key = !binance_api_key.is_empty(),
            "settings loaded"
        );

        Ok(Self {
            binance_api_key,
            binance_api_secret,
            data_dir,
            price_tolerance,
        })
    }
}

fn parse_tolerance(raw: Option<&str>) -> Result<f64> {
    match raw {
        Some(value) => {
            let tolerance: f64 = value
                .parse()
                .with_context(|| format!("TRADEDESK_PRICE_TOLERANCE {value:?} is not a number"))?;
            if !(0.0..1.0).contains(&tolerance) {
                anyhow::bail!("TRADEDESK_PRICE_TOLERANCE must be in [0, 1), got {tolerance}");
            }
            Ok(tolerance)
        }
        None => Ok(DEFAULT_PRICE_TOLERANCE),
    }
}
