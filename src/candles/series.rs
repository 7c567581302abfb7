// =============================================================================
// Candle series — ordered, duplicate-free OHLCV sequences
// =============================================================================

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::DateRange;

/// A single OHLCV candle. `open_time` identifies the candle within a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
    /// Volume in quote currency; zero when the venue does not report it.
    pub quote_volume: f64,
    pub trades: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
}

/// A time-ordered candle sequence for one (symbol, timeframe) key.
///
/// Invariant: `open_time` is strictly increasing; no duplicates. Enforced at
/// construction and at every merge seam.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Wrap a candle vector, verifying the ordering invariant.
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        ensure_strictly_increasing(&candles)?;
        Ok(Self { candles })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }

    pub fn first_open_time(&self) -> Option<DateTime<Utc>> {
        self.candles.first().map(|c| c.open_time)
    }

    pub fn last_open_time(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.open_time)
    }

    /// The open-time span currently covered, or `None` for an empty series.
    pub fn data_range(&self) -> Option<DateRange> {
        match (self.first_open_time(), self.last_open_time()) {
            (Some(start), Some(end)) => DateRange::new(start, end).ok(),
            _ => None,
        }
    }

    /// Splice `head` in front of the series.
    ///
    /// `head` must itself be ordered and end strictly before the current
    /// first candle.
    pub fn prepend(&mut self, mut head: Vec<Candle>) -> Result<()> {
        if head.is_empty() {
            return Ok(());
        }
        ensure_strictly_increasing(&head)?;
        if let (Some(tail_of_head), Some(first)) = (head.last(), self.candles.first()) {
            if tail_of_head.open_time >= first.open_time {
                bail!(
                    "prepended candles end at {} which overlaps the series start {}",
                    tail_of_head.open_time,
                    first.open_time
                );
            }
        }
        head.append(&mut self.candles);
        self.candles = head;
        Ok(())
    }

    /// Extend the series with `tail`.
    ///
    /// `tail` must itself be ordered and start strictly after the current
    /// last candle.
    pub fn append(&mut self, tail: Vec<Candle>) -> Result<()> {
        if tail.is_empty() {
            return Ok(());
        }
        ensure_strictly_increasing(&tail)?;
        if let (Some(last), Some(head_of_tail)) = (self.candles.last(), tail.first()) {
            if head_of_tail.open_time <= last.open_time {
                bail!(
                    "appended candles start at {} which overlaps the series end {}",
                    head_of_tail.open_time,
                    last.open_time
                );
            }
        }
        self.candles.extend(tail);
        Ok(())
    }
}

fn ensure_strictly_increasing(candles: &[Candle]) -> Result<()> {
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            bail!(
                "candle open times are not strictly increasing: {} then {}",
                pair[0].open_time,
                pair[1].open_time
            );
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::ms_to_utc;

    /// Synthetic one-minute candle opening at `ms`.
    pub fn candle_at(ms: i64) -> Candle {
        let open_time = ms_to_utc(ms).unwrap();
        let close_time = ms_to_utc(ms + 59_999).unwrap();
        Candle {
            open_time,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
            close_time,
            quote_volume: 1_000.0,
            trades: 25,
            taker_buy_volume: 5.0,
            taker_buy_quote_volume: 500.0,
        }
    }

    /// Candles at every minute from `start_min` through `end_min` inclusive.
    pub fn minute_candles(start_min: i64, end_min: i64) -> Vec<Candle> {
        (start_min..=end_min).map(|m| candle_at(m * 60_000)).collect()
    }
}
