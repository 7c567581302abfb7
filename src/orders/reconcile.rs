// =============================================================================
// Price reconciliation — resolve inconsistent limit/stop inputs
// =============================================================================
//
// POLICY: inconsistent price combinations are never rejected. Each one is
// downgraded to the nearest simpler order shape with a logged warning, so an
// order always comes out the other end.
// =============================================================================

use tracing::warn;

use crate::types::Side;

/// Every way a (limit, stop) pair can disagree with the current price.
///
/// One variant per decision-table row; `classify` picks exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceCase {
    /// Prices are consistent; keep them as given.
    Unchanged,
    /// Lone limit within tolerance of the market price; trade at market.
    LimitNearMarket,
    /// Lone limit on the wrong side of the market for this direction; the
    /// level is really a trigger.
    LimitWrongSide,
    /// Lone stop within tolerance of the market price; it would fire
    /// immediately, so trade at market.
    StopNearMarket,
    /// Stop within tolerance of the limit; the limit adds nothing beyond the
    /// trigger.
    StopNearLimit,
    /// Stop/limit ordering impossible to fill for this direction; keep only
    /// the trigger.
    StopLimitInverted,
}

/// `value` within a `±eps` fractional band around `center`.
fn near(center: f64, value: f64, eps: f64) -> bool {
    (1.0 - eps) * center <= value && value <= (1.0 + eps) * center
}

/// A resting BUY limit sits below the market, a resting SELL limit above it.
fn limit_on_wrong_side(side: Side, price: f64, limit: f64) -> bool {
    match side {
        Side::Buy => price < limit,
        Side::Sell => price > limit,
    }
}

/// A BUY stop-limit needs `stop >= limit`; a SELL stop-limit `stop <= limit`.
fn stop_limit_inverted(side: Side, limit: f64, stop: f64) -> bool {
    match side {
        Side::Buy => stop < limit,
        Side::Sell => stop > limit,
    }
}

/// Classify a price combination into its decision-table row.
pub fn classify(
    price: f64,
    limit: Option<f64>,
    stop: Option<f64>,
    side: Side,
    eps: f64,
) -> PriceCase {
    match (limit, stop) {
        (Some(limit), None) => {
            if near(limit, price, eps) {
                PriceCase::LimitNearMarket
            } else if limit_on_wrong_side(side, price, limit) {
                PriceCase::LimitWrongSide
            } else {
                PriceCase::Unchanged
            }
        }
        (None, Some(stop)) => {
            if near(stop, price, eps) {
                PriceCase::StopNearMarket
            } else {
                PriceCase::Unchanged
            }
        }
        (Some(limit), Some(stop)) => {
            if near(limit, stop, eps) {
                PriceCase::StopNearLimit
            } else if stop_limit_inverted(side, limit, stop) {
                PriceCase::StopLimitInverted
            } else {
                PriceCase::Unchanged
            }
        }
        (None, None) => PriceCase::Unchanged,
    }
}

/// Resolve `(limit, stop)` into a consistent pair for the given direction.
///
/// Returns the adjusted `(limit, stop)`; either value may have been cleared
/// or moved. Every downgrade emits one warning naming the conversion.
pub fn reconcile_prices(
    price: f64,
    limit: Option<f64>,
    stop: Option<f64>,
    side: Side,
    eps: f64,
) -> (Option<f64>, Option<f64>) {
    match (classify(price, limit, stop, side, eps), limit, stop) {
        (PriceCase::LimitNearMarket, Some(l), _) => {
            warn!(price, limit = l, "prices too close, converting LIMIT to MARKET");
            (None, None)
        }
        (PriceCase::LimitWrongSide, Some(l), _) => {
            warn!(
                price,
                limit = l,
                side = %side,
                "inconsistent limit for side, converting LIMIT to STOP MARKET"
            );
            (None, Some(l))
        }
        (PriceCase::StopNearMarket, _, Some(s)) => {
            warn!(price, stop = s, "prices too close, converting STOP MARKET to MARKET");
            (None, None)
        }
        (PriceCase::StopNearLimit, Some(l), Some(s)) => {
            warn!(limit = l, stop = s, "prices too close, converting STOP LIMIT to STOP MARKET");
            (None, Some(s))
        }
        (PriceCase::StopLimitInverted, Some(l), Some(s)) => {
            warn!(
                limit = l,
                stop = s,
                side = %side,
                "inconsistent stop/limit ordering, converting STOP LIMIT to STOP MARKET"
            );
            (None, Some(l))
        }
        (_, l, s) => (l, s),
    }
}
