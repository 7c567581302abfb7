// =============================================================================
// Order dispatch — canonical intent to venue payload
// =============================================================================
//
// Each venue segment names its conditional order types differently; the
// mapping lives in one exhaustive match so a new kind or market cannot be
// added without the compiler pointing here.
// =============================================================================

use anyhow::Result;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::market::{MarketAdapter, OrderForm};
use crate::orders::rounding::round_to_step;
use crate::types::{Market, PositionSide, Side, SymbolConstraints, TimeInForce};

/// Canonical order shape after price reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    TakeProfitMarket,
    TakeProfitLimit,
}

impl IntentKind {
    /// Limit-style kinds carry a price and a time-in-force on the wire.
    pub fn is_limit_style(self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit | Self::TakeProfitLimit)
    }
}

/// A reconciled, sized order ready for dispatch. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub kind: IntentKind,
    pub side: Side,
    pub position_side: Option<PositionSide>,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: TimeInForce,
}

/// A trigger beyond the market in the direction the order chases is a STOP;
/// a trigger on the favourable side of the market is a TAKE_PROFIT.
fn stop_family(side: Side, price: f64, stop: f64) -> bool {
    match side {
        Side::Buy => price <= stop,
        Side::Sell => price >= stop,
    }
}

/// Build the canonical intent from reconciled prices.
///
/// `limit`/`stop` must already have passed through
/// [`crate::orders::reconcile::reconcile_prices`]; the kind follows from
/// which of them survived and from the trigger direction.
pub fn build_intent(
    price: f64,
    limit: Option<f64>,
    stop: Option<f64>,
    side: Side,
    position_side: Option<PositionSide>,
    quantity: f64,
    time_in_force: TimeInForce,
) -> OrderIntent {
    let kind = match (limit, stop) {
        (None, None) => IntentKind::Market,
        (Some(_), None) => IntentKind::Limit,
        (None, Some(s)) => {
            if stop_family(side, price, s) {
                IntentKind::StopMarket
            } else {
                IntentKind::TakeProfitMarket
            }
        }
        (Some(_), Some(s)) => {
            if stop_family(side, price, s) {
                IntentKind::StopLimit
            } else {
                IntentKind::TakeProfitLimit
            }
        }
    };

    OrderIntent {
        kind,
        side,
        position_side,
        quantity,
        price: limit,
        stop_price: stop,
        time_in_force,
    }
}

/// The venue's order-type vocabulary per market segment.
pub fn type_label(market: Market, kind: IntentKind) -> &'static str {
    match (market, kind) {
        (_, IntentKind::Market) => "MARKET",
        (_, IntentKind::Limit) => "LIMIT",
        (Market::Spot, IntentKind::StopMarket) => "STOP_LOSS",
        (_, IntentKind::StopMarket) => "STOP_MARKET",
        (Market::Spot, IntentKind::StopLimit) => "STOP_LOSS_LIMIT",
        (_, IntentKind::StopLimit) => "STOP",
        (Market::Spot, IntentKind::TakeProfitMarket) => "TAKE_PROFIT",
        (_, IntentKind::TakeProfitMarket) => "TAKE_PROFIT_MARKET",
        (Market::Spot, IntentKind::TakeProfitLimit) => "TAKE_PROFIT_LIMIT",
        (_, IntentKind::TakeProfitLimit) => "TAKE_PROFIT",
    }
}

/// Quantize the intent's prices to the symbol tick, build the venue payload
/// and submit it. One diagnostic line is logged before submission.
pub fn dispatch(
    adapter: &dyn MarketAdapter,
    intent: &OrderIntent,
    symbol: &str,
    constraints: &SymbolConstraints,
) -> Result<Value> {
    let label = type_label(adapter.market(), intent.kind);

    let price = intent
        .price
        .map(|p| round_to_step(p, constraints.tick_size));
    let stop_price = intent
        .stop_price
        .map(|p| round_to_step(p, constraints.tick_size));

    let form = OrderForm {
        symbol: symbol.to_string(),
        side: intent.side,
        position_side: intent.position_side,
        type_label: label,
        quantity: intent.quantity,
        price,
        stop_price,
        time_in_force: intent.kind.is_limit_style().then_some(intent.time_in_force),
        client_order_id: Uuid::new_v4().to_string(),
    };

    debug!(
        market = %adapter.market(),
        symbol,
        side = %form.side,
        position_side = ?form.position_side,
        order_type = label,
        quantity = form.quantity,
        price = ?form.price,
        stop_price = ?form.stop_price,
        "submitting order"
    );

    adapter.submit_order(&form)
}
