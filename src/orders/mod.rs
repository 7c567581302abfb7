// =============================================================================
// Order pipeline — reconcile prices, resolve quantity, quantize, dispatch
// =============================================================================

pub mod dispatch;
pub mod quantity;
pub mod reconcile;
pub mod rounding;

use anyhow::Result;
use serde_json::Value;
use tracing::error;

use crate::market::MarketAdapter;
use crate::types::{Market, PositionSide, Side, TimeInForce};

pub use dispatch::{build_intent, dispatch, type_label, IntentKind, OrderIntent};
pub use quantity::{resolve_contracts, resolve_quantity, QuantityResolution};
pub use reconcile::{classify, reconcile_prices, PriceCase};
pub use rounding::round_to_step;

/// Fractional tolerance used to decide whether two prices are effectively
/// the same level.
pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.001;

/// Everything the caller specifies about a desired order.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub symbol: String,
    pub side: Side,
    /// Size in base units (contracts for coin-margined futures). Exactly one
    /// of `quantity`/`notional` must be set.
    pub quantity: Option<f64>,
    /// Size as a quote-currency value.
    pub notional: Option<f64>,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub position_side: Option<PositionSide>,
    pub time_in_force: TimeInForce,
    pub price_tolerance: f64,
}

impl OrderSpec {
    /// A plain market order of `quantity` base units.
    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity: Some(quantity),
            notional: None,
            limit_price: None,
            stop_price: None,
            position_side: None,
            time_in_force: TimeInForce::Gtc,
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
        }
    }
}

/// Run the full order pipeline against one market adapter.
///
/// Returns `Ok(Some(receipt))` on submission, `Ok(None)` when the order was
/// not placed because of a user input error or an infeasible size (both
/// already logged), and `Err` when the venue itself fails.
pub fn place_order(adapter: &dyn MarketAdapter, spec: &OrderSpec) -> Result<Option<Value>> {
    let symbol = spec.symbol.to_uppercase();

    let constraints = adapter.symbol_constraints(&symbol)?;
    let price = adapter.ticker_price(&symbol)?;

    // A notional converts at the price the order would actually rest at.
    let order_price = spec.limit_price.or(spec.stop_price).unwrap_or(price);

    let resolution = if adapter.market() == Market::CoinmFutures {
        quantity::resolve_contracts(spec.quantity, spec.notional)
    } else {
        quantity::resolve_quantity(spec.quantity, spec.notional, order_price, &constraints)
    };
    let qty = match resolution {
        QuantityResolution::Resolved(q) => q,
        QuantityResolution::Infeasible | QuantityResolution::Unspecified => {
            error!(symbol = %symbol, market = %adapter.market(), "order aborted, no tradable quantity");
            return Ok(None);
        }
    };

    let (limit, stop) = reconcile::reconcile_prices(
        price,
        spec.limit_price,
        spec.stop_price,
        spec.side,
        spec.price_tolerance,
    );

    let intent = dispatch::build_intent(
        price,
        limit,
        stop,
        spec.side,
        spec.position_side,
        qty,
        spec.time_in_force,
    );

    let receipt = dispatch::dispatch(adapter, &intent, &symbol, &constraints)?;
    Ok(Some(receipt))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::candles::Candle;
    use crate::market::{MarketDataSource, OpenOrder, OrderForm};
    use crate::types::{DateRange, Position, SymbolConstraints};

    /// Adapter that records submitted forms instead of hitting a venue.
    struct RecordingAdapter {
        market: Market,
        price: f64,
        constraints: SymbolConstraints,
        submitted: RefCell<Vec<OrderForm>>,
    }

    impl RecordingAdapter {
        fn new(market: Market, price: f64) -> Self {
            Self {
                market,
                price,
                constraints: SymbolConstraints {
                    tick_size: 0.1,
                    min_qty: 0.001,
                    min_notional: 10.0,
                },
                submitted: RefCell::new(Vec::new()),
            }
        }

        fn last_form(&self) -> OrderForm {
            self.submitted.borrow().last().cloned().expect("no order submitted")
        }
    }

    impl MarketDataSource for RecordingAdapter {
        fn fetch_candles(&self, _: &str, _: &str, _: &DateRange) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    impl MarketAdapter for RecordingAdapter {
        fn market(&self) -> Market {
            self.market
        }

        fn ticker_price(&self, _: &str) -> anyhow::Result<f64> {
            Ok(self.price)
        }

        fn symbol_constraints(&self, _: &str) -> anyhow::Result<SymbolConstraints> {
            Ok(self.constraints)
        }

        fn submit_order(&self, form: &OrderForm) -> anyhow::Result<serde_json::Value> {
            self.submitted.borrow_mut().push(form.clone());
            Ok(json!({ "orderId": 42, "status": "NEW" }))
        }

        fn open_orders(&self, _: Option<&str>) -> anyhow::Result<Vec<OpenOrder>> {
            Ok(Vec::new())
        }

        fn cancel_order(&self, _: &str, _: u64) -> anyhow::Result<()> {
            Ok(())
        }

        fn positions(&self) -> anyhow::Result<Vec<Position>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn market_order_sends_quantity_only() {
        let adapter = RecordingAdapter::new(Market::Spot, 50_000.0);
        let spec = OrderSpec::market("btcusdt", Side::Buy, 0.01);

        let receipt = place_order(&adapter, &spec).unwrap();
        assert!(receipt.is_some());

        let form = adapter.last_form();
        assert_eq!(form.symbol, "BTCUSDT");
        assert_eq!(form.type_label, "MARKET");
        assert_eq!(form.quantity, 0.01);
        assert_eq!(form.price, None);
        assert_eq!(form.stop_price, None);
        assert_eq!(form.time_in_force, None);
    }

    #[test]
    fn limit_order_quantizes_price_to_tick() {
        let adapter = RecordingAdapter::new(Market::Spot, 50_000.0);
        let mut spec = OrderSpec::market("BTCUSDT", Side::Buy, 0.01);
        spec.limit_price = Some(49_000.07);

        place_order(&adapter, &spec).unwrap();

        let form = adapter.last_form();
        assert_eq!(form.type_label, "LIMIT");
        assert_eq!(form.price, Some(49_000.0));
        assert_eq!(form.time_in_force, Some(TimeInForce::Gtc));
    }

    #[test]
    fn inconsistent_buy_limit_dispatches_as_spot_stop_loss() {
        let adapter = RecordingAdapter::new(Market::Spot, 100.0);
        let mut spec = OrderSpec::market("ETHUSDT", Side::Buy, 1.0);
        spec.limit_price = Some(105.0);

        place_order(&adapter, &spec).unwrap();

        let form = adapter.last_form();
        assert_eq!(form.type_label, "STOP_LOSS");
        assert_eq!(form.price, None);
        assert_eq!(form.stop_price, Some(105.0));
        assert_eq!(form.time_in_force, None);
    }

    #[test]
    fn futures_stop_uses_futures_vocabulary() {
        let adapter = RecordingAdapter::new(Market::UsdmFutures, 100.0);
        let mut spec = OrderSpec::market("ETHUSDT", Side::Sell, 1.0);
        spec.stop_price = Some(90.0);
        spec.position_side = Some(PositionSide::Long);

        place_order(&adapter, &spec).unwrap();

        let form = adapter.last_form();
        assert_eq!(form.type_label, "STOP_MARKET");
        assert_eq!(form.stop_price, Some(90.0));
        assert_eq!(form.position_side, Some(PositionSide::Long));
    }

    #[test]
    fn infeasible_quantity_places_nothing() {
        let adapter = RecordingAdapter::new(Market::Spot, 50_000.0);
        let spec = OrderSpec::market("BTCUSDT", Side::Buy, 0.0001);

        let receipt = place_order(&adapter, &spec).unwrap();
        assert!(receipt.is_none());
        assert!(adapter.submitted.borrow().is_empty());
    }

    #[test]
    fn ambiguous_size_places_nothing() {
        let adapter = RecordingAdapter::new(Market::Spot, 50_000.0);
        let mut spec = OrderSpec::market("BTCUSDT", Side::Buy, 0.01);
        spec.notional = Some(500.0);

        let receipt = place_order(&adapter, &spec).unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn notional_sizes_at_limit_price() {
        let adapter = RecordingAdapter::new(Market::Spot, 50_000.0);
        let mut spec = OrderSpec::market("BTCUSDT", Side::Buy, 1.0);
        spec.quantity = None;
        spec.notional = Some(490.0);
        spec.limit_price = Some(49_000.0);

        place_order(&adapter, &spec).unwrap();

        // 490 / 49_000 = 0.01 base units at the resting price.
        let form = adapter.last_form();
        assert_eq!(form.quantity, 0.01);
    }

    #[test]
    fn coinm_requires_whole_contracts() {
        let adapter = RecordingAdapter::new(Market::CoinmFutures, 50_000.0);

        let spec = OrderSpec::market("BTCUSD_PERP", Side::Buy, 2.0);
        assert!(place_order(&adapter, &spec).unwrap().is_some());
        assert_eq!(adapter.last_form().quantity, 2.0);

        let spec = OrderSpec::market("BTCUSD_PERP", Side::Buy, 1.5);
        assert!(place_order(&adapter, &spec).unwrap().is_none());
    }
}
