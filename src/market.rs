// =============================================================================
// Market adapter traits — the seam between the core logic and the venues
// =============================================================================
//
// The candle cache and the order pipeline never branch on a market-type
// string. They are written against these traits; each venue segment provides
// a concrete adapter.
// =============================================================================

use anyhow::Result;
use serde::Serialize;

use crate::candles::Candle;
use crate::types::{DateRange, Market, Position, PositionSide, Side, SymbolConstraints, TimeInForce};

/// Candle-fetching capability. Implemented by every adapter that can serve
/// historical klines, including the data-only KuCoin clients.
///
/// The returned sequence is ordered by open time and inclusive of candles
/// opening at both range endpoints.
pub trait MarketDataSource {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>>;
}

impl<T: MarketDataSource + ?Sized> MarketDataSource for &T {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        (**self).fetch_candles(symbol, timeframe, range)
    }
}

impl<T: MarketDataSource + ?Sized> MarketDataSource for Box<T> {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        (**self).fetch_candles(symbol, timeframe, range)
    }
}

/// Exchange-ready order parameters produced by the dispatcher.
///
/// Prices are already quantized to the symbol's tick size and the type label
/// is already the venue's vocabulary for the chosen market.
#[derive(Debug, Clone, Serialize)]
pub struct OrderForm {
    pub symbol: String,
    pub side: Side,
    /// Hedge-mode position side; never sent by the spot adapter.
    pub position_side: Option<PositionSide>,
    pub type_label: &'static str,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    /// Present only for limit-style orders.
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: String,
}

/// The slice of an open order the batch-cancel path needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: u64,
}

/// Full trading surface of one venue segment.
pub trait MarketAdapter: MarketDataSource {
    fn market(&self) -> Market;

    /// Latest traded price for a symbol.
    fn ticker_price(&self, symbol: &str) -> Result<f64>;

    /// Tick size and minimum quantity/notional, read fresh from the venue.
    fn symbol_constraints(&self, symbol: &str) -> Result<SymbolConstraints>;

    /// Submit a prepared order and return the raw receipt.
    fn submit_order(&self, form: &OrderForm) -> Result<serde_json::Value>;

    /// All open orders, optionally restricted to one symbol.
    fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>>;

    fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()>;

    /// Open positions with non-zero amounts. Spot reports non-zero balances.
    fn positions(&self) -> Result<Vec<Position>>;
}
