// =============================================================================
// Binance market adapters — spot, USD-margined, coin-margined
// =============================================================================
//
// Three concrete `MarketAdapter` variants over one shared transport. Each
// maps the trait surface onto its endpoint family and normalizes that
// family's payload quirks (coinm tickers arrive as arrays, spot positions
// are account balances, futures exchange info cannot be filtered
// server-side).
// =============================================================================

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::binance::client::{ApiBase, BinanceClient};
use crate::candles::Candle;
use crate::market::{MarketAdapter, MarketDataSource, OpenOrder, OrderForm};
use crate::types::{DateRange, Market, Position, PositionSide, SymbolConstraints};

// ---------------------------------------------------------------------------
// Adapter structs
// ---------------------------------------------------------------------------

/// Spot market adapter (`api.binance.com`).
pub struct SpotMarket {
    client: Arc<BinanceClient>,
}

/// USD-margined futures adapter (`fapi.binance.com`).
pub struct UsdmFuturesMarket {
    client: Arc<BinanceClient>,
}

/// Coin-margined futures adapter (`dapi.binance.com`).
pub struct CoinmFuturesMarket {
    client: Arc<BinanceClient>,
}

impl SpotMarket {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self { client }
    }
}

impl UsdmFuturesMarket {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self { client }
    }
}

impl CoinmFuturesMarket {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self { client }
    }
}

// ---------------------------------------------------------------------------
// Spot
// ---------------------------------------------------------------------------

impl MarketDataSource for SpotMarket {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        self.client
            .fetch_klines(ApiBase::Spot, "/api/v3/klines", symbol, timeframe, range)
    }
}

impl MarketAdapter for SpotMarket {
    fn market(&self) -> Market {
        Market::Spot
    }

    fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .client
            .get_public(ApiBase::Spot, "/api/v3/ticker/price", &format!("symbol={symbol}"))?;
        parse_ticker_price(&body)
    }

    fn symbol_constraints(&self, symbol: &str) -> Result<SymbolConstraints> {
        // Spot exchangeInfo supports server-side symbol filtering.
        let body = self
            .client
            .get_public(ApiBase::Spot, "/api/v3/exchangeInfo", &format!("symbol={symbol}"))?;
        let info = find_symbol(&body, symbol)?;
        parse_constraints(info, symbol)
    }

    fn submit_order(&self, form: &OrderForm) -> Result<Value> {
        // Spot has no hedge mode; positionSide is never sent.
        let params = order_params(form, false);
        self.client.post_signed(ApiBase::Spot, "/api/v3/order", &params)
    }

    fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>> {
        let params = symbol.map(|s| format!("symbol={s}")).unwrap_or_default();
        let body = self.client.get_signed(ApiBase::Spot, "/api/v3/openOrders", &params)?;
        parse_open_orders(&body)
    }

    fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        self.client
            .delete_signed(ApiBase::Spot, "/api/v3/order", &params)?;
        debug!(symbol, order_id, "spot order cancelled");
        Ok(())
    }

    /// Spot "positions" are the non-zero account balances (free + locked).
    fn positions(&self) -> Result<Vec<Position>> {
        let body = self.client.get_signed(ApiBase::Spot, "/api/v3/account", "")?;
        parse_spot_balances(&body)
    }
}

// ---------------------------------------------------------------------------
// USD-margined futures
// ---------------------------------------------------------------------------

impl MarketDataSource for UsdmFuturesMarket {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        self.client
            .fetch_klines(ApiBase::Usdm, "/fapi/v1/klines", symbol, timeframe, range)
    }
}

impl MarketAdapter for UsdmFuturesMarket {
    fn market(&self) -> Market {
        Market::UsdmFutures
    }

    fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .client
            .get_public(ApiBase::Usdm, "/fapi/v1/ticker/price", &format!("symbol={symbol}"))?;
        parse_ticker_price(&body)
    }

    fn symbol_constraints(&self, symbol: &str) -> Result<SymbolConstraints> {
        // Futures exchangeInfo has no symbol parameter; filter client-side.
        let body = self.client.get_public(ApiBase::Usdm, "/fapi/v1/exchangeInfo", "")?;
        let info = find_symbol(&body, symbol)?;
        parse_constraints(info, symbol)
    }

    fn submit_order(&self, form: &OrderForm) -> Result<Value> {
        let params = order_params(form, true);
        self.client.post_signed(ApiBase::Usdm, "/fapi/v1/order", &params)
    }

    fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>> {
        let params = symbol.map(|s| format!("symbol={s}")).unwrap_or_default();
        let body = self.client.get_signed(ApiBase::Usdm, "/fapi/v1/openOrders", &params)?;
        parse_open_orders(&body)
    }

    fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        self.client
            .delete_signed(ApiBase::Usdm, "/fapi/v1/order", &params)?;
        debug!(symbol, order_id, "usdm order cancelled");
        Ok(())
    }

    fn positions(&self) -> Result<Vec<Position>> {
        let body = self.client.get_signed(ApiBase::Usdm, "/fapi/v2/positionRisk", "")?;
        parse_futures_positions(&body)
    }
}

// ---------------------------------------------------------------------------
// Coin-margined futures
// ---------------------------------------------------------------------------

impl MarketDataSource for CoinmFuturesMarket {
    fn fetch_candles(&self, symbol: &str, timeframe: &str, range: &DateRange) -> Result<Vec<Candle>> {
        self.client
            .fetch_klines(ApiBase::Coinm, "/dapi/v1/klines", symbol, timeframe, range)
    }
}

impl MarketAdapter for CoinmFuturesMarket {
    fn market(&self) -> Market {
        Market::CoinmFutures
    }

    fn ticker_price(&self, symbol: &str) -> Result<f64> {
        // The coin-margined ticker endpoint returns an array of entries.
        let body = self
            .client
            .get_public(ApiBase::Coinm, "/dapi/v1/ticker/price", &format!("symbol={symbol}"))?;
        parse_ticker_price(&body)
    }

    fn symbol_constraints(&self, symbol: &str) -> Result<SymbolConstraints> {
        let body = self.client.get_public(ApiBase::Coinm, "/dapi/v1/exchangeInfo", "")?;
        let info = find_symbol(&body, symbol)?;
        parse_constraints(info, symbol)
    }

    fn submit_order(&self, form: &OrderForm) -> Result<Value> {
        let params = order_params(form, true);
        self.client.post_signed(ApiBase::Coinm, "/dapi/v1/order", &params)
    }

    fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>> {
        let params = symbol.map(|s| format!("symbol={s}")).unwrap_or_default();
        let body = self.client.get_signed(ApiBase::Coinm, "/dapi/v1/openOrders", &params)?;
        parse_open_orders(&body)
    }

    fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        self.client
            .delete_signed(ApiBase::Coinm, "/dapi/v1/order", &params)?;
        debug!(symbol, order_id, "coinm order cancelled");
        Ok(())
    }

    fn positions(&self) -> Result<Vec<Position>> {
        let body = self.client.get_signed(ApiBase::Coinm, "/dapi/v1/positionRisk", "")?;
        parse_futures_positions(&body)
    }
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

/// Ticker price from either an object or an array-of-objects payload.
fn parse_ticker_price(body: &Value) -> Result<f64> {
    let entry = if let Some(arr) = body.as_array() {
        arr.first().context("ticker response array is empty")?
    } else {
        body
    };
    BinanceClient::parse_str_f64(&entry["price"]).context("ticker response has no price")
}

/// Locate one symbol's entry in an exchangeInfo response.
fn find_symbol<'a>(body: &'a Value, symbol: &str) -> Result<&'a Value> {
    body["symbols"]
        .as_array()
        .context("exchangeInfo response has no symbols array")?
        .iter()
        .find(|entry| entry["symbol"].as_str() == Some(symbol))
        .with_context(|| format!("symbol {symbol} not found in exchange info"))
}

/// Read trading constraints out of a symbol's filter list.
///
/// Filters are matched by `filterType`, not position: spot reports
/// MIN_NOTIONAL/minNotional where USD-margined futures report
/// NOTIONAL/notional, and coin-margined symbols have no notional filter at
/// all (min_notional stays 0).
fn parse_constraints(info: &Value, symbol: &str) -> Result<SymbolConstraints> {
    let filters = info["filters"]
        .as_array()
        .with_context(|| format!("exchange info for {symbol} has no filters"))?;

    let mut constraints = SymbolConstraints {
        tick_size: 0.0,
        min_qty: 0.0,
        min_notional: 0.0,
    };

    for filter in filters {
        match filter["filterType"].as_str() {
            Some("PRICE_FILTER") => {
                constraints.tick_size = BinanceClient::parse_str_f64(&filter["tickSize"])?;
            }
            Some("LOT_SIZE") => {
                constraints.min_qty = BinanceClient::parse_str_f64(&filter["minQty"])?;
            }
            Some("MIN_NOTIONAL") => {
                constraints.min_notional = BinanceClient::parse_str_f64(&filter["minNotional"])?;
            }
            Some("NOTIONAL") => {
                constraints.min_notional = BinanceClient::parse_str_f64(&filter["notional"])?;
            }
            _ => {}
        }
    }

    if constraints.tick_size <= 0.0 {
        bail!("exchange info for {symbol} is missing PRICE_FILTER");
    }
    Ok(constraints)
}

/// Serialize an order form into a Binance query string.
fn order_params(form: &OrderForm, with_position_side: bool) -> String {
    let mut params = format!(
        "symbol={}&side={}&type={}&quantity={}",
        form.symbol, form.side, form.type_label, form.quantity
    );
    if with_position_side {
        if let Some(ps) = form.position_side {
            params.push_str(&format!("&positionSide={ps}"));
        }
    }
    if let Some(price) = form.price {
        params.push_str(&format!("&price={price}"));
    }
    if let Some(stop) = form.stop_price {
        params.push_str(&format!("&stopPrice={stop}"));
    }
    if let Some(tif) = form.time_in_force {
        params.push_str(&format!("&timeInForce={tif}"));
    }
    params.push_str(&format!("&newClientOrderId={}", form.client_order_id));
    params
}

fn parse_open_orders(body: &Value) -> Result<Vec<OpenOrder>> {
    let rows = body.as_array().context("openOrders response is not an array")?;
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        orders.push(OpenOrder {
            symbol: row["symbol"]
                .as_str()
                .context("open order has no symbol")?
                .to_string(),
            order_id: row["orderId"].as_u64().context("open order has no orderId")?,
        });
    }
    Ok(orders)
}

/// Futures positionRisk rows with non-zero amounts, side from the sign.
fn parse_futures_positions(body: &Value) -> Result<Vec<Position>> {
    let rows = body.as_array().context("positionRisk response is not an array")?;
    let mut positions = Vec::new();
    for row in rows {
        let amount = BinanceClient::parse_str_f64(&row["positionAmt"])
            .context("position has no positionAmt")?;
        if amount == 0.0 {
            continue;
        }
        positions.push(Position {
            symbol: row["symbol"]
                .as_str()
                .context("position has no symbol")?
                .to_string(),
            side: PositionSide::from_amount(amount),
            amount,
        });
    }
    Ok(positions)
}

/// Non-zero spot balances (free + locked) as long positions.
fn parse_spot_balances(body: &Value) -> Result<Vec<Position>> {
    let rows = body["balances"]
        .as_array()
        .context("account response has no balances array")?;
    let mut positions = Vec::new();
    for row in rows {
        let free = BinanceClient::parse_str_f64(&row["free"]).unwrap_or(0.0);
        let locked = BinanceClient::parse_str_f64(&row["locked"]).unwrap_or(0.0);
        let amount = free + locked;
        if amount == 0.0 {
            continue;
        }
        positions.push(Position {
            symbol: row["asset"]
                .as_str()
                .context("balance has no asset")?
                .to_string(),
            side: PositionSide::Long,
            amount,
        });
    }
    Ok(positions)
}
