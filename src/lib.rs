// =============================================================================
// tradedesk — synchronous candle cache and order tools for Binance and KuCoin
// =============================================================================
//
// Library surface:
//   * `CandleCache::ensure_range` keeps one parquet table per
//     (symbol, timeframe) key and fetches only the deltas a request needs.
//   * `place_order` reconciles limit/stop inputs, resolves a tradable
//     quantity, quantizes to the venue tick, and dispatches through a
//     `MarketAdapter`.
//   * `positions::{list_positions, close_all, cancel_all}` batch-manage
//     open exposure, treating every item independently.
//
// All I/O is blocking call-and-return; there is no runtime, no streaming,
// and no shared mutable state.
// =============================================================================

pub mod binance;
pub mod candles;
pub mod kucoin;
pub mod market;
pub mod orders;
pub mod positions;
pub mod settings;
pub mod timeparse;
pub mod types;

pub use binance::{BinanceClient, CoinmFuturesMarket, SpotMarket, UsdmFuturesMarket};
pub use candles::{Candle, CandleCache, CandleSeries, CandleStore};
pub use kucoin::{KucoinFutures, KucoinSpot};
pub use market::{MarketAdapter, MarketDataSource, OpenOrder, OrderForm};
pub use orders::{place_order, OrderSpec};
pub use settings::Settings;
pub use types::{DateRange, Market, Position, PositionSide, Side, SymbolConstraints, TimeInForce};
