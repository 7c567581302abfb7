// =============================================================================
// Binance — signed REST transport and the three market adapters
// =============================================================================

pub mod client;
pub mod limits;
pub mod markets;

pub use client::BinanceClient;
pub use limits::UsedWeight;
pub use markets::{CoinmFuturesMarket, SpotMarket, UsdmFuturesMarket};
