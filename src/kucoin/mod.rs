// =============================================================================
// KuCoin — market-data clients for the spot and futures venues
// =============================================================================

pub mod client;

pub use client::{KucoinFutures, KucoinSpot};
