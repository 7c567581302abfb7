// =============================================================================
// Position operations — list, close-all, cancel-all over a market adapter
// =============================================================================
//
// Batch operations treat every item independently: one failed close or
// cancel is logged and skipped, and the returned count reflects only the
// successes.
// =============================================================================

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::market::MarketAdapter;
use crate::orders::{self, OrderSpec};
use crate::types::{Market, Position, PositionSide, Side};

/// Open positions with optional symbol and side filters.
///
/// Futures sides come from the sign of the position amount; spot entries are
/// non-zero balances and always report `Long`.
pub fn list_positions(
    adapter: &dyn MarketAdapter,
    symbol: Option<&str>,
    side: Option<PositionSide>,
) -> Result<Vec<Position>> {
    debug!(market = %adapter.market(), symbol = ?symbol, "listing open positions");
    let mut positions = adapter.positions()?;
    if let Some(symbol) = symbol {
        let symbol = symbol.to_uppercase();
        positions.retain(|p| p.symbol == symbol);
    }
    if let Some(side) = side {
        positions.retain(|p| p.side == side);
    }
    Ok(positions)
}

/// Close every open position (optionally for one symbol) with an opposing
/// market order. Returns the number of positions successfully closed.
pub fn close_all(adapter: &dyn MarketAdapter, symbol: Option<&str>) -> Result<usize> {
    if adapter.market() == Market::Spot {
        warn!("spot balances are not directional positions; nothing to close");
        return Ok(0);
    }

    let positions = list_positions(adapter, symbol, None)?;
    let mut closed = 0;

    for position in &positions {
        let side = match position.side {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        };
        let mut spec = OrderSpec::market(position.symbol.clone(), side, position.amount.abs());
        spec.position_side = Some(position.side);

        match orders::place_order(adapter, &spec) {
            Ok(Some(_)) => {
                info!(
                    symbol = %position.symbol,
                    position_side = %position.side,
                    amount = position.amount,
                    "position closed"
                );
                closed += 1;
            }
            Ok(None) => {
                warn!(symbol = %position.symbol, "close order was not placed");
            }
            Err(e) => {
                error!(symbol = %position.symbol, error = %e, "failed to close position");
            }
        }
    }

    Ok(closed)
}

/// Cancel every open order (optionally for one symbol). Returns the number
/// of orders successfully cancelled.
pub fn cancel_all(adapter: &dyn MarketAdapter, symbol: Option<&str>) -> Result<usize> {
    let open = adapter.open_orders(symbol)?;
    let mut cancelled = 0;

    for order in &open {
        match adapter.cancel_order(&order.symbol, order.order_id) {
            Ok(()) => {
                debug!(
                    symbol = %order.symbol,
                    order_id = order.order_id,
                    market = %adapter.market(),
                    "order cancelled"
                );
                cancelled += 1;
            }
            Err(e) => {
                error!(order_id = order.order_id, error = %e, "failed to cancel order");
            }
        }
    }

    Ok(cancelled)
}
