// =============================================================================
// Quantity resolution — turn a desired size into a tradable quantity
// =============================================================================

use tracing::error;

use crate::orders::rounding::round_to_step;
use crate::types::SymbolConstraints;

/// Outcome of sizing an order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantityResolution {
    /// A quantity the venue will accept.
    Resolved(f64),
    /// The requested size falls below the venue minimums; no order.
    Infeasible,
    /// The caller supplied both or neither of quantity/notional; no order.
    Unspecified,
}

/// Resolve a desired quantity or notional against the symbol constraints.
///
/// Exactly one of `quantity`/`notional` must be given. A notional converts
/// at `order_price` (the limit price if set, else the stop price, else the
/// live price). The result is floored to the `min_qty` step and rejected as
/// [`QuantityResolution::Infeasible`] when either the quantity or its
/// notional value falls below the venue minimum.
pub fn resolve_quantity(
    quantity: Option<f64>,
    notional: Option<f64>,
    order_price: f64,
    constraints: &SymbolConstraints,
) -> QuantityResolution {
    let requested = match (quantity, notional) {
        (Some(q), None) => q,
        (None, Some(n)) => {
            if order_price <= 0.0 {
                error!(order_price, "cannot convert notional at a non-positive price");
                return QuantityResolution::Infeasible;
            }
            n / order_price
        }
        _ => {
            error!("supply exactly one of quantity or notional");
            return QuantityResolution::Unspecified;
        }
    };

    let qty = round_to_step(requested, constraints.min_qty);
    let notional_value = qty * order_price;

    if notional_value < constraints.min_notional || qty < constraints.min_qty {
        error!(
            quantity = qty,
            notional = notional_value,
            min_qty = constraints.min_qty,
            min_notional = constraints.min_notional,
            "insufficient quantity or notional"
        );
        return QuantityResolution::Infeasible;
    }

    QuantityResolution::Resolved(qty)
}

/// Coin-margined sizing: whole contract counts only, no notional support.
pub fn resolve_contracts(quantity: Option<f64>, notional: Option<f64>) -> QuantityResolution {
    match (quantity, notional) {
        (Some(q), None) => {
            if q > 0.0 && q.fract() == 0.0 {
                QuantityResolution::Resolved(q)
            } else {
                error!(quantity = q, "coin-margined quantity must be a positive whole contract count");
                QuantityResolution::Infeasible
            }
        }
        _ => {
            error!("coin-margined orders size in whole contracts; supply quantity only");
            QuantityResolution::Unspecified
        }
    }
}
