//! Cost-ratio sizing and risk trimming.
//!
//! The master fill is expressed as a cost ratio (filled notional over the
//! master's free balance). Followers spend the same ratio of their own free
//! balance, scaled by their proportion. Closes use the same formula, so a
//! mirrored close only approximates the size of the earlier mirrored open.

use crate::error::{ReplicationError, ReplicationResult};
use crate::exchange::{OrderSide, PositionSide};
use crate::replication::action::TradeAction;
use crate::replication::fill::FillEvent;
use crate::replication::rules::SymbolTradingRule;
use rust_decimal::Decimal;
use tracing::debug;

/// Cap on the master's cost ratio for opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimPolicy {
    pub enabled: bool,
    pub ceiling: Decimal,
}

impl TrimPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ceiling: Decimal::ONE,
        }
    }
}

/// Offsetting order that brings the master back under the ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOrder {
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: Decimal,
}

/// Sizing outcome for the master account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterSizing {
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    /// Ratio computed from the fill
    pub cost_ratio: Decimal,
    /// Ratio followers are sized against (the ceiling when a trim fires)
    pub propagated_ratio: Decimal,
    pub trim: Option<TrimOrder>,
}

/// Sizing outcome for one follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerSizing {
    /// `propagated_ratio * proportion`
    pub cost_ratio: Decimal,
    /// Rounded to the symbol step; zero means nothing to submit
    pub quantity: Decimal,
}

/// Filled notional over free balance.
pub fn cost_ratio(
    account: &str,
    filled_quantity: Decimal,
    fill_price: Decimal,
    free_balance: Decimal,
) -> ReplicationResult<Decimal> {
    if free_balance <= Decimal::ZERO {
        return Err(ReplicationError::NoFunds {
            account: account.to_string(),
            balance: free_balance,
        });
    }

    filled_quantity
        .checked_mul(fill_price)
        .and_then(|notional| notional.checked_div(free_balance))
        .ok_or_else(|| ReplicationError::InvalidFill {
            field: "notional",
            value: format!("{} x {}", filled_quantity, fill_price),
        })
}

#[derive(Debug, Clone)]
pub struct SizingEngine {
    trim: TrimPolicy,
}

impl SizingEngine {
    pub fn new(trim: TrimPolicy) -> Self {
        Self { trim }
    }

    pub fn trim_policy(&self) -> TrimPolicy {
        self.trim
    }

    /// Size a fill against the master's free balance.
    ///
    /// Trimming only fires for opens whose ratio exceeds the ceiling and
    /// whose rounded trim quantity is non-zero.
    pub fn size_master(
        &self,
        account: &str,
        fill: &FillEvent,
        action: TradeAction,
        free_balance: Decimal,
        rule: &SymbolTradingRule,
    ) -> ReplicationResult<MasterSizing> {
        let (filled_quantity, fill_price) = fill.quantity_and_price()?;

        if filled_quantity <= Decimal::ZERO {
            return Err(ReplicationError::InvalidFill {
                field: "filled_quantity",
                value: fill.filled_quantity.clone(),
            });
        }
        if fill_price <= Decimal::ZERO {
            return Err(ReplicationError::InvalidFill {
                field: "fill_price",
                value: fill.fill_price.clone(),
            });
        }

        let ratio = cost_ratio(account, filled_quantity, fill_price, free_balance)?;
        let mut sizing = MasterSizing {
            filled_quantity,
            fill_price,
            cost_ratio: ratio,
            propagated_ratio: ratio,
            trim: None,
        };

        if !(self.trim.enabled && action.is_open() && ratio > self.trim.ceiling) {
            return Ok(sizing);
        }

        let excess = ratio - self.trim.ceiling;
        let trim_fraction = excess / ratio;
        let trim_quantity = rule.round_quantity(trim_fraction * filled_quantity)?;

        debug!(
            symbol = %fill.symbol,
            %ratio,
            ceiling = %self.trim.ceiling,
            %excess,
            %trim_fraction,
            %trim_quantity,
            "Cost ratio above ceiling"
        );

        if !trim_quantity.is_zero() {
            sizing.trim = Some(TrimOrder {
                side: action.order_side().opposite(),
                position_side: action.position_side(),
                quantity: trim_quantity,
            });
            sizing.propagated_ratio = self.trim.ceiling;
        }

        Ok(sizing)
    }

    /// Size a follower order from the propagated ratio.
    pub fn size_follower(
        &self,
        account: &str,
        propagated_ratio: Decimal,
        proportion: Decimal,
        fill_price: Decimal,
        free_balance: Decimal,
        rule: &SymbolTradingRule,
    ) -> ReplicationResult<FollowerSizing> {
        if free_balance <= Decimal::ZERO {
            return Err(ReplicationError::NoFunds {
                account: account.to_string(),
                balance: free_balance,
            });
        }

        let ratio = propagated_ratio * proportion;
        let raw_quantity = free_balance
            .checked_mul(ratio)
            .and_then(|spend| spend.checked_div(fill_price))
            .ok_or_else(|| ReplicationError::InvalidFill {
                field: "fill_price",
                value: fill_price.to_string(),
            })?;

        Ok(FollowerSizing {
            cost_ratio: ratio,
            quantity: rule.round_quantity(raw_quantity)?,
        })
    }
}
