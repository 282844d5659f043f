//! Fill notifications from the master account.

use crate::error::ReplicationResult;
use crate::utils::parse_decimal_field;
use rust_decimal::Decimal;
use serde::Serialize;

pub const EXECUTION_TYPE_TRADE: &str = "TRADE";
pub const ORDER_STATUS_FILLED: &str = "FILLED";

/// A fill on the master account, as decoded from an `ORDER_TRADE_UPDATE`.
///
/// Numeric fields are kept in their wire form and parsed during sizing, so
/// a malformed value only skips this fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillEvent {
    pub symbol: String,
    /// `BUY` or `SELL`
    pub side: String,
    pub reduce_only: bool,
    pub execution_type: String,
    pub order_status: String,
    /// Accumulated filled quantity of the order
    pub filled_quantity: String,
    /// Price of the last fill
    pub fill_price: String,
    pub order_id: i64,
}

impl FillEvent {
    /// Whether this notification is a completed trade that should be mirrored.
    pub fn is_completed_trade(&self) -> bool {
        self.execution_type == EXECUTION_TYPE_TRADE && self.order_status == ORDER_STATUS_FILLED
    }

    /// Parsed `(filled_quantity, fill_price)`.
    pub fn quantity_and_price(&self) -> ReplicationResult<(Decimal, Decimal)> {
        let quantity = parse_decimal_field("filled_quantity", &self.filled_quantity)?;
        let price = parse_decimal_field("fill_price", &self.fill_price)?;
        Ok((quantity, price))
    }
}

#[cfg(test)]
pub(crate) fn test_fill(side: &str, reduce_only: bool, quantity: &str, price: &str) -> FillEvent {
    FillEvent {
        symbol: "BTCUSDT".to_string(),
        side: side.to_string(),
        reduce_only,
        execution_type: EXECUTION_TYPE_TRADE.to_string(),
        order_status: ORDER_STATUS_FILLED.to_string(),
        filled_quantity: quantity.to_string(),
        fill_price: price.to_string(),
        order_id: 8886774,
    }
}
