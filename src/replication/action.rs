//! Classification of master fills into trade actions.

use crate::error::{ReplicationError, ReplicationResult};
use crate::exchange::{OrderSide, PositionSide};
use std::fmt;

/// What a master fill did to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TradeAction {
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
}

impl TradeAction {
    /// Map an order side and reduce-only flag to the action it represents.
    pub fn from_side(side: OrderSide, reduce_only: bool) -> Self {
        match (side, reduce_only) {
            (OrderSide::Buy, false) => TradeAction::OpenLong,
            (OrderSide::Sell, false) => TradeAction::OpenShort,
            (OrderSide::Sell, true) => TradeAction::CloseLong,
            (OrderSide::Buy, true) => TradeAction::CloseShort,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TradeAction::OpenLong | TradeAction::OpenShort)
    }

    /// Side of the mirrored order.
    pub fn order_side(&self) -> OrderSide {
        match self {
            TradeAction::OpenLong | TradeAction::CloseShort => OrderSide::Buy,
            TradeAction::OpenShort | TradeAction::CloseLong => OrderSide::Sell,
        }
    }

    /// Hedge-mode position the action opens or closes.
    pub fn position_side(&self) -> PositionSide {
        match self {
            TradeAction::OpenLong | TradeAction::CloseLong => PositionSide::Long,
            TradeAction::OpenShort | TradeAction::CloseShort => PositionSide::Short,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::OpenLong => "open long",
            TradeAction::CloseLong => "close long",
            TradeAction::OpenShort => "open short",
            TradeAction::CloseShort => "close short",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a wire side (`BUY` / `SELL`).
pub fn parse_side(side: &str) -> ReplicationResult<OrderSide> {
    match side {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(ReplicationError::InvalidInput(format!(
            "unknown order side {:?}",
            other
        ))),
    }
}

/// Classify a raw fill's `(side, reduceOnly)` pair.
pub fn classify(side: &str, reduce_only: bool) -> ReplicationResult<TradeAction> {
    Ok(TradeAction::from_side(parse_side(side)?, reduce_only))
}
