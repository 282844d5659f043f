//! Fill replication: classification, sizing, trimming and fan-out.
//!
//! A master fill flows through [`classify`], the [`SizingEngine`] (master
//! sizing and optional trim), then the [`FanOutDispatcher`] which sizes and
//! submits one order per enabled follower.

mod action;
mod context;
mod dispatcher;
mod fill;
mod rules;
mod sizing;

pub use action::{classify, parse_side, TradeAction};
pub use context::{FollowerAccount, ReplicationContext};
pub use dispatcher::{
    DispatchReport, FanOutDispatcher, FillOutcome, FollowerOutcome, FollowerReport, TrimOutcome,
};
pub use fill::{FillEvent, EXECUTION_TYPE_TRADE, ORDER_STATUS_FILLED};
pub use rules::{SymbolRules, SymbolTradingRule};
pub use sizing::{cost_ratio, FollowerSizing, MasterSizing, SizingEngine, TrimOrder, TrimPolicy};
