//! Shared utilities.

pub mod decimal;

pub use decimal::{parse_decimal_field, parse_granularity, round_down_to_step};
