//! Decimal helpers for exchange-conforming order literals.

use crate::error::{ReplicationError, ReplicationResult};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse an exchange granularity (tick or step size) such as `"0.001"`.
///
/// The parsed value keeps the scale of its textual form, so `"0.00100000"`
/// carries eight fractional digits.
pub fn parse_granularity(granularity: &str) -> ReplicationResult<Decimal> {
    let invalid = || ReplicationError::InvalidGranularity {
        granularity: granularity.to_string(),
    };
    let step = Decimal::from_str(granularity.trim()).map_err(|_| invalid())?;
    if step <= Decimal::ZERO {
        return Err(invalid());
    }
    Ok(step)
}

/// Round `value` down to a multiple of `granularity`.
///
/// The result carries exactly as many fractional digits as `granularity`
/// does, so its `Display` output is the literal the order API expects
/// (`0.25` on step `"0.001"` renders as `"0.250"`). Zero and negative
/// values produce zero; callers must not submit a zero quantity.
pub fn round_down_to_step(value: Decimal, granularity: &str) -> ReplicationResult<Decimal> {
    let step = parse_granularity(granularity)?;
    let scale = step.scale();

    if value <= Decimal::ZERO {
        return Ok(Decimal::new(0, scale));
    }

    let steps = value
        .checked_div(step)
        .ok_or_else(|| ReplicationError::InvalidInput(format!("{value} out of range")))?
        .floor();
    let mut rounded = steps
        .checked_mul(step)
        .ok_or_else(|| ReplicationError::InvalidInput(format!("{value} out of range")))?;
    rounded.rescale(scale);
    Ok(rounded)
}

/// Parse a decimal string field of an exchange payload.
pub fn parse_decimal_field(field: &'static str, value: &str) -> ReplicationResult<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| ReplicationError::InvalidFill {
        field,
        value: value.to_string(),
    })
}
