//! Per-symbol price and quantity granularity.

use crate::error::{ReplicationError, ReplicationResult};
use crate::exchange::FuturesExchangeInfo;
use crate::utils::{parse_granularity, round_down_to_step};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Exchange-mandated granularity for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTradingRule {
    pub symbol: String,
    /// `PRICE_FILTER.tickSize`
    pub price_tick: String,
    /// `LOT_SIZE.stepSize`
    pub quantity_step: String,
}

impl SymbolTradingRule {
    pub fn new(
        symbol: impl Into<String>,
        price_tick: impl Into<String>,
        quantity_step: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price_tick: price_tick.into(),
            quantity_step: quantity_step.into(),
        }
    }

    /// Round a quantity down to the symbol's step.
    pub fn round_quantity(&self, quantity: Decimal) -> ReplicationResult<Decimal> {
        round_down_to_step(quantity, &self.quantity_step)
    }

    /// Round a price down to the symbol's tick.
    pub fn round_price(&self, price: Decimal) -> ReplicationResult<Decimal> {
        round_down_to_step(price, &self.price_tick)
    }
}

/// Read-only rule table keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolRules {
    rules: HashMap<String, SymbolTradingRule>,
}

impl SymbolRules {
    /// Build the table from exchange metadata, keeping perpetual contracts
    /// quoted in `quote_asset` that are currently trading.
    pub fn from_exchange_info(info: &FuturesExchangeInfo, quote_asset: &str) -> Self {
        let mut rules = HashMap::new();

        for symbol in &info.symbols {
            if symbol.quote_asset != quote_asset
                || symbol.contract_type != "PERPETUAL"
                || symbol.status != "TRADING"
            {
                continue;
            }

            let (Some(tick), Some(step)) = (symbol.tick_size(), symbol.step_size()) else {
                warn!(symbol = %symbol.symbol, "Missing PRICE_FILTER or LOT_SIZE, skipping");
                continue;
            };

            if parse_granularity(tick).is_err() || parse_granularity(step).is_err() {
                warn!(symbol = %symbol.symbol, %tick, %step, "Invalid granularity, skipping");
                continue;
            }

            rules.insert(
                symbol.symbol.clone(),
                SymbolTradingRule::new(symbol.symbol.clone(), tick, step),
            );
        }

        debug!(count = rules.len(), "Symbol rules loaded");
        Self { rules }
    }

    pub fn get(&self, symbol: &str) -> ReplicationResult<&SymbolTradingRule> {
        self.rules
            .get(symbol)
            .ok_or_else(|| ReplicationError::UnknownSymbol(symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<SymbolTradingRule> for SymbolRules {
    fn from_iter<I: IntoIterator<Item = SymbolTradingRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().map(|r| (r.symbol.clone(), r)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exchange_info() -> FuturesExchangeInfo {
        serde_json::from_value(serde_json::json!({
            "symbols": [
                {
                    "symbol": "BTCUSDT", "contractType": "PERPETUAL", "status": "TRADING",
                    "baseAsset": "BTC", "quoteAsset": "USDT",
                    "filters": [
                        {"filterType": "PRICE_FILTER", "tickSize": "0.10"},
                        {"filterType": "LOT_SIZE", "stepSize": "0.001"}
                    ]
                },
                {
                    "symbol": "BTCUSDT_250627", "contractType": "CURRENT_QUARTER", "status": "TRADING",
                    "baseAsset": "BTC", "quoteAsset": "USDT",
                    "filters": [
                        {"filterType": "PRICE_FILTER", "tickSize": "0.10"},
                        {"filterType": "LOT_SIZE", "stepSize": "0.001"}
                    ]
                },
                {
                    "symbol": "ETHBUSD", "contractType": "PERPETUAL", "status": "TRADING",
                    "baseAsset": "ETH", "quoteAsset": "BUSD",
                    "filters": [
                        {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                        {"filterType": "LOT_SIZE", "stepSize": "0.001"}
                    ]
                },
                {
                    "symbol": "LUNAUSDT", "contractType": "PERPETUAL", "status": "SETTLING",
                    "baseAsset": "LUNA", "quoteAsset": "USDT",
                    "filters": []
                },
                {
                    "symbol": "DOGEUSDT", "contractType": "PERPETUAL", "status": "TRADING",
                    "baseAsset": "DOGE", "quoteAsset": "USDT",
                    "filters": [{"filterType": "PRICE_FILTER", "tickSize": "0.000010"}]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_keeps_trading_usdt_perpetuals_only() {
        let rules = SymbolRules::from_exchange_info(&exchange_info(), "USDT");

        assert_eq!(rules.len(), 1);
        let btc = rules.get("BTCUSDT").unwrap();
        assert_eq!(btc.price_tick, "0.10");
        assert_eq!(btc.quantity_step, "0.001");
        assert!(matches!(
            rules.get("DOGEUSDT"),
            Err(ReplicationError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_rule_rounding() {
        let rule = SymbolTradingRule::new("BTCUSDT", "0.10", "0.001");
        assert_eq!(rule.round_quantity(dec!(0.12345)).unwrap().to_string(), "0.123");
        assert_eq!(rule.round_price(dec!(50123.456)).unwrap().to_string(), "50123.40");
    }
}
