//! Fee and realized PnL calculation
//!
//! Pure functions only. The fee table is injected through [`FeeSchedule`] so
//! the engine never hard-codes venue pricing.

use crate::domain::entities::order::OrderSide;
use crate::domain::value_objects::Settlement;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::warn;

/// Per-symbol fee and settlement lookup
pub trait FeeSchedule: Send + Sync {
    /// Fee charged for one leg of a trade on `symbol`
    fn fee(&self, symbol: &str) -> Decimal;

    /// Balance a trade on `symbol` settles against
    fn settlement(&self, symbol: &str) -> Settlement;
}

/// Trade-unit table: a default fee, per-symbol overrides, and the set of
/// symbols that settle in the alternate currency
#[derive(Debug, Clone, Default)]
pub struct TradeUnitTable {
    default_fee: Decimal,
    overrides: HashMap<String, Decimal>,
    altcoin_symbols: HashSet<String>,
}

impl TradeUnitTable {
    pub fn new(default_fee: Decimal) -> Self {
        Self {
            default_fee,
            overrides: HashMap::new(),
            altcoin_symbols: HashSet::new(),
        }
    }

    pub fn with_fee(mut self, symbol: &str, fee: Decimal) -> Self {
        self.overrides.insert(symbol.to_string(), fee);
        self
    }

    pub fn with_altcoin(mut self, symbol: &str) -> Self {
        self.altcoin_symbols.insert(symbol.to_string());
        self
    }

    /// Parse `SYM=fee,SYM=fee` pairs, skipping malformed entries with a warning
    pub fn parse_overrides(raw: &str) -> HashMap<String, Decimal> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let (symbol, fee) = match entry.split_once('=') {
                    Some(pair) => pair,
                    None => {
                        warn!("Ignoring fee override without '=': {}", entry);
                        return None;
                    }
                };
                match Decimal::from_str(fee.trim()) {
                    Ok(fee) if !fee.is_sign_negative() => Some((symbol.trim().to_string(), fee)),
                    _ => {
                        warn!("Ignoring invalid fee override: {}", entry);
                        None
                    }
                }
            })
            .collect()
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, Decimal>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn with_altcoins<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.altcoin_symbols.extend(symbols.into_iter().map(Into::into));
        self
    }
}

impl FeeSchedule for TradeUnitTable {
    fn fee(&self, symbol: &str) -> Decimal {
        self.overrides
            .get(symbol)
            .copied()
            .unwrap_or(self.default_fee)
    }

    fn settlement(&self, symbol: &str) -> Settlement {
        if self.altcoin_symbols.contains(symbol) {
            Settlement::AltCoin
        } else {
            Settlement::Fiat
        }
    }
}

/// Realized profit of closing `quantity` of a position.
///
/// `position_side` is the side of the position being closed; `total_fee`
/// covers both legs. `None` if the amount overflows.
pub fn profit(
    position_side: OrderSide,
    open: Decimal,
    close: Decimal,
    quantity: Decimal,
    total_fee: Decimal,
) -> Option<Decimal> {
    let movement = match position_side.position_side() {
        OrderSide::Sell => open.checked_sub(close)?,
        _ => close.checked_sub(open)?,
    };
    movement.checked_mul(quantity)?.checked_sub(total_fee)
}
