use crate::domain::entities::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identity of an open position: one row per account, symbol, side and backtest flag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub backtest: bool,
}

/// One open directional exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: String,
    pub symbol: String,
    /// Always `Buy` or `Sell`
    pub side: OrderSide,
    /// Weighted average entry price
    pub price: Decimal,
    pub quantity: Decimal,
    pub backtest: bool,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn open(
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        backtest: bool,
    ) -> Self {
        Position {
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            side: side.position_side(),
            price,
            quantity,
            backtest,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            account_id: self.account_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            backtest: self.backtest,
        }
    }

    /// Add to the position, moving the entry price to the quantity-weighted
    /// average. `None` if the totals overflow.
    pub fn extend(&self, price: Decimal, quantity: Decimal) -> Option<Position> {
        let total_quantity = self.quantity.checked_add(quantity)?;
        let cost = self
            .price
            .checked_mul(self.quantity)?
            .checked_add(price.checked_mul(quantity)?)?;
        let average = cost.checked_div(total_quantity)?;

        Some(Position {
            price: average,
            quantity: total_quantity,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    pub fn reduce(&self, quantity: Decimal) -> Position {
        Position {
            quantity: self.quantity - quantity,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_open_normalizes_closing_side() {
        let position = Position::open("test", "6664", OrderSide::SellClose, dec!(2000), dec!(10), false);
        assert_eq!(position.side, OrderSide::Sell);
    }

    #[test]
    fn test_extend_weights_entry_price() {
        let position = Position::open("test", "6664", OrderSide::Buy, dec!(2000), dec!(50), false);
        let extended = position.extend(dec!(2200), dec!(50)).unwrap();
        assert_eq!(extended.quantity, dec!(100));
        assert_eq!(extended.price, dec!(2100));
        assert_eq!(extended.key(), position.key());
    }

    #[test]
    fn test_extend_uneven_quantities() {
        let position = Position::open("test", "6664", OrderSide::Buy, dec!(100), dec!(1), false);
        let extended = position.extend(dec!(200), dec!(3)).unwrap();
        assert_eq!(extended.price, dec!(175));
        assert_eq!(extended.quantity, dec!(4));
    }

    #[test]
    fn test_extend_overflow_is_none() {
        let position = Position::open("test", "6664", OrderSide::Buy, Decimal::MAX, dec!(1), false);
        assert!(position.extend(Decimal::MAX, dec!(1)).is_none());
    }

    #[test]
    fn test_reduce_keeps_entry_price() {
        let position = Position::open("test", "6664", OrderSide::Buy, dec!(2000), dec!(100), false);
        let reduced = position.reduce(dec!(40));
        assert_eq!(reduced.quantity, dec!(60));
        assert_eq!(reduced.price, dec!(2000));
    }
}
