//! Account aggregate: balances plus the open positions and assets loaded with them

use crate::domain::entities::order::OrderSide;
use crate::domain::entities::position::Position;
use crate::domain::value_objects::Settlement;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account balances as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Fiat balance
    pub balance: Decimal,
    /// Alternate-currency balance for symbols that settle in bitcoin
    pub bitcoin: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: &str, balance: Decimal, bitcoin: Decimal) -> Self {
        Account {
            id: id.to_string(),
            balance,
            bitcoin,
            updated_at: Utc::now(),
        }
    }

    pub fn balance_for(&self, settlement: Settlement) -> Decimal {
        match settlement {
            Settlement::Fiat => self.balance,
            Settlement::AltCoin => self.bitcoin,
        }
    }

    /// Move the balance selected by `settlement` by `delta` (negative debits).
    ///
    /// Returns `None` and leaves the account untouched if the sum overflows.
    pub fn adjust(&mut self, settlement: Settlement, delta: Decimal) -> Option<Decimal> {
        let updated = self.balance_for(settlement).checked_add(delta)?;
        match settlement {
            Settlement::Fiat => self.balance = updated,
            Settlement::AltCoin => self.bitcoin = updated,
        }
        self.updated_at = Utc::now();
        Some(updated)
    }
}

/// Per-currency sub-balance of a multi-asset account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub account_id: String,
    pub currency: String,
    pub balance: Decimal,
}

/// Consistent in-memory view of one account used as reconciliation input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: Account,
    pub positions: Vec<Position>,
    pub assets: Vec<Asset>,
}

impl AccountSnapshot {
    pub fn new(account: Account) -> Self {
        AccountSnapshot {
            account,
            positions: Vec::new(),
            assets: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.push(position);
        self
    }

    pub fn find_position(&self, symbol: &str, side: OrderSide, backtest: bool) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.symbol == symbol && p.side == side && p.backtest == backtest)
    }
}
