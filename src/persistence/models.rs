//! Database Models
//!
//! Row structs as stored in SQLite and their conversion into domain types.
//! Decimals travel as TEXT; a value that fails to parse surfaces as
//! `StoreError::Corrupt`.

use crate::domain::entities::account::{Account, Asset};
use crate::domain::entities::earning::Earning;
use crate::domain::entities::order::Order;
use crate::domain::entities::position::Position;
use crate::domain::entities::signal::Signal;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::str::FromStr;

pub(crate) fn decimal(column: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Corrupt(format!("{} is not a decimal ({}): {}", column, raw, e)))
}

fn optional_decimal(column: &str, raw: Option<&str>) -> Result<Option<Decimal>, StoreError> {
    raw.map(|value| decimal(column, value)).transpose()
}

fn parsed<T>(column: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

/// Account record in database
#[derive(Debug, Clone, FromRow)]
pub struct AccountRecord {
    pub id: String,
    pub balance: String,
    pub bitcoin: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRecord> for Account {
    type Error = StoreError;

    fn try_from(record: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Account {
            balance: decimal("accounts.balance", &record.balance)?,
            bitcoin: decimal("accounts.bitcoin", &record.bitcoin)?,
            id: record.id,
            updated_at: record.updated_at,
        })
    }
}

/// Asset record in database
#[derive(Debug, Clone, FromRow)]
pub struct AssetRecord {
    pub account_id: String,
    pub currency: String,
    pub balance: String,
}

impl TryFrom<AssetRecord> for Asset {
    type Error = StoreError;

    fn try_from(record: AssetRecord) -> Result<Self, Self::Error> {
        Ok(Asset {
            balance: decimal("assets.balance", &record.balance)?,
            account_id: record.account_id,
            currency: record.currency,
        })
    }
}

/// Position record in database
#[derive(Debug, Clone, FromRow)]
pub struct PositionRecord {
    pub account_id: String,
    pub symbol: String,
    pub side: String,
    pub backtest: bool,
    pub price: String,
    pub quantity: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PositionRecord> for Position {
    type Error = StoreError;

    fn try_from(record: PositionRecord) -> Result<Self, Self::Error> {
        Ok(Position {
            side: parsed("positions.side", &record.side)?,
            price: decimal("positions.price", &record.price)?,
            quantity: decimal("positions.quantity", &record.quantity)?,
            account_id: record.account_id,
            symbol: record.symbol,
            backtest: record.backtest,
            updated_at: record.updated_at,
        })
    }
}

/// Order record in database
#[derive(Debug, Clone, FromRow)]
pub struct OrderRecord {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub status: String,
    pub backtest: bool,
    pub external_order_id: Option<String>,
    pub executed_quantity: Option<String>,
    pub average_price: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub rejection: Option<String>,
}

impl TryFrom<OrderRecord> for Order {
    type Error = StoreError;

    fn try_from(record: OrderRecord) -> Result<Self, Self::Error> {
        Ok(Order {
            side: parsed("orders.side", &record.side)?,
            status: parsed("orders.status", &record.status)?,
            price: decimal("orders.price", &record.price)?,
            quantity: decimal("orders.quantity", &record.quantity)?,
            executed_quantity: optional_decimal(
                "orders.executed_quantity",
                record.executed_quantity.as_deref(),
            )?,
            average_price: optional_decimal("orders.average_price", record.average_price.as_deref())?,
            id: record.id,
            account_id: record.account_id,
            symbol: record.symbol,
            backtest: record.backtest,
            external_order_id: record.external_order_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            removed_at: record.removed_at,
            reconciled_at: record.reconciled_at,
            rejection: record.rejection,
        })
    }
}

/// Transaction record in database; `bundle` holds the JSON reconciliation bundle
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub backtest: bool,
    pub order_id: Option<String>,
    pub bundle: String,
    pub applied: bool,
    pub executed_at: DateTime<Utc>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = StoreError;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        let bundle = serde_json::from_str(&record.bundle).map_err(|e| {
            StoreError::Corrupt(format!("transaction {} bundle: {}", record.id, e))
        })?;

        Ok(Transaction {
            side: parsed("transactions.side", &record.side)?,
            price: decimal("transactions.price", &record.price)?,
            quantity: decimal("transactions.quantity", &record.quantity)?,
            bundle,
            id: record.id,
            account_id: record.account_id,
            symbol: record.symbol,
            backtest: record.backtest,
            order_id: record.order_id,
            applied: record.applied,
            executed_at: record.executed_at,
        })
    }
}

/// Earning record in database
#[derive(Debug, Clone, FromRow)]
pub struct EarningRecord {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: String,
    pub open: String,
    pub close: String,
    pub quantity: String,
    pub fee: String,
    pub profit: String,
    pub backtest: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EarningRecord> for Earning {
    type Error = StoreError;

    fn try_from(record: EarningRecord) -> Result<Self, Self::Error> {
        Ok(Earning {
            side: parsed("earnings.side", &record.side)?,
            open: decimal("earnings.open", &record.open)?,
            close: decimal("earnings.close", &record.close)?,
            quantity: decimal("earnings.quantity", &record.quantity)?,
            fee: decimal("earnings.fee", &record.fee)?,
            profit: decimal("earnings.profit", &record.profit)?,
            id: record.id,
            account_id: record.account_id,
            symbol: record.symbol,
            backtest: record.backtest,
            created_at: record.created_at,
        })
    }
}

/// Signal record in database
#[derive(Debug, Clone, FromRow)]
pub struct SignalRecord {
    pub id: String,
    pub symbol: String,
    pub side: String,
    pub price: Option<String>,
    pub timeframe: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SignalRecord> for Signal {
    type Error = StoreError;

    fn try_from(record: SignalRecord) -> Result<Self, Self::Error> {
        Ok(Signal {
            side: parsed("signals.side", &record.side)?,
            price: optional_decimal("signals.price", record.price.as_deref())?,
            id: record.id,
            symbol: record.symbol,
            timeframe: record.timeframe,
            notes: record.notes,
            created_at: record.created_at,
        })
    }
}
