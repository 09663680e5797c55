use crate::domain::entities::bundle::ReconciliationBundle;
use crate::domain::entities::order::{Fill, OrderSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only journal entry for an executed fill.
///
/// The bundle computed for the fill travels with it so a write interrupted
/// half way can be finished later. `applied` flips to true once every row of
/// the bundle is stored; nothing else about a transaction ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub backtest: bool,
    pub order_id: Option<String>,
    pub bundle: ReconciliationBundle,
    pub applied: bool,
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    pub fn record(fill: &Fill, bundle: ReconciliationBundle) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            account_id: fill.account_id.clone(),
            symbol: fill.symbol.clone(),
            side: fill.side,
            price: fill.price,
            quantity: fill.quantity,
            backtest: fill.backtest,
            order_id: fill.order_id.clone(),
            bundle,
            applied: false,
            executed_at: Utc::now(),
        }
    }
}
