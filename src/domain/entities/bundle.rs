use crate::domain::entities::account::Account;
use crate::domain::entities::earning::Earning;
use crate::domain::entities::position::{Position, PositionKey};
use crate::domain::value_objects::Settlement;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What happens to the position row touched by a fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PositionChange {
    Upsert(Position),
    Delete(PositionKey),
}

impl PositionChange {
    pub fn key(&self) -> PositionKey {
        match self {
            PositionChange::Upsert(position) => position.key(),
            PositionChange::Delete(key) => key.clone(),
        }
    }
}

/// Output set of one reconciliation, persisted together by the writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationBundle {
    pub position: PositionChange,
    /// Account with updated balances
    pub account: Account,
    pub earning: Option<Earning>,
    /// Per-leg fee charged for this fill
    pub fee: Decimal,
    pub settlement: Settlement,
}
