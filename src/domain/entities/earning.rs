use crate::domain::entities::order::OrderSide;
use crate::domain::value_objects::PnL;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Realized result of one close event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Earning {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    /// Side of the position that was closed
    pub side: OrderSide,
    pub open: Decimal,
    pub close: Decimal,
    pub quantity: Decimal,
    /// Fee for both legs of the round trip
    pub fee: Decimal,
    pub profit: Decimal,
    pub backtest: bool,
    pub created_at: DateTime<Utc>,
}

impl Earning {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        open: Decimal,
        close: Decimal,
        quantity: Decimal,
        fee: Decimal,
        profit: Decimal,
        backtest: bool,
    ) -> Self {
        Earning {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            side,
            open,
            close,
            quantity,
            fee,
            profit,
            backtest,
            created_at: Utc::now(),
        }
    }

    pub fn pnl(&self) -> PnL {
        PnL::new(self.profit)
    }
}
