use crate::domain::entities::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trading signal as recorded by upstream strategy code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Option<Decimal>,
    pub timeframe: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(symbol: &str, side: OrderSide) -> Self {
        Signal {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            price: None,
            timeframe: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_timeframe(mut self, timeframe: &str) -> Self {
        self.timeframe = Some(timeframe.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}
