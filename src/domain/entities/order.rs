use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Trade direction of an order.
///
/// `Buy` and `Sell` open (or extend) a position. `BuyClose` and `SellClose`
/// are closing instructions against an existing `Buy` / `Sell` position and
/// are never stored as a position's own side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
    BuyClose,
    SellClose,
}

impl OrderSide {
    pub fn is_opening(&self) -> bool {
        matches!(self, OrderSide::Buy | OrderSide::Sell)
    }

    /// Side of the position this order opens, extends or closes
    pub fn position_side(&self) -> OrderSide {
        match self {
            OrderSide::Buy | OrderSide::BuyClose => OrderSide::Buy,
            OrderSide::Sell | OrderSide::SellClose => OrderSide::Sell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
            OrderSide::BuyClose => "buy_close",
            OrderSide::SellClose => "sell_close",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            "buy_close" | "buyclose" => Ok(OrderSide::BuyClose),
            "sell_close" | "sellclose" => Ok(OrderSide::SellClose),
            other => Err(ValidationError::UnknownSide(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Unfilled,
    FullyFilled,
    CanceledUnfilled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Unfilled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unfilled => "unfilled",
            OrderStatus::FullyFilled => "fully_filled",
            OrderStatus::CanceledUnfilled => "canceled_unfilled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unfilled" => Ok(OrderStatus::Unfilled),
            "fully_filled" => Ok(OrderStatus::FullyFilled),
            "canceled_unfilled" => Ok(OrderStatus::CanceledUnfilled),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A resting instruction sent to (or simulated against) a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub backtest: bool,
    pub external_order_id: Option<String>,
    /// Quantity the venue reported as executed, set once filled
    pub executed_quantity: Option<Decimal>,
    /// Average execution price the venue reported, set once filled
    pub average_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; terminal orders leave the active set but stay queryable
    pub removed_at: Option<DateTime<Utc>>,
    /// Set once the ledger has journaled or refused this order's fill
    #[serde(default)]
    pub reconciled_at: Option<DateTime<Utc>>,
    /// Why the ledger refused the fill
    #[serde(default)]
    pub rejection: Option<String>,
}

impl Order {
    pub fn new(
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        backtest: bool,
    ) -> Result<Self, ValidationError> {
        validate_trade(symbol, price, quantity)?;

        let now = Utc::now();
        Ok(Order {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            status: OrderStatus::Unfilled,
            backtest,
            external_order_id: None,
            executed_quantity: None,
            average_price: None,
            created_at: now,
            updated_at: now,
            removed_at: None,
            reconciled_at: None,
            rejection: None,
        })
    }

    pub fn with_external_id(mut self, external_order_id: &str) -> Self {
        self.external_order_id = Some(external_order_id.to_string());
        self
    }

    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }

    /// Record a fully filled execution and remove the order from the active set
    pub fn mark_filled(&mut self, executed_quantity: Decimal, average_price: Decimal) {
        let now = Utc::now();
        self.status = OrderStatus::FullyFilled;
        self.executed_quantity = Some(executed_quantity);
        self.average_price = Some(average_price);
        self.updated_at = now;
        self.removed_at = Some(now);
    }

    pub fn mark_canceled(&mut self) {
        let now = Utc::now();
        self.status = OrderStatus::CanceledUnfilled;
        self.updated_at = now;
        self.removed_at = Some(now);
    }

    pub fn mark_reconciled(&mut self) {
        let now = Utc::now();
        self.reconciled_at = Some(now);
        self.updated_at = now;
    }

    /// Record that the ledger refused the fill; it is never retried
    pub fn mark_rejected(&mut self, reason: &str) {
        self.mark_reconciled();
        self.rejection = Some(reason.to_string());
    }

    /// Filled on the venue but not yet journaled or refused by the ledger
    pub fn awaits_reconcile(&self) -> bool {
        self.status == OrderStatus::FullyFilled && self.reconciled_at.is_none()
    }
}

/// An executed trade handed to the reconciliation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub backtest: bool,
    /// Order this fill settles, absent for direct trade entry
    pub order_id: Option<String>,
}

impl Fill {
    pub fn new(
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        backtest: bool,
    ) -> Self {
        Fill {
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            backtest,
            order_id: None,
        }
    }

    /// Build the fill for a filled order, preferring the venue's execution report
    pub fn from_order(order: &Order) -> Self {
        let quantity = order
            .executed_quantity
            .filter(|q| q.is_sign_positive() && !q.is_zero())
            .unwrap_or(order.quantity);
        let price = order
            .average_price
            .filter(|p| p.is_sign_positive() && !p.is_zero())
            .unwrap_or(order.price);

        Fill {
            account_id: order.account_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            quantity,
            backtest: order.backtest,
            order_id: Some(order.id.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_trade(&self.symbol, self.price, self.quantity)
    }
}

/// Symbols are 1-20 characters of ASCII alphanumerics, `-`, `_` or `/`
pub fn validate_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.is_empty() || symbol.len() > 20 {
        return Err(ValidationError::InvalidSymbol(format!(
            "'{}' (must be 1-20 characters)",
            symbol
        )));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err(ValidationError::InvalidSymbol(format!(
            "'{}' (only alphanumeric, -, _, / allowed)",
            symbol
        )));
    }
    Ok(())
}

fn validate_trade(symbol: &str, price: Decimal, quantity: Decimal) -> Result<(), ValidationError> {
    validate_symbol(symbol)?;
    if price <= Decimal::ZERO {
        return Err(ValidationError::InvalidPrice(format!(
            "price must be positive, got {}",
            price
        )));
    }
    if quantity <= Decimal::ZERO {
        return Err(ValidationError::InvalidQuantity(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}
