//! Ledger Store Trait
//!
//! Storage contract for every record the reconciliation core reads or writes.
//! Implementations only store and fetch; all ledger invariants live in the
//! engine and the snapshot writer.

use crate::domain::entities::account::{Account, Asset};
use crate::domain::entities::earning::Earning;
use crate::domain::entities::order::{Order, OrderSide, OrderStatus};
use crate::domain::entities::position::{Position, PositionKey};
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::StoreError;
use async_trait::async_trait;

/// Common result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Equality filter for scans; `None` fields match everything.
///
/// Not every field applies to every record type. A field that a record does
/// not carry is ignored for that record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub id: Option<String>,
    pub account_id: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<OrderSide>,
    pub backtest: Option<bool>,
    pub status: Option<OrderStatus>,
    pub order_id: Option<String>,
    pub applied: Option<bool>,
    /// Orders only: `true` keeps orders that are not soft deleted
    pub active: Option<bool>,
    /// Orders only: `false` keeps orders whose fill the ledger has not handled
    pub reconciled: Option<bool>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    pub fn backtest(mut self, backtest: bool) -> Self {
        self.backtest = Some(backtest);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn applied(mut self, applied: bool) -> Self {
        self.applied = Some(applied);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn reconciled(mut self, reconciled: bool) -> Self {
        self.reconciled = Some(reconciled);
        self
    }

    pub fn matches_position(&self, position: &Position) -> bool {
        self.account_id.as_ref().map_or(true, |v| *v == position.account_id)
            && self.symbol.as_ref().map_or(true, |v| *v == position.symbol)
            && self.side.map_or(true, |v| v == position.side)
            && self.backtest.map_or(true, |v| v == position.backtest)
    }

    pub fn matches_order(&self, order: &Order) -> bool {
        self.id.as_ref().map_or(true, |v| *v == order.id)
            && self.account_id.as_ref().map_or(true, |v| *v == order.account_id)
            && self.symbol.as_ref().map_or(true, |v| *v == order.symbol)
            && self.side.map_or(true, |v| v == order.side)
            && self.backtest.map_or(true, |v| v == order.backtest)
            && self.status.map_or(true, |v| v == order.status)
            && self.active.map_or(true, |v| v == order.is_active())
            && self
                .reconciled
                .map_or(true, |v| v == order.reconciled_at.is_some())
    }

    pub fn matches_transaction(&self, transaction: &Transaction) -> bool {
        self.id.as_ref().map_or(true, |v| *v == transaction.id)
            && self.account_id.as_ref().map_or(true, |v| *v == transaction.account_id)
            && self.symbol.as_ref().map_or(true, |v| *v == transaction.symbol)
            && self.side.map_or(true, |v| v == transaction.side)
            && self.backtest.map_or(true, |v| v == transaction.backtest)
            && self
                .order_id
                .as_ref()
                .map_or(true, |v| transaction.order_id.as_ref() == Some(v))
            && self.applied.map_or(true, |v| v == transaction.applied)
    }

    pub fn matches_earning(&self, earning: &Earning) -> bool {
        self.id.as_ref().map_or(true, |v| *v == earning.id)
            && self.account_id.as_ref().map_or(true, |v| *v == earning.account_id)
            && self.symbol.as_ref().map_or(true, |v| *v == earning.symbol)
            && self.side.map_or(true, |v| v == earning.side)
            && self.backtest.map_or(true, |v| v == earning.backtest)
    }
}

/// Durable storage for ledger records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_account(&self, account_id: &str) -> StoreResult<Option<Account>>;

    async fn upsert_account(&self, account: &Account) -> StoreResult<()>;

    async fn find_assets(&self, account_id: &str) -> StoreResult<Vec<Asset>>;

    async fn find_positions(&self, filter: &Filter) -> StoreResult<Vec<Position>>;

    /// Insert or replace the position identified by its key
    async fn upsert_position(&self, position: &Position) -> StoreResult<()>;

    /// Remove the position; removing a missing position is not an error
    async fn destroy_position(&self, key: &PositionKey) -> StoreResult<()>;

    /// Orders matching the filter, oldest first
    async fn find_orders(&self, filter: &Filter) -> StoreResult<Vec<Order>>;

    async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let mut orders = self.find_orders(&Filter::new().id(order_id)).await?;
        Ok(orders.pop())
    }

    async fn upsert_order(&self, order: &Order) -> StoreResult<()>;

    /// Append a transaction; ids are never reused
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    /// Transactions matching the filter, in execution order
    async fn find_transactions(&self, filter: &Filter) -> StoreResult<Vec<Transaction>>;

    async fn mark_transaction_applied(&self, transaction_id: &str) -> StoreResult<()>;

    async fn upsert_earning(&self, earning: &Earning) -> StoreResult<()>;

    async fn find_earnings(&self, filter: &Filter) -> StoreResult<Vec<Earning>>;

    /// Check if the backing store is reachable
    async fn is_healthy(&self) -> bool {
        true
    }
}
