//! In-memory ledger and signal stores
//!
//! Thread-safe storage on `DashMap`, used for backtests and tests. Mirrors the
//! SQLite store's semantics, including oldest-first ordering of scans.

use crate::domain::entities::account::{Account, Asset};
use crate::domain::entities::earning::Earning;
use crate::domain::entities::order::{Order, OrderSide};
use crate::domain::entities::position::{Position, PositionKey};
use crate::domain::entities::signal::Signal;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::StoreError;
use crate::domain::repositories::ledger_store::{Filter, LedgerStore, StoreResult};
use crate::domain::repositories::signal_store::SignalStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    accounts: Arc<DashMap<String, Account>>,
    assets: Arc<DashMap<String, Vec<Asset>>>,
    positions: Arc<DashMap<PositionKey, Position>>,
    orders: Arc<DashMap<String, Order>>,
    /// Append-only journal in insertion order
    transactions: Arc<RwLock<Vec<Transaction>>>,
    earnings: Arc<DashMap<String, Earning>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account(&self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }

    pub fn seed_asset(&self, asset: Asset) {
        self.assets
            .entry(asset.account_id.clone())
            .or_default()
            .push(asset);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.accounts.get(account_id).map(|a| a.value().clone()))
    }

    async fn upsert_account(&self, account: &Account) -> StoreResult<()> {
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_assets(&self, account_id: &str) -> StoreResult<Vec<Asset>> {
        Ok(self
            .assets
            .get(account_id)
            .map(|a| a.value().clone())
            .unwrap_or_default())
    }

    async fn find_positions(&self, filter: &Filter) -> StoreResult<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| filter.matches_position(p.value()))
            .map(|p| p.value().clone())
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.side.as_str().cmp(b.side.as_str())));
        Ok(positions)
    }

    async fn upsert_position(&self, position: &Position) -> StoreResult<()> {
        if position.quantity.is_zero() || position.quantity.is_sign_negative() {
            return Err(StoreError::Query(format!(
                "refusing to store position {} {} with quantity {}",
                position.symbol, position.side, position.quantity
            )));
        }
        self.positions.insert(position.key(), position.clone());
        Ok(())
    }

    async fn destroy_position(&self, key: &PositionKey) -> StoreResult<()> {
        self.positions.remove(key);
        Ok(())
    }

    async fn find_orders(&self, filter: &Filter) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| filter.matches_order(o.value()))
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.iter().any(|t| t.id == transaction.id) {
            return Err(StoreError::Query(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        transactions.push(transaction.clone());
        Ok(())
    }

    async fn find_transactions(&self, filter: &Filter) -> StoreResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .filter(|t| filter.matches_transaction(t))
            .cloned()
            .collect())
    }

    async fn mark_transaction_applied(&self, transaction_id: &str) -> StoreResult<()> {
        let mut transactions = self.transactions.write().await;
        match transactions.iter_mut().find(|t| t.id == transaction_id) {
            Some(transaction) => {
                transaction.applied = true;
                Ok(())
            }
            None => Err(StoreError::Query(format!(
                "transaction {} not found",
                transaction_id
            ))),
        }
    }

    async fn upsert_earning(&self, earning: &Earning) -> StoreResult<()> {
        self.earnings.insert(earning.id.clone(), earning.clone());
        Ok(())
    }

    async fn find_earnings(&self, filter: &Filter) -> StoreResult<Vec<Earning>> {
        let mut earnings: Vec<Earning> = self
            .earnings
            .iter()
            .filter(|e| filter.matches_earning(e.value()))
            .map(|e| e.value().clone())
            .collect();
        earnings.sort_by_key(|e| e.created_at);
        Ok(earnings)
    }
}

/// Latest signal per symbol and side
#[derive(Clone, Default)]
pub struct InMemorySignalStore {
    signals: Arc<DashMap<(String, OrderSide), Signal>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn get(&self, symbol: &str, side: OrderSide) -> StoreResult<Option<Signal>> {
        Ok(self
            .signals
            .get(&(symbol.to_string(), side))
            .map(|s| s.value().clone()))
    }

    async fn upsert(&self, signal: &Signal) -> StoreResult<()> {
        self.signals
            .insert((signal.symbol.clone(), signal.side), signal.clone());
        Ok(())
    }

    async fn remove(&self, signal_id: &str) -> StoreResult<bool> {
        let key = self
            .signals
            .iter()
            .find(|s| s.value().id == signal_id)
            .map(|s| s.key().clone());
        Ok(match key {
            Some(key) => self.signals.remove(&key).is_some(),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::OrderStatus;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_account_round_trip() {
        let store = InMemoryLedgerStore::new();
        assert!(store.find_account("test").await.unwrap().is_none());

        store.seed_account(Account::new("test", dec!(300000), dec!(0)));
        let account = store.find_account("test").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(300000));
    }

    #[tokio::test]
    async fn test_position_upsert_replaces_by_key() {
        let store = InMemoryLedgerStore::new();
        let position = Position::open("test", "6664", OrderSide::Buy, dec!(2000), dec!(50), false);
        store.upsert_position(&position).await.unwrap();
        store
            .upsert_position(&position.extend(dec!(2200), dec!(50)).unwrap())
            .await
            .unwrap();

        let positions = store.find_positions(&Filter::new().account("test")).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(100));

        store.destroy_position(&position.key()).await.unwrap();
        store.destroy_position(&position.key()).await.unwrap();
        assert!(store.find_positions(&Filter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_quantity_position_is_refused() {
        let store = InMemoryLedgerStore::new();
        let position = Position::open("test", "6664", OrderSide::Buy, dec!(2000), dec!(0), false);
        assert!(store.upsert_position(&position).await.is_err());
    }

    #[tokio::test]
    async fn test_active_unfilled_orders_scan() {
        let store = InMemoryLedgerStore::new();
        let open = Order::new("test", "6664", OrderSide::Buy, dec!(2000), dec!(1), false).unwrap();
        let mut done = Order::new("test", "6664", OrderSide::Buy, dec!(2000), dec!(1), false).unwrap();
        done.mark_canceled();
        store.upsert_order(&open).await.unwrap();
        store.upsert_order(&done).await.unwrap();

        let active = store
            .find_orders(&Filter::new().status(OrderStatus::Unfilled).active(true))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
        assert!(store.find_order(&done.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_signal_store_keyed_by_symbol_and_side() {
        let store = InMemorySignalStore::new();
        let buy = Signal::new("6664", OrderSide::Buy).with_price(dec!(2000));
        let replacement = Signal::new("6664", OrderSide::Buy).with_timeframe("5min");
        store.upsert(&buy).await.unwrap();
        store.upsert(&replacement).await.unwrap();
        store.upsert(&Signal::new("6664", OrderSide::Sell)).await.unwrap();

        let found = store.get("6664", OrderSide::Buy).await.unwrap().unwrap();
        assert_eq!(found.id, replacement.id);

        assert!(store.remove(&replacement.id).await.unwrap());
        assert!(!store.remove(&replacement.id).await.unwrap());
        assert!(store.get("6664", OrderSide::Buy).await.unwrap().is_none());
        assert!(store.get("6664", OrderSide::Sell).await.unwrap().is_some());
    }
}
