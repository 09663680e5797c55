//! Ledger end-to-end scenarios
//!
//! Drives the ledger service, the order sweep, and the repair pass against the
//! SQLite store the binary uses.

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tradeledger::application::services::ledger_service::LedgerService;
use tradeledger::application::services::order_sweeper::{OrderSweeper, SweepConfig};
use tradeledger::domain::entities::account::{Account, Asset};
use tradeledger::domain::entities::earning::Earning;
use tradeledger::domain::entities::order::{Fill, Order, OrderSide, OrderStatus};
use tradeledger::domain::entities::position::{Position, PositionKey};
use tradeledger::domain::entities::transaction::Transaction;
use tradeledger::domain::errors::{ReconcileError, StoreError, WriteStep};
use tradeledger::domain::repositories::ledger_store::{Filter, LedgerStore, StoreResult};
use tradeledger::domain::repositories::venue_client::{
    VenueClient, VenueError, VenueOrderStatus, VenueResult, VenueStatus,
};
use tradeledger::domain::services::fee_calculator::TradeUnitTable;
use tradeledger::domain::services::reconciliation_engine::ReconciliationEngine;
use tradeledger::infrastructure::alert_sinks::LogAlertSink;
use tradeledger::persistence::init_database;
use tradeledger::persistence::repository::SqliteLedgerStore;

/// Venue answering from a fixed table of external order ids
struct ScriptedVenue {
    statuses: HashMap<String, VenueStatus>,
}

#[async_trait]
impl VenueClient for ScriptedVenue {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        external_order_id: &str,
    ) -> VenueResult<VenueOrderStatus> {
        match self.statuses.get(external_order_id) {
            Some(status) => Ok(VenueOrderStatus {
                status: status.clone(),
                executed_quantity: rust_decimal::Decimal::ZERO,
                average_price: rust_decimal::Decimal::ZERO,
            }),
            None => Err(VenueError::Rejected {
                status: 404,
                body: "unknown order".to_string(),
            }),
        }
    }
}

/// SQLite store whose account writes can be switched off
struct FailingAccountWrites {
    inner: SqliteLedgerStore,
    failing: AtomicBool,
}

#[async_trait]
impl LedgerStore for FailingAccountWrites {
    async fn find_account(&self, id: &str) -> StoreResult<Option<Account>> {
        self.inner.find_account(id).await
    }
    async fn upsert_account(&self, account: &Account) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database is locked".to_string()));
        }
        self.inner.upsert_account(account).await
    }
    async fn find_assets(&self, id: &str) -> StoreResult<Vec<Asset>> {
        self.inner.find_assets(id).await
    }
    async fn find_positions(&self, filter: &Filter) -> StoreResult<Vec<Position>> {
        self.inner.find_positions(filter).await
    }
    async fn upsert_position(&self, position: &Position) -> StoreResult<()> {
        self.inner.upsert_position(position).await
    }
    async fn destroy_position(&self, key: &PositionKey) -> StoreResult<()> {
        self.inner.destroy_position(key).await
    }
    async fn find_orders(&self, filter: &Filter) -> StoreResult<Vec<Order>> {
        self.inner.find_orders(filter).await
    }
    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        self.inner.upsert_order(order).await
    }
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        self.inner.insert_transaction(transaction).await
    }
    async fn find_transactions(&self, filter: &Filter) -> StoreResult<Vec<Transaction>> {
        self.inner.find_transactions(filter).await
    }
    async fn mark_transaction_applied(&self, id: &str) -> StoreResult<()> {
        self.inner.mark_transaction_applied(id).await
    }
    async fn upsert_earning(&self, earning: &Earning) -> StoreResult<()> {
        self.inner.upsert_earning(earning).await
    }
    async fn find_earnings(&self, filter: &Filter) -> StoreResult<Vec<Earning>> {
        self.inner.find_earnings(filter).await
    }
}

fn engine() -> ReconciliationEngine {
    ReconciliationEngine::new(Arc::new(
        TradeUnitTable::new(dec!(500))
            .with_fee("ETH-BTC", dec!(0.001))
            .with_altcoin("ETH-BTC"),
    ))
}

async fn sqlite_store(balance: rust_decimal::Decimal) -> SqliteLedgerStore {
    let store = SqliteLedgerStore::new(init_database("sqlite::memory:").await.unwrap());
    store
        .upsert_account(&Account::new("A", balance, dec!(1)))
        .await
        .unwrap();
    store
}

fn ledger(store: Arc<dyn LedgerStore>) -> Arc<LedgerService> {
    Arc::new(LedgerService::new(store, engine(), Arc::new(LogAlertSink)))
}

#[tokio::test]
async fn test_open_then_close_round_trip() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false))
        .await
        .unwrap();

    let snapshot = ledger.snapshot("A").await.unwrap();
    assert_eq!(snapshot.account.balance, dec!(99500));
    let position = snapshot.find_position("X", OrderSide::Buy, false).unwrap();
    assert_eq!(position.quantity, dec!(100));
    assert_eq!(position.price, dec!(2000));

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::BuyClose, dec!(2100), dec!(100), false))
        .await
        .unwrap();

    let snapshot = ledger.snapshot("A").await.unwrap();
    assert!(snapshot.positions.is_empty());
    // 99500 + 2100 * 100 - 500 * 2
    assert_eq!(snapshot.account.balance, dec!(308500));

    let earnings = store.find_earnings(&Filter::new().account("A")).await.unwrap();
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].open, dec!(2000));
    assert_eq!(earnings[0].close, dec!(2100));
    assert_eq!(earnings[0].fee, dec!(1000));
    assert_eq!(earnings[0].profit, dec!(9000));

    let transactions = store.find_transactions(&Filter::new().account("A")).await.unwrap();
    assert_eq!(transactions.len(), 2);
    assert!(transactions.iter().all(|t| t.applied));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_trace() {
    let store = Arc::new(sqlite_store(dec!(1000)).await);
    let ledger = ledger(store.clone());

    let result = ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false))
        .await;
    assert!(matches!(result, Err(ReconcileError::InsufficientFunds { .. })));

    assert!(store.find_transactions(&Filter::new()).await.unwrap().is_empty());
    assert!(store.find_positions(&Filter::new()).await.unwrap().is_empty());
    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(1000)
    );
}

#[tokio::test]
async fn test_altcoin_symbols_settle_in_bitcoin() {
    let store = Arc::new(sqlite_store(dec!(1000)).await);
    let ledger = ledger(store.clone());

    ledger
        .reconcile_fill(Fill::new("A", "ETH-BTC", OrderSide::Buy, dec!(0.05), dec!(2), false))
        .await
        .unwrap();

    let account = store.find_account("A").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(1000));
    assert_eq!(account.bitcoin, dec!(0.899));
}

#[tokio::test]
async fn test_concurrent_fills_on_one_account_do_not_lose_updates() {
    let store = Arc::new(sqlite_store(dec!(100000)).await);
    let ledger = ledger(store.clone());

    let fills = (0..10).map(|_| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(100), dec!(1), false))
                .await
        })
    });
    for result in futures_util::future::join_all(fills).await {
        result.unwrap().unwrap();
    }

    let snapshot = ledger.snapshot("A").await.unwrap();
    // Each fill costs 100 * 1 + 500
    assert_eq!(snapshot.account.balance, dec!(94000));
    let position = snapshot.find_position("X", OrderSide::Buy, false).unwrap();
    assert_eq!(position.quantity, dec!(10));
    assert_eq!(position.price, dec!(100));
}

#[tokio::test]
async fn test_sweep_fills_once_even_when_run_twice_concurrently() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    let filled = ledger
        .submit_order(
            Order::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false)
                .unwrap()
                .with_external_id("venue-filled"),
        )
        .await
        .unwrap();
    let canceled = ledger
        .submit_order(
            Order::new("A", "Y", OrderSide::Sell, dec!(500), dec!(10), false)
                .unwrap()
                .with_external_id("venue-canceled"),
        )
        .await
        .unwrap();
    let working = ledger
        .submit_order(
            Order::new("A", "Z", OrderSide::Buy, dec!(10), dec!(10), false)
                .unwrap()
                .with_external_id("venue-open"),
        )
        .await
        .unwrap();

    let venue = Arc::new(ScriptedVenue {
        statuses: HashMap::from([
            ("venue-filled".to_string(), VenueStatus::FullyFilled),
            ("venue-canceled".to_string(), VenueStatus::CanceledUnfilled),
            ("venue-open".to_string(), VenueStatus::Unfilled),
        ]),
    });
    let sweeper = OrderSweeper::new(ledger.clone(), venue, None, SweepConfig::default());

    let (first, second) = tokio::join!(
        sweeper.run_order_status_sweep(),
        sweeper.run_order_status_sweep()
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.filled + second.filled, 1);
    assert_eq!(first.canceled + second.canceled, 1);

    let transactions = store
        .find_transactions(&Filter::new().order(&filled.id))
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);

    let order = store.find_order(&filled.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::FullyFilled);
    assert!(order.removed_at.is_some());
    let order = store.find_order(&canceled.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::CanceledUnfilled);
    let order = store.find_order(&working.id).await.unwrap().unwrap();
    assert!(order.is_active());

    // A third sweep only sees the order that is still working
    let report = sweeper.run_order_status_sweep().await.unwrap();
    assert_eq!(report.polled, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(99500)
    );
}

#[tokio::test]
async fn test_interrupted_write_is_finished_by_repair() {
    let store = Arc::new(FailingAccountWrites {
        inner: sqlite_store(dec!(300000)).await,
        failing: AtomicBool::new(false),
    });
    let ledger = ledger(store.clone());

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false))
        .await
        .unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let result = ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::BuyClose, dec!(2100), dec!(100), false))
        .await;
    match result {
        Err(ReconcileError::PartialWriteFailure { completed, .. }) => {
            assert_eq!(
                completed,
                vec![WriteStep::Transaction, WriteStep::Position, WriteStep::Earning]
            );
        }
        other => panic!("expected partial write failure, got {:?}", other),
    }

    // Position is gone but the balance still reflects the open leg
    assert!(store.find_positions(&Filter::new()).await.unwrap().is_empty());
    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(99500)
    );

    store.failing.store(false, Ordering::SeqCst);
    let report = ledger.repair().await.unwrap();
    assert_eq!(report.reapplied, 1);
    assert_eq!(report.replayed, 0);

    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(308500)
    );
    assert!(store
        .find_transactions(&Filter::new().applied(false))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.find_earnings(&Filter::new()).await.unwrap().len(), 1);

    // Nothing left to do on a second pass
    assert!(ledger.repair().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_filled_order_without_transaction_is_replayed() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    // Order marked filled by a run that stopped before reconciling it
    let mut order = Order::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false).unwrap();
    order.mark_filled(dec!(100), dec!(1990));
    store.upsert_order(&order).await.unwrap();

    let report = ledger.repair().await.unwrap();
    assert_eq!(report.replayed, 1);

    let snapshot = ledger.snapshot("A").await.unwrap();
    assert_eq!(snapshot.account.balance, dec!(300000) - dec!(199000) - dec!(500));
    assert_eq!(
        snapshot.find_position("X", OrderSide::Buy, false).unwrap().price,
        dec!(1990)
    );
    assert!(ledger.repair().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_backtest_positions_never_offset_live_ones() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(2000), dec!(10), true))
        .await
        .unwrap();

    let result = ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::BuyClose, dec!(2100), dec!(10), false))
        .await;
    assert!(matches!(
        result,
        Err(ReconcileError::NoOffsettingPosition { .. })
    ));

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::BuyClose, dec!(2100), dec!(10), true))
        .await
        .unwrap();
    assert!(store.find_positions(&Filter::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_over_close_leaves_stored_position_unchanged() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false))
        .await
        .unwrap();

    let result = ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::BuyClose, dec!(2100), dec!(150), false))
        .await;
    assert!(matches!(result, Err(ReconcileError::OverClose { .. })));

    let positions = store.find_positions(&Filter::new().account("A")).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].quantity, dec!(100));
    assert_eq!(positions[0].price, dec!(2000));
    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(99500)
    );
    assert!(store.find_earnings(&Filter::new()).await.unwrap().is_empty());
    assert_eq!(store.find_transactions(&Filter::new()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_short_round_trip_through_store() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Sell, dec!(2000), dec!(100), false))
        .await
        .unwrap();
    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(99500)
    );

    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::SellClose, dec!(1900), dec!(100), false))
        .await
        .unwrap();

    assert!(store.find_positions(&Filter::new()).await.unwrap().is_empty());
    // 99500 + 1900 * 100 - 500 * 2
    assert_eq!(
        store.find_account("A").await.unwrap().unwrap().balance,
        dec!(288500)
    );

    let earnings = store.find_earnings(&Filter::new().account("A")).await.unwrap();
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].side, OrderSide::Sell);
    assert_eq!(earnings[0].open, dec!(2000));
    assert_eq!(earnings[0].close, dec!(1900));
    assert_eq!(earnings[0].profit, dec!(9000));
}

#[tokio::test]
async fn test_refused_order_fill_does_not_resurface() {
    let store = Arc::new(sqlite_store(dec!(300000)).await);
    let ledger = ledger(store.clone());

    let close = ledger
        .submit_order(
            Order::new("A", "X", OrderSide::BuyClose, dec!(2100), dec!(100), false)
                .unwrap()
                .with_external_id("venue-close"),
        )
        .await
        .unwrap();
    let venue = Arc::new(ScriptedVenue {
        statuses: HashMap::from([("venue-close".to_string(), VenueStatus::FullyFilled)]),
    });
    let sweeper = OrderSweeper::new(ledger.clone(), venue, None, SweepConfig::default());

    let report = sweeper.run_order_status_sweep().await.unwrap();
    assert_eq!(report.reconcile_failures, 1);
    assert_eq!(report.filled, 0);

    let stored = store.find_order(&close.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::FullyFilled);
    assert!(stored.rejection.is_some());

    // A position opened afterwards is not consumed by the refused close
    ledger
        .reconcile_fill(Fill::new("A", "X", OrderSide::Buy, dec!(2000), dec!(100), false))
        .await
        .unwrap();
    ledger
        .reconcile_fill(Fill::new("A", "OTHER", OrderSide::Buy, dec!(10), dec!(1), false))
        .await
        .unwrap();
    assert!(ledger.repair().await.unwrap().is_clean());

    let positions = store
        .find_positions(&Filter::new().symbol("X"))
        .await
        .unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].quantity, dec!(100));
    assert_eq!(store.find_transactions(&Filter::new()).await.unwrap().len(), 2);
    assert!(store.find_earnings(&Filter::new()).await.unwrap().is_empty());
}
