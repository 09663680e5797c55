//! Account snapshot loading and bundle persistence

use crate::domain::entities::account::AccountSnapshot;
use crate::domain::entities::bundle::PositionChange;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::{ReconcileError, StoreError, WriteStep};
use crate::domain::repositories::ledger_store::{Filter, LedgerStore};
use std::sync::Arc;
use tracing::{debug, error};

/// Assembles the consistent view of one account
#[derive(Clone)]
pub struct SnapshotLoader {
    store: Arc<dyn LedgerStore>,
}

impl SnapshotLoader {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, account_id: &str) -> Result<AccountSnapshot, ReconcileError> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or_else(|| ReconcileError::AccountNotFound {
                account_id: account_id.to_string(),
            })?;

        let positions = self
            .store
            .find_positions(&Filter::new().account(account_id))
            .await?;
        let assets = self.store.find_assets(account_id).await?;

        debug!(
            "Loaded snapshot for {}: {} positions, {} assets",
            account_id,
            positions.len(),
            assets.len()
        );

        Ok(AccountSnapshot {
            account,
            positions,
            assets,
        })
    }
}

/// Persists reconciliation bundles.
///
/// The transaction row is written first and carries the bundle, so every
/// later step can be replayed from it if the write stops half way.
#[derive(Clone)]
pub struct SnapshotWriter {
    store: Arc<dyn LedgerStore>,
}

impl SnapshotWriter {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Journal the transaction, then apply its bundle
    pub async fn write(&self, transaction: &Transaction) -> Result<(), ReconcileError> {
        // Nothing is stored yet if this fails, so it surfaces as a plain store error
        self.store.insert_transaction(transaction).await?;
        self.apply(transaction, vec![WriteStep::Transaction]).await
    }

    /// Re-apply the bundle of a journaled transaction; every step is idempotent
    pub async fn reapply(&self, transaction: &Transaction) -> Result<(), ReconcileError> {
        self.apply(transaction, Vec::new()).await
    }

    async fn apply(
        &self,
        transaction: &Transaction,
        mut completed: Vec<WriteStep>,
    ) -> Result<(), ReconcileError> {
        let bundle = &transaction.bundle;

        let position_write = match &bundle.position {
            PositionChange::Upsert(position) => self.store.upsert_position(position).await,
            PositionChange::Delete(key) => self.store.destroy_position(key).await,
        };
        position_write.map_err(|e| gap(transaction, &completed, e))?;
        completed.push(WriteStep::Position);

        if let Some(earning) = &bundle.earning {
            self.store
                .upsert_earning(earning)
                .await
                .map_err(|e| gap(transaction, &completed, e))?;
            completed.push(WriteStep::Earning);
        }

        self.store
            .upsert_account(&bundle.account)
            .await
            .map_err(|e| gap(transaction, &completed, e))?;
        completed.push(WriteStep::Account);

        self.store
            .mark_transaction_applied(&transaction.id)
            .await
            .map_err(|e| gap(transaction, &completed, e))?;

        Ok(())
    }
}

fn gap(transaction: &Transaction, completed: &[WriteStep], cause: StoreError) -> ReconcileError {
    error!(
        "Reconciliation gap for account {} transaction {} after {:?}: {}",
        transaction.account_id, transaction.id, completed, cause
    );
    ReconcileError::PartialWriteFailure {
        transaction_id: transaction.id.clone(),
        completed: completed.to_vec(),
        reason: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::account::{Account, Asset};
    use crate::domain::entities::earning::Earning;
    use crate::domain::entities::order::{Fill, Order, OrderSide};
    use crate::domain::entities::position::{Position, PositionKey};
    use crate::domain::repositories::ledger_store::StoreResult;
    use crate::domain::services::fee_calculator::TradeUnitTable;
    use crate::domain::services::reconciliation_engine::ReconciliationEngine;
    use crate::infrastructure::in_memory_store::InMemoryLedgerStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to the in-memory store, optionally failing account upserts
    struct FlakyAccountStore {
        inner: InMemoryLedgerStore,
        fail_accounts: AtomicBool,
    }

    #[async_trait]
    impl LedgerStore for FlakyAccountStore {
        async fn find_account(&self, id: &str) -> StoreResult<Option<Account>> {
            self.inner.find_account(id).await
        }
        async fn upsert_account(&self, account: &Account) -> StoreResult<()> {
            if self.fail_accounts.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".to_string()));
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

    fn closing_transaction(snapshot: &AccountSnapshot) -> Transaction {
        let engine = ReconciliationEngine::new(Arc::new(TradeUnitTable::new(dec!(500))));
        let fill = Fill::new("test", "6664", OrderSide::BuyClose, dec!(2100), dec!(100), false);
        let bundle = engine.reconcile(snapshot, &fill).unwrap();
        Transaction::record(&fill, bundle)
    }

    async fn seeded() -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        store.seed_account(Account::new("test", dec!(99500), dec!(0)));
        store
            .upsert_position(&Position::open("test", "6664", OrderSide::Buy, dec!(2000), dec!(100), false))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_load_missing_account() {
        let loader = SnapshotLoader::new(Arc::new(InMemoryLedgerStore::new()));
        let result = loader.load("ghost").await;
        assert_eq!(
            result,
            Err(ReconcileError::AccountNotFound {
                account_id: "ghost".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_write_applies_every_row_and_marks_applied() {
        let store = Arc::new(seeded().await);
        let snapshot = SnapshotLoader::new(store.clone()).load("test").await.unwrap();
        assert_eq!(snapshot.positions.len(), 1);

        let transaction = closing_transaction(&snapshot);
        SnapshotWriter::new(store.clone()).write(&transaction).await.unwrap();

        let after = SnapshotLoader::new(store.clone()).load("test").await.unwrap();
        assert!(after.positions.is_empty());
        assert_eq!(after.account.balance, dec!(308500));
        assert_eq!(store.find_earnings(&Filter::new()).await.unwrap().len(), 1);

        let journal = store.find_transactions(&Filter::new()).await.unwrap();
        assert_eq!(journal.len(), 1);
        assert!(journal[0].applied);
    }

    #[tokio::test]
    async fn test_failed_account_write_reports_completed_steps_and_reapplies() {
        let store = Arc::new(FlakyAccountStore {
            inner: seeded().await,
            fail_accounts: AtomicBool::new(true),
        });
        let snapshot = SnapshotLoader::new(store.clone()).load("test").await.unwrap();
        let transaction = closing_transaction(&snapshot);
        let writer = SnapshotWriter::new(store.clone());

        match writer.write(&transaction).await {
            Err(ReconcileError::PartialWriteFailure {
                transaction_id,
                completed,
                ..
            }) => {
                assert_eq!(transaction_id, transaction.id);
                assert_eq!(
                    completed,
                    vec![WriteStep::Transaction, WriteStep::Position, WriteStep::Earning]
                );
            }
            other => panic!("expected partial write failure, got {:?}", other),
        }

        let pending = store
            .find_transactions(&Filter::new().applied(false))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        store.fail_accounts.store(false, Ordering::SeqCst);
        writer.reapply(&pending[0]).await.unwrap();
        // Reapplying twice must not double count
        writer.reapply(&pending[0]).await.unwrap();

        let after = SnapshotLoader::new(store.clone()).load("test").await.unwrap();
        assert_eq!(after.account.balance, dec!(308500));
        assert_eq!(store.find_earnings(&Filter::new()).await.unwrap().len(), 1);
        assert!(store
            .find_transactions(&Filter::new().applied(false))
            .await
            .unwrap()
            .is_empty());
    }
}
