//! Ledger service
//!
//! Entry point for every ledger mutation. Each operation runs under the
//! account's lock: repair, load, reconcile, write. Alerts are sent after the
//! lock is released.

use crate::application::services::account_locks::AccountLocks;
use crate::application::services::snapshot::{SnapshotLoader, SnapshotWriter};
use crate::domain::entities::account::{Account, AccountSnapshot};
use crate::domain::entities::order::{Fill, Order, OrderStatus};
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::ReconcileError;
use crate::domain::repositories::alert_sink::AlertSink;
use crate::domain::repositories::ledger_store::{Filter, LedgerStore};
use crate::domain::repositories::venue_client::{VenueOrderStatus, VenueStatus};
use crate::domain::services::reconciliation_engine::ReconciliationEngine;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What settling one order against a venue report did
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Order filled and its fill reconciled
    Filled(Box<Transaction>),
    Canceled,
    /// Order was already terminal or gone when re-read
    AlreadySettled,
    /// Venue still reports the order as working
    Unchanged,
}

/// Result of a repair pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    /// Journaled transactions whose bundle was re-applied
    pub reapplied: usize,
    /// Filled orders that had no transaction and were reconciled again
    pub replayed: usize,
    /// Filled orders whose replay was rejected by the engine
    pub unrecoverable: usize,
    #[serde(skip)]
    replayed_transactions: Vec<Transaction>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.reapplied == 0 && self.replayed == 0 && self.unrecoverable == 0
    }

    fn merge(&mut self, other: RepairReport) {
        self.reapplied += other.reapplied;
        self.replayed += other.replayed;
        self.unrecoverable += other.unrecoverable;
        self.replayed_transactions.extend(other.replayed_transactions);
    }
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    engine: ReconciliationEngine,
    loader: SnapshotLoader,
    writer: SnapshotWriter,
    locks: AccountLocks,
    alerts: Arc<dyn AlertSink>,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        engine: ReconciliationEngine,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            loader: SnapshotLoader::new(store.clone()),
            writer: SnapshotWriter::new(store.clone()),
            store,
            engine,
            locks: AccountLocks::new(),
            alerts,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Reconcile an executed fill (direct trade entry or backtest) and persist it
    pub async fn reconcile_fill(&self, fill: Fill) -> Result<Transaction, ReconcileError> {
        let (transaction, repaired) = {
            let _guard = self.locks.acquire(&fill.account_id).await;
            let repaired = self.repair_account_locked(&fill.account_id).await?;
            let transaction = self.reconcile_locked(&fill).await?;
            (transaction, repaired)
        };

        self.notify(&repaired.replayed_transactions).await;
        self.notify(std::slice::from_ref(&transaction)).await;
        Ok(transaction)
    }

    /// Consistent view of an account, taken under its lock
    pub async fn snapshot(&self, account_id: &str) -> Result<AccountSnapshot, ReconcileError> {
        let _guard = self.locks.acquire(account_id).await;
        self.loader.load(account_id).await
    }

    /// Create an account; returns `false` and changes nothing if it already exists
    pub async fn open_account(&self, account: Account) -> Result<bool, ReconcileError> {
        let _guard = self.locks.acquire(&account.id).await;
        if self.store.find_account(&account.id).await?.is_some() {
            return Ok(false);
        }

        self.store.upsert_account(&account).await?;
        info!(
            "Opened account {} with balance {} bitcoin {}",
            account.id, account.balance, account.bitcoin
        );
        Ok(true)
    }

    /// Record a new working order for the sweep to track
    pub async fn submit_order(&self, order: Order) -> Result<Order, ReconcileError> {
        if order.status != OrderStatus::Unfilled || !order.is_active() {
            return Err(ReconcileError::InvalidOrder(format!(
                "order {} must be submitted as an active unfilled order",
                order.id
            )));
        }

        let _guard = self.locks.acquire(&order.account_id).await;
        if self.store.find_account(&order.account_id).await?.is_none() {
            return Err(ReconcileError::AccountNotFound {
                account_id: order.account_id.clone(),
            });
        }

        self.store.upsert_order(&order).await?;
        info!(
            "Recorded order {} for account {}: {} {} {} @ {}{}",
            order.id,
            order.account_id,
            order.side,
            order.quantity,
            order.symbol,
            order.price,
            if order.backtest { " (backtest)" } else { "" }
        );
        Ok(order)
    }

    /// Apply a venue report to a working order.
    ///
    /// The order is re-read under the account lock, so a report for an order
    /// that another sweep already settled changes nothing.
    pub async fn settle_order(
        &self,
        order: &Order,
        report: &VenueOrderStatus,
    ) -> Result<SettleOutcome, ReconcileError> {
        match report.status {
            VenueStatus::FullyFilled | VenueStatus::CanceledUnfilled => {}
            _ => return Ok(SettleOutcome::Unchanged),
        }

        let (outcome, repaired) = {
            let _guard = self.locks.acquire(&order.account_id).await;

            let mut current = match self.store.find_order(&order.id).await? {
                Some(current) if current.is_active() && current.status == OrderStatus::Unfilled => {
                    current
                }
                _ => {
                    debug!("Order {} already settled, skipping", order.id);
                    return Ok(SettleOutcome::AlreadySettled);
                }
            };

            if report.status == VenueStatus::CanceledUnfilled {
                current.mark_canceled();
                self.store.upsert_order(&current).await?;
                info!("Order {} canceled unfilled", current.id);
                return Ok(SettleOutcome::Canceled);
            }

            let repaired = self.repair_account_locked(&current.account_id).await?;

            current.mark_filled(report.executed_quantity, report.average_price);
            let transaction = self.reconcile_order_locked(&mut current).await?;
            (SettleOutcome::Filled(Box::new(transaction)), repaired)
        };

        self.notify(&repaired.replayed_transactions).await;
        if let SettleOutcome::Filled(transaction) = &outcome {
            self.notify(std::slice::from_ref(transaction.as_ref())).await;
        }
        Ok(outcome)
    }

    /// Finish every interrupted write across all accounts
    pub async fn repair(&self) -> Result<RepairReport, ReconcileError> {
        let mut accounts = BTreeSet::new();
        for transaction in self
            .store
            .find_transactions(&Filter::new().applied(false))
            .await?
        {
            accounts.insert(transaction.account_id);
        }
        for order in self
            .store
            .find_orders(
                &Filter::new()
                    .status(OrderStatus::FullyFilled)
                    .reconciled(false),
            )
            .await?
        {
            accounts.insert(order.account_id);
        }

        let mut report = RepairReport::default();
        for account_id in accounts {
            let repaired = {
                let _guard = self.locks.acquire(&account_id).await;
                self.repair_account_locked(&account_id).await?
            };
            report.merge(repaired);
        }

        self.notify(&report.replayed_transactions).await;
        if report.is_clean() {
            debug!("Repair pass found nothing to do");
        } else {
            warn!(
                "Repair pass: {} reapplied, {} replayed, {} unrecoverable",
                report.reapplied, report.replayed, report.unrecoverable
            );
        }
        Ok(report)
    }

    /// Caller must hold the account lock
    async fn repair_account_locked(&self, account_id: &str) -> Result<RepairReport, ReconcileError> {
        let mut report = RepairReport::default();

        let pending = self
            .store
            .find_transactions(&Filter::new().account(account_id).applied(false))
            .await?;
        for transaction in pending {
            self.writer.reapply(&transaction).await?;
            warn!(
                "Reapplied interrupted transaction {} for account {}",
                transaction.id, account_id
            );
            report.reapplied += 1;
        }

        let pending = self
            .store
            .find_orders(
                &Filter::new()
                    .account(account_id)
                    .status(OrderStatus::FullyFilled)
                    .reconciled(false),
            )
            .await?;
        for mut order in pending {
            let journaled = self
                .store
                .find_transactions(&Filter::new().order(&order.id))
                .await?;
            if !journaled.is_empty() {
                // Fill was written but the order never recorded it
                order.mark_reconciled();
                self.store.upsert_order(&order).await?;
                continue;
            }

            match self.reconcile_order_locked(&mut order).await {
                Ok(transaction) => {
                    warn!(
                        "Replayed filled order {} for account {} as transaction {}",
                        order.id, account_id, transaction.id
                    );
                    report.replayed += 1;
                    report.replayed_transactions.push(transaction);
                }
                Err(e) if e.is_recoverable() => return Err(e),
                Err(_) => report.unrecoverable += 1,
            }
        }

        Ok(report)
    }

    /// Caller must hold the account lock
    async fn reconcile_locked(&self, fill: &Fill) -> Result<Transaction, ReconcileError> {
        let transaction = self.prepare_locked(fill).await?;
        self.commit_locked(fill, transaction).await
    }

    /// Reconcile the fill of an order the venue reports filled.
    ///
    /// A fill the engine refuses is stored on the order together with its
    /// filled status, so it is reported once and never replayed. Caller must
    /// hold the account lock.
    async fn reconcile_order_locked(&self, order: &mut Order) -> Result<Transaction, ReconcileError> {
        let fill = Fill::from_order(order);

        let transaction = match self.prepare_locked(&fill).await {
            Ok(transaction) => transaction,
            Err(e) if e.is_recoverable() => return Err(e),
            Err(e) => {
                error!(
                    "[{}] Filled order {} for account {} cannot be reconciled: {}",
                    e.error_code(),
                    order.id,
                    order.account_id,
                    e
                );
                order.mark_rejected(&format!("{}: {}", e.error_code(), e));
                self.store.upsert_order(order).await?;
                return Err(e);
            }
        };

        self.store.upsert_order(order).await?;
        let transaction = self.commit_locked(&fill, transaction).await?;

        order.mark_reconciled();
        if let Err(e) = self.store.upsert_order(order).await {
            // Journal entry exists, so the repair pass can finish the mark
            warn!("Failed to mark order {} reconciled: {}", order.id, e);
        }
        Ok(transaction)
    }

    /// Run the engine against a fresh snapshot; nothing is written
    async fn prepare_locked(&self, fill: &Fill) -> Result<Transaction, ReconcileError> {
        let snapshot = self.loader.load(&fill.account_id).await?;

        let bundle = self.engine.reconcile(&snapshot, fill).map_err(|e| {
            warn!(
                "[{}] Rejected {} {} {} for account {}: {}",
                e.error_code(),
                fill.side,
                fill.quantity,
                fill.symbol,
                fill.account_id,
                e
            );
            e
        })?;

        Ok(Transaction::record(fill, bundle))
    }

    async fn commit_locked(
        &self,
        fill: &Fill,
        mut transaction: Transaction,
    ) -> Result<Transaction, ReconcileError> {
        self.writer.write(&transaction).await?;
        transaction.applied = true;

        info!(
            "Reconciled {} {} {} @ {} for account {} (transaction {})",
            fill.side, fill.quantity, fill.symbol, fill.price, fill.account_id, transaction.id
        );
        Ok(transaction)
    }

    async fn notify(&self, transactions: &[Transaction]) {
        for earning in transactions.iter().filter_map(|t| t.bundle.earning.as_ref()) {
            if let Err(e) = self.alerts.notify_earning(earning).await {
                warn!("Failed to deliver earning alert {}: {}", earning.id, e);
            }
        }
    }
}
