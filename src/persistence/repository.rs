//! Database Repository
//!
//! SQLite implementation of [`LedgerStore`]. Upserts are single
//! `INSERT ... ON CONFLICT` statements; scans are built from a [`Filter`].

use super::models::*;
use super::DbPool;
use crate::domain::entities::account::{Account, Asset};
use crate::domain::entities::earning::Earning;
use crate::domain::entities::order::Order;
use crate::domain::entities::position::{Position, PositionKey};
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::StoreError;
use crate::domain::repositories::ledger_store::{Filter, LedgerStore, StoreResult};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, error};

pub(crate) fn store_error(context: &str, e: sqlx::Error) -> StoreError {
    error!("{}: {}", context, e);
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{}: {}", context, e))
        }
        other => StoreError::Query(format!("{}: {}", context, other)),
    }
}

/// Conditions shared by every ledger table
fn push_common(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    if let Some(account_id) = &filter.account_id {
        builder.push(" AND account_id = ").push_bind(account_id.clone());
    }
    if let Some(symbol) = &filter.symbol {
        builder.push(" AND symbol = ").push_bind(symbol.clone());
    }
    if let Some(side) = filter.side {
        builder.push(" AND side = ").push_bind(side.as_str());
    }
    if let Some(backtest) = filter.backtest {
        builder.push(" AND backtest = ").push_bind(backtest);
    }
}

fn push_id(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    if let Some(id) = &filter.id {
        builder.push(" AND id = ").push_bind(id.clone());
    }
}

fn convert<R, T>(records: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    records.into_iter().map(T::try_from).collect()
}

/// Ledger store backed by SQLite
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: DbPool,
}

impl SqliteLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert or replace a per-currency asset balance
    pub async fn upsert_asset(&self, asset: &Asset) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assets (account_id, currency, balance)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(account_id, currency) DO UPDATE SET balance = excluded.balance
            "#,
        )
        .bind(&asset.account_id)
        .bind(&asset.currency)
        .bind(asset.balance.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert asset", e))?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn find_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT id, balance, bitcoin, updated_at FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error(&format!("Failed to get account {}", account_id), e))?;

        record.map(Account::try_from).transpose()
    }

    async fn upsert_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, bitcoin, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                balance = excluded.balance,
                bitcoin = excluded.bitcoin,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.id)
        .bind(account.balance.to_string())
        .bind(account.bitcoin.to_string())
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(&format!("Failed to upsert account {}", account.id), e))?;

        debug!(
            "Account {} balance {} bitcoin {}",
            account.id, account.balance, account.bitcoin
        );
        Ok(())
    }

    async fn find_assets(&self, account_id: &str) -> StoreResult<Vec<Asset>> {
        let records = sqlx::query_as::<_, AssetRecord>(
            "SELECT account_id, currency, balance FROM assets WHERE account_id = ?1 ORDER BY currency",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to get assets", e))?;

        convert(records)
    }

    async fn find_positions(&self, filter: &Filter) -> StoreResult<Vec<Position>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT account_id, symbol, side, backtest, price, quantity, updated_at \
             FROM positions WHERE 1 = 1",
        );
        push_common(&mut builder, filter);
        builder.push(" ORDER BY symbol, side");

        let records = builder
            .build_query_as::<PositionRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to get positions", e))?;

        convert(records)
    }

    async fn upsert_position(&self, position: &Position) -> StoreResult<()> {
        if position.quantity.is_zero() || position.quantity.is_sign_negative() {
            return Err(StoreError::Query(format!(
                "refusing to store position {} {} with quantity {}",
                position.symbol, position.side, position.quantity
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO positions (account_id, symbol, side, backtest, price, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(account_id, symbol, side, backtest) DO UPDATE SET
                price = excluded.price,
                quantity = excluded.quantity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&position.account_id)
        .bind(&position.symbol)
        .bind(position.side.as_str())
        .bind(position.backtest)
        .bind(position.price.to_string())
        .bind(position.quantity.to_string())
        .bind(position.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert position", e))?;

        debug!(
            "Position {} {} {} @ {}",
            position.symbol, position.side, position.quantity, position.price
        );
        Ok(())
    }

    async fn destroy_position(&self, key: &PositionKey) -> StoreResult<()> {
        sqlx::query(
            "DELETE FROM positions WHERE account_id = ?1 AND symbol = ?2 AND side = ?3 AND backtest = ?4",
        )
        .bind(&key.account_id)
        .bind(&key.symbol)
        .bind(key.side.as_str())
        .bind(key.backtest)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to delete position", e))?;

        debug!("Closed position {} {}", key.symbol, key.side);
        Ok(())
    }

    async fn find_orders(&self, filter: &Filter) -> StoreResult<Vec<Order>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, account_id, symbol, side, price, quantity, status, backtest, \
             external_order_id, executed_quantity, average_price, created_at, updated_at, removed_at, \
             reconciled_at, rejection \
             FROM orders WHERE 1 = 1",
        );
        push_id(&mut builder, filter);
        push_common(&mut builder, filter);
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        match filter.active {
            Some(true) => {
                builder.push(" AND removed_at IS NULL");
            }
            Some(false) => {
                builder.push(" AND removed_at IS NOT NULL");
            }
            None => {}
        }
        match filter.reconciled {
            Some(true) => {
                builder.push(" AND reconciled_at IS NOT NULL");
            }
            Some(false) => {
                builder.push(" AND reconciled_at IS NULL");
            }
            None => {}
        }
        builder.push(" ORDER BY created_at, id");

        let records = builder
            .build_query_as::<OrderRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to get orders", e))?;

        convert(records)
    }

    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, account_id, symbol, side, price, quantity, status, backtest,
                external_order_id, executed_quantity, average_price,
                created_at, updated_at, removed_at, reconciled_at, rejection
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                external_order_id = excluded.external_order_id,
                executed_quantity = excluded.executed_quantity,
                average_price = excluded.average_price,
                updated_at = excluded.updated_at,
                removed_at = excluded.removed_at,
                reconciled_at = excluded.reconciled_at,
                rejection = excluded.rejection
            "#,
        )
        .bind(&order.id)
        .bind(&order.account_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.price.to_string())
        .bind(order.quantity.to_string())
        .bind(order.status.as_str())
        .bind(order.backtest)
        .bind(&order.external_order_id)
        .bind(order.executed_quantity.map(|q| q.to_string()))
        .bind(order.average_price.map(|p| p.to_string()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.removed_at)
        .bind(order.reconciled_at)
        .bind(&order.rejection)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(&format!("Failed to upsert order {}", order.id), e))?;

        debug!("Order {} is {}", order.id, order.status.as_str());
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let bundle = serde_json::to_string(&transaction.bundle).map_err(|e| {
            StoreError::Query(format!("Failed to encode transaction {}: {}", transaction.id, e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, account_id, symbol, side, price, quantity, backtest,
                order_id, bundle, applied, executed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.account_id)
        .bind(&transaction.symbol)
        .bind(transaction.side.as_str())
        .bind(transaction.price.to_string())
        .bind(transaction.quantity.to_string())
        .bind(transaction.backtest)
        .bind(&transaction.order_id)
        .bind(bundle)
        .bind(transaction.applied)
        .bind(transaction.executed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            store_error(&format!("Failed to insert transaction {}", transaction.id), e)
        })?;

        Ok(())
    }

    async fn find_transactions(&self, filter: &Filter) -> StoreResult<Vec<Transaction>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, account_id, symbol, side, price, quantity, backtest, order_id, \
             bundle, applied, executed_at FROM transactions WHERE 1 = 1",
        );
        push_id(&mut builder, filter);
        push_common(&mut builder, filter);
        if let Some(order_id) = &filter.order_id {
            builder.push(" AND order_id = ").push_bind(order_id.clone());
        }
        if let Some(applied) = filter.applied {
            builder.push(" AND applied = ").push_bind(applied);
        }
        builder.push(" ORDER BY seq");

        let records = builder
            .build_query_as::<TransactionRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to get transactions", e))?;

        convert(records)
    }

    async fn mark_transaction_applied(&self, transaction_id: &str) -> StoreResult<()> {
        let rows_affected = sqlx::query("UPDATE transactions SET applied = 1 WHERE id = ?1")
            .bind(transaction_id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to mark transaction applied", e))?
            .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Query(format!(
                "transaction {} not found",
                transaction_id
            )));
        }
        Ok(())
    }

    async fn upsert_earning(&self, earning: &Earning) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO earnings (
                id, account_id, symbol, side, open, close, quantity, fee, profit, backtest, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                open = excluded.open,
                close = excluded.close,
                quantity = excluded.quantity,
                fee = excluded.fee,
                profit = excluded.profit
            "#,
        )
        .bind(&earning.id)
        .bind(&earning.account_id)
        .bind(&earning.symbol)
        .bind(earning.side.as_str())
        .bind(earning.open.to_string())
        .bind(earning.close.to_string())
        .bind(earning.quantity.to_string())
        .bind(earning.fee.to_string())
        .bind(earning.profit.to_string())
        .bind(earning.backtest)
        .bind(earning.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert earning", e))?;

        Ok(())
    }

    async fn find_earnings(&self, filter: &Filter) -> StoreResult<Vec<Earning>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, account_id, symbol, side, open, close, quantity, fee, profit, backtest, \
             created_at FROM earnings WHERE 1 = 1",
        );
        push_id(&mut builder, filter);
        push_common(&mut builder, filter);
        builder.push(" ORDER BY created_at");

        let records = builder
            .build_query_as::<EarningRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to get earnings", e))?;

        convert(records)
    }

    async fn is_healthy(&self) -> bool {
        let healthy = sqlx::query("SELECT 1").execute(&self.pool).await.is_ok();
        if !healthy {
            error!("Ledger database is not reachable");
        }
        healthy
    }
}
