//! Signal repository
//!
//! One row per (symbol, side); a newer signal replaces the stored one.

use super::models::SignalRecord;
use super::repository::store_error;
use super::DbPool;
use crate::domain::entities::order::OrderSide;
use crate::domain::entities::signal::Signal;
use crate::domain::repositories::ledger_store::StoreResult;
use crate::domain::repositories::signal_store::SignalStore;
use async_trait::async_trait;
use tracing::debug;

#[derive(Clone)]
pub struct SqliteSignalStore {
    pool: DbPool,
}

impl SqliteSignalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn get(&self, symbol: &str, side: OrderSide) -> StoreResult<Option<Signal>> {
        let record = sqlx::query_as::<_, SignalRecord>(
            r#"
            SELECT id, symbol, side, price, timeframe, notes, created_at
            FROM signals
            WHERE symbol = ?1 AND side = ?2
            "#,
        )
        .bind(symbol)
        .bind(side.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to get signal", e))?;

        record.map(Signal::try_from).transpose()
    }

    async fn upsert(&self, signal: &Signal) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (id, symbol, side, price, timeframe, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(symbol, side) DO UPDATE SET
                id = excluded.id,
                price = excluded.price,
                timeframe = excluded.timeframe,
                notes = excluded.notes,
                created_at = excluded.created_at
            "#,
        )
        .bind(&signal.id)
        .bind(&signal.symbol)
        .bind(signal.side.as_str())
        .bind(signal.price.map(|p| p.to_string()))
        .bind(&signal.timeframe)
        .bind(&signal.notes)
        .bind(signal.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert signal", e))?;

        debug!("Stored {} signal for {}", signal.side, signal.symbol);
        Ok(())
    }

    async fn remove(&self, signal_id: &str) -> StoreResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM signals WHERE id = ?1")
            .bind(signal_id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to delete signal", e))?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}
