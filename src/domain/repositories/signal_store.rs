use crate::domain::entities::order::OrderSide;
use crate::domain::entities::signal::Signal;
use crate::domain::repositories::ledger_store::StoreResult;
use async_trait::async_trait;

/// Storage for the latest signal per symbol and side
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn get(&self, symbol: &str, side: OrderSide) -> StoreResult<Option<Signal>>;

    /// Replace any signal stored for the same symbol and side
    async fn upsert(&self, signal: &Signal) -> StoreResult<()>;

    /// Returns whether a signal was removed
    async fn remove(&self, signal_id: &str) -> StoreResult<bool>;
}
