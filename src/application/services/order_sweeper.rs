//! Order status sweep
//!
//! Polls the venue for every working order and hands terminal reports to the
//! ledger service. Venue calls for different orders run concurrently; each is
//! paced by the shared limiter and bounded by a timeout.

use crate::application::services::ledger_service::{LedgerService, SettleOutcome};
use crate::domain::entities::order::{Order, OrderStatus};
use crate::domain::errors::ReconcileError;
use crate::domain::repositories::ledger_store::{Filter, LedgerStore};
use crate::domain::repositories::venue_client::{
    VenueClient, VenueError, VenueOrderStatus, VenueResult,
};
use crate::rate_limit::SharedRateLimiter;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub venue_timeout: Duration,
    /// Treat every order as immediately filled at its own price and quantity
    pub simulate_fills: bool,
    /// Consecutive venue failures for one order before escalating
    pub failure_alert_threshold: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            venue_timeout: Duration::from_secs(5),
            simulate_fills: false,
            failure_alert_threshold: 5,
        }
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub polled: usize,
    pub filled: usize,
    pub canceled: usize,
    pub unchanged: usize,
    pub already_settled: usize,
    pub venue_failures: usize,
    pub reconcile_failures: usize,
}

#[derive(Debug)]
enum OrderOutcome {
    Settled(SettleOutcome),
    VenueFailure,
    ReconcileFailure,
}

pub struct OrderSweeper {
    ledger: Arc<LedgerService>,
    store: Arc<dyn LedgerStore>,
    venue: Arc<dyn VenueClient>,
    limiter: Option<SharedRateLimiter>,
    config: SweepConfig,
    /// Consecutive venue failures per order id
    failures: DashMap<String, u32>,
}

impl OrderSweeper {
    pub fn new(
        ledger: Arc<LedgerService>,
        venue: Arc<dyn VenueClient>,
        limiter: Option<SharedRateLimiter>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store: ledger.store().clone(),
            ledger,
            venue,
            limiter,
            config,
            failures: DashMap::new(),
        }
    }

    /// Poll every active unfilled order once
    pub async fn run_order_status_sweep(&self) -> Result<SweepReport, ReconcileError> {
        let orders = self
            .store
            .find_orders(&Filter::new().status(OrderStatus::Unfilled).active(true))
            .await?;

        let mut report = SweepReport {
            polled: orders.len(),
            ..SweepReport::default()
        };
        if orders.is_empty() {
            debug!("Order sweep: no working orders");
            return Ok(report);
        }

        let outcomes = join_all(orders.iter().map(|order| self.process(order))).await;
        for outcome in outcomes {
            match outcome {
                OrderOutcome::Settled(SettleOutcome::Filled(_)) => report.filled += 1,
                OrderOutcome::Settled(SettleOutcome::Canceled) => report.canceled += 1,
                OrderOutcome::Settled(SettleOutcome::Unchanged) => report.unchanged += 1,
                OrderOutcome::Settled(SettleOutcome::AlreadySettled) => {
                    report.already_settled += 1
                }
                OrderOutcome::VenueFailure => report.venue_failures += 1,
                OrderOutcome::ReconcileFailure => report.reconcile_failures += 1,
            }
        }

        info!(
            "Order sweep via {}: {} polled, {} filled, {} canceled, {} unchanged, {} venue failures, {} reconcile failures",
            self.venue.name(),
            report.polled,
            report.filled,
            report.canceled,
            report.unchanged,
            report.venue_failures,
            report.reconcile_failures
        );
        Ok(report)
    }

    async fn process(&self, order: &Order) -> OrderOutcome {
        let status = match self.query(order).await {
            Ok(status) => {
                self.failures.remove(&order.id);
                status
            }
            Err(e) => {
                self.record_failure(order, &e);
                return OrderOutcome::VenueFailure;
            }
        };

        match self.ledger.settle_order(order, &status).await {
            Ok(outcome) => OrderOutcome::Settled(outcome),
            Err(e) => {
                error!(
                    "[{}] Failed to settle order {} ({}): {}",
                    e.error_code(),
                    order.id,
                    e.severity(),
                    e
                );
                OrderOutcome::ReconcileFailure
            }
        }
    }

    async fn query(&self, order: &Order) -> VenueResult<VenueOrderStatus> {
        if self.config.simulate_fills || order.backtest {
            return Ok(VenueOrderStatus::filled(order.quantity, order.price));
        }

        let external_order_id = order.external_order_id.as_deref().ok_or_else(|| {
            VenueError::UnexpectedResponse(format!("order {} has no venue order id", order.id))
        })?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        timeout(
            self.config.venue_timeout,
            self.venue.get_order_status(&order.symbol, external_order_id),
        )
        .await
        .map_err(|_| VenueError::Timeout(self.config.venue_timeout))?
    }

    fn record_failure(&self, order: &Order, cause: &VenueError) {
        let consecutive = {
            let mut count = self.failures.entry(order.id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if consecutive >= self.config.failure_alert_threshold {
            error!(
                "Order {} on {} failed venue status checks {} times in a row: {}",
                order.id, order.symbol, consecutive, cause
            );
        } else {
            warn!(
                "Venue status check for order {} failed (attempt {}): {}",
                order.id, consecutive, cause
            );
        }
    }

    /// Consecutive venue failures currently recorded for an order
    pub fn failure_count(&self, order_id: &str) -> u32 {
        self.failures.get(order_id).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::account::Account;
    use crate::domain::entities::earning::Earning;
    use crate::domain::entities::order::OrderSide;
    use crate::domain::repositories::alert_sink::{AlertError, AlertSink};
    use crate::domain::repositories::venue_client::VenueStatus;
    use crate::domain::services::fee_calculator::TradeUnitTable;
    use crate::domain::services::reconciliation_engine::ReconciliationEngine;
    use crate::infrastructure::in_memory_store::InMemoryLedgerStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopAlerts;

    #[async_trait]
    impl AlertSink for NoopAlerts {
        async fn notify_earning(&self, _earning: &Earning) -> Result<(), AlertError> {
            Ok(())
        }
    }

    /// Venue answering from a fixed table; unknown ids error, "slow" hangs
    struct ScriptedVenue {
        statuses: HashMap<String, VenueOrderStatus>,
        calls: AtomicUsize,
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            if external_order_id == "slow" {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            self.statuses
                .get(external_order_id)
                .cloned()
                .ok_or_else(|| VenueError::Request("connection reset".to_string()))
        }
    }

    fn ledger(store: Arc<InMemoryLedgerStore>) -> Arc<LedgerService> {
        let engine = ReconciliationEngine::new(Arc::new(TradeUnitTable::new(dec!(500))));
        Arc::new(LedgerService::new(store, engine, Arc::new(NoopAlerts)))
    }

    fn order(external_id: &str) -> Order {
        Order::new("test", "6664", OrderSide::Buy, dec!(2000), dec!(10), false)
            .unwrap()
            .with_external_id(external_id)
    }

    fn sweeper(
        ledger: Arc<LedgerService>,
        statuses: Vec<(&str, VenueOrderStatus)>,
        config: SweepConfig,
    ) -> OrderSweeper {
        let venue = ScriptedVenue {
            statuses: statuses
                .into_iter()
                .map(|(id, status)| (id.to_string(), status))
                .collect(),
            calls: AtomicUsize::new(0),
        };
        OrderSweeper::new(ledger, Arc::new(venue), None, config)
    }

    fn seeded_store() -> Arc<InMemoryLedgerStore> {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.seed_account(Account::new("test", dec!(300000), dec!(0)));
        store
    }

    #[tokio::test]
    async fn test_sweep_classifies_venue_reports() {
        let store = seeded_store();
        let ledger = ledger(store.clone());
        for id in ["filled", "canceled", "working", "broken"] {
            ledger.submit_order(order(id)).await.unwrap();
        }

        let sweeper = sweeper(
            ledger,
            vec![
                ("filled", VenueOrderStatus::filled(dec!(10), dec!(1990))),
                ("canceled", VenueOrderStatus::with_status(VenueStatus::CanceledUnfilled)),
                ("working", VenueOrderStatus::with_status(VenueStatus::Unfilled)),
            ],
            SweepConfig::default(),
        );

        let report = sweeper.run_order_status_sweep().await.unwrap();
        assert_eq!(report.polled, 4);
        assert_eq!(report.filled, 1);
        assert_eq!(report.canceled, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.venue_failures, 1);

        let account = store.find_account("test").await.unwrap().unwrap();
        // Filled at the venue's average price
        assert_eq!(account.balance, dec!(300000) - dec!(19900) - dec!(500));

        let again = sweeper.run_order_status_sweep().await.unwrap();
        assert_eq!(again.polled, 2);
        assert_eq!(again.filled, 0);
        assert_eq!(store.find_transactions(&Filter::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_venue_failures_accumulate_and_reset() {
        let store = seeded_store();
        let ledger = ledger(store.clone());
        let stuck = ledger.submit_order(order("broken")).await.unwrap();

        let config = SweepConfig {
            failure_alert_threshold: 2,
            ..SweepConfig::default()
        };
        let sweeper = sweeper(ledger, vec![], config);

        for _ in 0..3 {
            sweeper.run_order_status_sweep().await.unwrap();
        }
        assert_eq!(sweeper.failure_count(&stuck.id), 3);

        let stored = store.find_order(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Unfilled);
        assert!(stored.is_active());
    }

    #[tokio::test]
    async fn test_venue_timeout_leaves_order_unfilled() {
        let store = seeded_store();
        let ledger = ledger(store.clone());
        let slow = ledger.submit_order(order("slow")).await.unwrap();

        let config = SweepConfig {
            venue_timeout: Duration::from_millis(100),
            ..SweepConfig::default()
        };
        let sweeper = sweeper(ledger, vec![], config);

        let report = sweeper.run_order_status_sweep().await.unwrap();
        assert_eq!(report.venue_failures, 1);
        assert_eq!(sweeper.failure_count(&slow.id), 1);
        assert_eq!(
            store.find_order(&slow.id).await.unwrap().unwrap().status,
            OrderStatus::Unfilled
        );
    }

    #[tokio::test]
    async fn test_backtest_orders_fill_without_venue() {
        let store = seeded_store();
        let ledger = ledger(store.clone());
        let backtest = Order::new("test", "6664", OrderSide::Buy, dec!(2000), dec!(10), true).unwrap();
        ledger.submit_order(backtest).await.unwrap();

        let sweeper = sweeper(ledger, vec![], SweepConfig::default());
        let report = sweeper.run_order_status_sweep().await.unwrap();
        assert_eq!(report.filled, 1);

        let positions = store
            .find_positions(&Filter::new().backtest(true))
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].price, dec!(2000));
    }

    #[tokio::test]
    async fn test_simulation_mode_fills_live_orders() {
        let store = seeded_store();
        let ledger = ledger(store.clone());
        ledger
            .submit_order(Order::new("test", "6664", OrderSide::Buy, dec!(2000), dec!(10), false).unwrap())
            .await
            .unwrap();

        let config = SweepConfig {
            simulate_fills: true,
            ..SweepConfig::default()
        };
        let sweeper = sweeper(ledger, vec![], config);
        let report = sweeper.run_order_status_sweep().await.unwrap();
        assert_eq!(report.filled, 1);
        assert_eq!(report.venue_failures, 0);
    }
}
