//! Sweep Actor
//!
//! Owns the order sweeper and runs one sweep at a time. The interval loop and
//! the HTTP API both trigger sweeps through this actor, so two sweeps never
//! overlap.

use crate::application::services::order_sweeper::{OrderSweeper, SweepReport};
use crate::domain::errors::ReconcileError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Channel capacity for sweep actor messages
const SWEEP_CHANNEL_CAPACITY: usize = 32;

/// Messages that can be sent to the sweep actor
#[derive(Debug)]
pub enum SweepMessage {
    /// Run one order status sweep
    RunSweep {
        reply: mpsc::Sender<Result<SweepReport, ReconcileError>>,
    },

    /// Get sweep statistics
    GetStats { reply: mpsc::Sender<SweepStats> },

    /// Shutdown the actor
    Shutdown,
}

/// Sweep actor statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepStats {
    pub total_sweeps: u64,
    pub failed_sweeps: u64,
    pub orders_filled: u64,
    pub orders_canceled: u64,
    pub last_sweep: Option<DateTime<Utc>>,
    pub last_report: Option<SweepReport>,
}

pub struct SweepActor {
    sweeper: OrderSweeper,
    stats: SweepStats,
}

impl SweepActor {
    pub fn new(sweeper: OrderSweeper) -> Self {
        Self {
            sweeper,
            stats: SweepStats::default(),
        }
    }

    /// Spawn a new sweep actor
    pub fn spawn(sweeper: OrderSweeper) -> SweepHandle {
        let (tx, rx) = mpsc::channel(SWEEP_CHANNEL_CAPACITY);
        let actor = Self::new(sweeper);

        tokio::spawn(async move {
            actor.run(rx).await;
        });

        info!("SweepActor spawned");
        SweepHandle { sender: tx }
    }

    /// Main actor loop
    async fn run(mut self, mut rx: mpsc::Receiver<SweepMessage>) {
        info!("SweepActor started");

        while let Some(msg) = rx.recv().await {
            match msg {
                SweepMessage::RunSweep { reply } => {
                    debug!("SweepActor received RunSweep");
                    let result = self.sweeper.run_order_status_sweep().await;
                    self.update_stats(&result);
                    if let Err(e) = reply.send(result).await {
                        error!("Failed to send RunSweep reply: {:?}", e);
                    }
                }

                SweepMessage::GetStats { reply } => {
                    if let Err(e) = reply.send(self.stats.clone()).await {
                        error!("Failed to send GetStats reply: {:?}", e);
                    }
                }

                SweepMessage::Shutdown => {
                    info!("SweepActor received shutdown signal");
                    break;
                }
            }
        }

        info!("SweepActor stopped");
    }

    fn update_stats(&mut self, result: &Result<SweepReport, ReconcileError>) {
        self.stats.total_sweeps += 1;
        self.stats.last_sweep = Some(Utc::now());

        match result {
            Ok(report) => {
                self.stats.orders_filled += report.filled as u64;
                self.stats.orders_canceled += report.canceled as u64;
                self.stats.last_report = Some(report.clone());
            }
            Err(e) => {
                warn!("Order sweep failed: {}", e);
                self.stats.failed_sweeps += 1;
            }
        }
    }
}

/// Cloneable handle for talking to a running sweep actor
#[derive(Clone)]
pub struct SweepHandle {
    sender: mpsc::Sender<SweepMessage>,
}

impl SweepHandle {
    /// Run a sweep and wait for its report
    pub async fn run_sweep(&self) -> Result<SweepReport, SweepHandleError> {
        let (reply, mut rx) = mpsc::channel(1);
        self.sender
            .send(SweepMessage::RunSweep { reply })
            .await
            .map_err(|_| SweepHandleError::ActorStopped)?;
        rx.recv()
            .await
            .ok_or(SweepHandleError::ActorStopped)?
            .map_err(SweepHandleError::Sweep)
    }

    pub async fn stats(&self) -> Result<SweepStats, SweepHandleError> {
        let (reply, mut rx) = mpsc::channel(1);
        self.sender
            .send(SweepMessage::GetStats { reply })
            .await
            .map_err(|_| SweepHandleError::ActorStopped)?;
        rx.recv().await.ok_or(SweepHandleError::ActorStopped)
    }

    pub async fn shutdown(&self) {
        if self.sender.send(SweepMessage::Shutdown).await.is_err() {
            debug!("SweepActor already stopped");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepHandleError {
    #[error("Sweep actor is not running")]
    ActorStopped,

    #[error(transparent)]
    Sweep(ReconcileError),
}
