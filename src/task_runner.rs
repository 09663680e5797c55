/// Fixed-Interval Task Runner
///
/// Runs a background task on a fixed interval and tracks consecutive
/// failures. A failed run is retried on the next tick; once failures persist
/// past the escalation threshold they are logged at error level on every run
/// until the task recovers. The runner never panics.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Interval runner configuration
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Time between the starts of two runs
    pub interval: Duration,
    /// Consecutive failures before a failure is escalated
    pub escalate_after: u32,
}

/// Counters reported when the runner stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalStats {
    pub runs: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
}

impl IntervalStats {
    fn record_success(&mut self, task_name: &str) {
        self.runs += 1;
        if self.consecutive_failures > 0 {
            info!(
                "Task '{}' recovered after {} failures",
                task_name, self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self, task_name: &str, escalate_after: u32, reason: &dyn Display) {
        self.runs += 1;
        self.failures += 1;
        self.consecutive_failures += 1;

        if self.consecutive_failures >= escalate_after {
            error!(
                "Task '{}' has failed {} times in a row: {}",
                task_name, self.consecutive_failures, reason
            );
        } else {
            warn!(
                "Task '{}' failed (attempt {}/{}), retrying next interval: {}",
                task_name, self.consecutive_failures, escalate_after, reason
            );
        }
    }
}

/// Run `task_fn` every `config.interval` until `shutdown` resolves.
///
/// The first run starts immediately. A run that overlaps the next tick delays
/// the schedule instead of bursting to catch up.
pub async fn run_on_interval<F, Fut, E, S>(
    task_name: &str,
    config: IntervalConfig,
    mut task_fn: F,
    shutdown: S,
) -> IntervalStats
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
    S: Future<Output = ()>,
{
    let mut stats = IntervalStats::default();
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Task '{}' stopping after {} runs", task_name, stats.runs);
                break;
            }
            _ = ticker.tick() => {
                match task_fn().await {
                    Ok(()) => stats.record_success(task_name),
                    Err(e) => stats.record_failure(task_name, config.escalate_after, &e),
                }
            }
        }
    }

    stats
}
