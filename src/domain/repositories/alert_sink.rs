use crate::domain::entities::earning::Earning;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AlertError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    #[error("Alert endpoint returned status {0}")]
    Status(u16),
}

/// Fire-and-forget notification of realized earnings.
///
/// Callers log failures and carry on; nothing is rolled back when an alert
/// cannot be delivered.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify_earning(&self, earning: &Earning) -> Result<(), AlertError>;
}
