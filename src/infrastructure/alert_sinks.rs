use crate::domain::entities::earning::Earning;
use crate::domain::repositories::alert_sink::{AlertError, AlertSink};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

/// Writes earnings to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify_earning(&self, earning: &Earning) -> Result<(), AlertError> {
        info!(
            "Closed {} {} {} on account {}: open {} close {} fee {} pnl {}{}",
            earning.quantity,
            earning.side,
            earning.symbol,
            earning.account_id,
            earning.open,
            earning.close,
            earning.fee,
            earning.pnl(),
            if earning.backtest { " (backtest)" } else { "" }
        );
        Ok(())
    }
}

/// Posts each earning as JSON to a webhook
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: &str) -> Result<Self, AlertError> {
        url::Url::parse(url).map_err(|e| AlertError::Delivery(format!("Invalid webhook URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AlertError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify_earning(&self, earning: &Earning) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(earning)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
