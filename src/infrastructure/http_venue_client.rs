use crate::domain::repositories::venue_client::{
    VenueClient, VenueError, VenueOrderStatus, VenueResult, VenueStatus,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT: &str = concat!("tradeledger/", env!("CARGO_PKG_VERSION"));

/// Credentials and endpoint for a signed REST venue
#[derive(Clone)]
pub struct HttpVenueConfig {
    pub api_base: String,
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
}

impl HttpVenueConfig {
    pub fn new(api_base: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: Zeroizing::new(api_secret.to_string()),
        }
    }
}

impl std::fmt::Debug for HttpVenueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVenueConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Order status payload returned by the venue
#[derive(Debug, Deserialize)]
struct OrderStatusResponse {
    status: String,
    #[serde(default, alias = "executedQty", alias = "filled_size")]
    executed_quantity: Option<Decimal>,
    #[serde(default, alias = "avgPrice", alias = "average_filled_price")]
    average_price: Option<Decimal>,
}

/// Venue client over signed HTTPS requests.
///
/// Every request carries the API key, a unix timestamp and an HMAC-SHA256
/// signature of `timestamp + method + path`, base64 encoded.
pub struct HttpVenueClient {
    client: Client,
    config: HttpVenueConfig,
}

impl HttpVenueClient {
    pub fn new(config: HttpVenueConfig) -> VenueResult<Self> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(VenueError::Authentication(
                "API key and secret are required".to_string(),
            ));
        }
        Url::parse(&config.api_base)
            .map_err(|e| VenueError::Request(format!("Invalid API base {}: {}", config.api_base, e)))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| VenueError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn sign(&self, timestamp: u64, method: &str, path: &str) -> VenueResult<String> {
        let message = format!("{}{}{}", timestamp, method, path);
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| VenueError::Authentication(format!("Invalid API secret: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn order_status_url(&self, symbol: &str, external_order_id: &str) -> VenueResult<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| VenueError::Request(format!("Invalid API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| VenueError::Request("API base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["orders", external_order_id]);
        url.query_pairs_mut().append_pair("symbol", symbol);
        Ok(url)
    }
}

#[async_trait]
impl VenueClient for HttpVenueClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        external_order_id: &str,
    ) -> VenueResult<VenueOrderStatus> {
        let url = self.order_status_url(symbol, external_order_id)?;
        let signed_path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VenueError::Request(format!("System clock error: {}", e)))?
            .as_secs();
        let signature = self.sign(timestamp, "GET", &signed_path)?;

        let response = self
            .client
            .get(url)
            .header("X-API-KEY", &self.config.api_key)
            .header("X-API-SIGNATURE", signature)
            .header("X-API-TIMESTAMP", timestamp.to_string())
            .send()
            .await
            .map_err(|e| VenueError::Request(format!("Order status request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VenueError::Authentication(format!(
                "venue refused credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: OrderStatusResponse = response
            .json()
            .await
            .map_err(|e| VenueError::UnexpectedResponse(format!("Failed to parse order status: {}", e)))?;

        debug!(
            "Venue status for {} ({}): {}",
            external_order_id, symbol, payload.status
        );

        Ok(VenueOrderStatus {
            status: VenueStatus::parse(&payload.status),
            executed_quantity: payload.executed_quantity.unwrap_or_default(),
            average_price: payload.average_price.unwrap_or_default(),
        })
    }
}
