//! Venue Client Trait
//!
//! Common interface for querying order state on an execution venue. The
//! order sweeper only depends on this trait, so a live HTTP venue and a local
//! simulator are interchangeable.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Common result type for venue operations
pub type VenueResult<T> = Result<T, VenueError>;

/// Errors that can occur while talking to a venue
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VenueError {
    #[error("Venue request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Request(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Venue rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Unexpected venue response: {0}")]
    UnexpectedResponse(String),
}

/// Order status as reported by a venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueStatus {
    Unfilled,
    PartiallyFilled,
    FullyFilled,
    CanceledUnfilled,
    /// Status string the venue sent that we do not act on
    Unknown(String),
}

impl VenueStatus {
    /// Map a venue status string, tolerating the common spellings
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "UNFILLED" | "OPEN" | "NEW" | "PENDING" => VenueStatus::Unfilled,
            "PARTIALLY_FILLED" | "PARTIAL" => VenueStatus::PartiallyFilled,
            "FULLY_FILLED" | "FILLED" => VenueStatus::FullyFilled,
            "CANCELED_UNFILLED" | "CANCELED" | "CANCELLED" | "EXPIRED" => {
                VenueStatus::CanceledUnfilled
            }
            _ => VenueStatus::Unknown(raw.to_string()),
        }
    }
}

impl std::fmt::Display for VenueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueStatus::Unfilled => write!(f, "UNFILLED"),
            VenueStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            VenueStatus::FullyFilled => write!(f, "FULLY_FILLED"),
            VenueStatus::CanceledUnfilled => write!(f, "CANCELED_UNFILLED"),
            VenueStatus::Unknown(raw) => write!(f, "UNKNOWN({})", raw),
        }
    }
}

/// Execution report for one order
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOrderStatus {
    pub status: VenueStatus,
    pub executed_quantity: Decimal,
    pub average_price: Decimal,
}

impl VenueOrderStatus {
    pub fn filled(executed_quantity: Decimal, average_price: Decimal) -> Self {
        VenueOrderStatus {
            status: VenueStatus::FullyFilled,
            executed_quantity,
            average_price,
        }
    }

    pub fn with_status(status: VenueStatus) -> Self {
        VenueOrderStatus {
            status,
            executed_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
        }
    }
}

/// Venue client trait providing order status lookups
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Get the name of this venue
    fn name(&self) -> &str;

    /// Get the status of an order
    ///
    /// # Arguments
    /// * `symbol` - Symbol the order was placed on
    /// * `external_order_id` - The venue-assigned order ID
    ///
    /// Must be safe to call repeatedly for the same order.
    async fn get_order_status(
        &self,
        symbol: &str,
        external_order_id: &str,
    ) -> VenueResult<VenueOrderStatus>;
}
