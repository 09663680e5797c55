use crate::domain::repositories::venue_client::{
    VenueClient, VenueOrderStatus, VenueResult, VenueStatus,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Venue that reports every order as filled.
///
/// Execution quantity and price are left at zero, so the order's own values
/// are used for the fill.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedVenue;

#[async_trait]
impl VenueClient for SimulatedVenue {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        _external_order_id: &str,
    ) -> VenueResult<VenueOrderStatus> {
        Ok(VenueOrderStatus {
            status: VenueStatus::FullyFilled,
            executed_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
        })
    }
}
