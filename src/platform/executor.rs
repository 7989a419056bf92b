use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ExecutionError;
use crate::exchange::{ExecutionReceipt, ExecutionVenue};

/// Submits a trade to a selected venue.
///
/// Knows nothing about orders or retries; the caller reads the failure class
/// from `ExecutionError::is_retryable`.
pub struct ExecutionEngine {
    venue: Arc<dyn ExecutionVenue>,
}

impl ExecutionEngine {
    pub fn new(venue: Arc<dyn ExecutionVenue>) -> Self {
        Self { venue }
    }

    pub async fn execute_at(
        &self,
        venue_id: &str,
        expected_price: Decimal,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        if !self.venue.supports(venue_id) {
            return Err(ExecutionError::UnknownVenue(venue_id.to_string()));
        }
        if expected_price <= Decimal::ZERO {
            return Err(ExecutionError::InvalidPrice(expected_price));
        }

        let start = Instant::now();
        match self.venue.execute(venue_id, expected_price).await {
            Ok(receipt) => {
                info!(
                    venue = %venue_id,
                    %expected_price,
                    executed_price = %receipt.executed_price,
                    tx = %receipt.tx_ref,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Execution confirmed"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    venue = %venue_id,
                    retryable = e.is_retryable(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Execution failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}
