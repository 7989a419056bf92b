use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Quote;
use crate::error::{ExecutionError, QuoteError};

/// A liquidity source able to price a swap.
///
/// Implementations may be slow or fail; the route selector bounds each call
/// with its own timeout and drops failures from consideration.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Venue identifier reported on quotes and used for submission
    fn venue_id(&self) -> &str;

    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
    ) -> std::result::Result<Quote, QuoteError>;
}

/// Proof that a submission landed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub tx_ref: String,
    pub executed_price: Decimal,
}

/// Accepts trade submissions for one or more venues.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    fn supports(&self, venue_id: &str) -> bool;

    async fn execute(
        &self,
        venue_id: &str,
        expected_price: Decimal,
    ) -> std::result::Result<ExecutionReceipt, ExecutionError>;
}
