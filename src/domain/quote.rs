use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::QuoteError;

/// A venue's price offer for one routing attempt. Never persisted, never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(rename = "dex")]
    pub venue_id: String,
    pub price: Decimal,
    /// Fee as a fraction (0.003 = 0.3%)
    pub fee: Decimal,
    pub estimated_output: Decimal,
    pub liquidity: Decimal,
}

impl Quote {
    /// Fails with `Unusable` when the estimated output does not fit a `Decimal`
    pub fn new(
        venue_id: impl Into<String>,
        price: Decimal,
        fee: Decimal,
        liquidity: Decimal,
        amount: Decimal,
    ) -> Result<Self, QuoteError> {
        let mut quote = Self {
            venue_id: venue_id.into(),
            price,
            fee,
            estimated_output: Decimal::ZERO,
            liquidity,
        };
        quote.estimated_output = quote.net_output(amount).ok_or_else(|| QuoteError::Unusable {
            venue: quote.venue_id.clone(),
            reason: format!("output for amount {} overflows", amount),
        })?;
        Ok(quote)
    }

    /// amount × price × (1 − fee), `None` on overflow
    pub fn net_output(&self, amount: Decimal) -> Option<Decimal> {
        amount
            .checked_mul(self.price)?
            .checked_mul(Decimal::ONE.checked_sub(self.fee)?)
    }

    /// Reason the quote cannot be used for routing, if any
    pub fn defect(&self) -> Option<String> {
        if self.price <= Decimal::ZERO {
            return Some(format!("non-positive price {}", self.price));
        }
        if self.fee < Decimal::ZERO || self.fee >= Decimal::ONE {
            return Some(format!("fee {} outside [0, 1)", self.fee));
        }
        if self.liquidity < Decimal::ZERO {
            return Some(format!("negative liquidity {}", self.liquidity));
        }
        None
    }
}
