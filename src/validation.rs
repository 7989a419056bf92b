/// Input validation for order submissions
///
/// Malformed submissions are rejected here, before an order record exists
/// or a job is queued.
use crate::domain::{NewOrder, OrderType};
use crate::error::{DexFlowError, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Largest accepted amount or price. Keeps `amount × price` well inside the
/// `NUMERIC(38,18)` columns and clear of `Decimal` overflow.
pub const MAX_AMOUNT: f64 = 1e15;

/// Validate the order type string
pub fn validate_order_type(raw: &str) -> Result<OrderType> {
    raw.parse::<OrderType>()
        .map_err(|_| DexFlowError::Validation("Invalid order type".to_string()))
}

/// Validate a token pair (both present, not the same token)
pub fn validate_token_pair(token_in: &str, token_out: &str) -> Result<()> {
    let token_in = token_in.trim();
    let token_out = token_out.trim();

    if token_in.is_empty() || token_out.is_empty() {
        return Err(DexFlowError::Validation(
            "tokenIn and tokenOut are required".to_string(),
        ));
    }

    if token_in == token_out {
        return Err(DexFlowError::Validation(format!(
            "tokenIn and tokenOut must differ: {}",
            token_in
        )));
    }

    Ok(())
}

/// Validate an amount (finite, strictly positive, at most `MAX_AMOUNT`)
///
/// # Arguments
/// * `amount` - Raw amount from the request body
/// * `field_name` - Name of the field for error messages
pub fn validate_amount(amount: f64, field_name: &str) -> Result<Decimal> {
    if !amount.is_finite() {
        return Err(DexFlowError::Validation(format!(
            "{} must be a finite number",
            field_name
        )));
    }

    if amount <= 0.0 {
        return Err(DexFlowError::Validation(format!(
            "{} must be positive: {}",
            field_name, amount
        )));
    }

    if amount > MAX_AMOUNT {
        return Err(DexFlowError::Validation(format!(
            "{} must not exceed {}: {}",
            field_name, MAX_AMOUNT, amount
        )));
    }

    // Values below Decimal precision convert to zero
    match Decimal::from_f64(amount) {
        Some(value) if value > Decimal::ZERO => Ok(value),
        _ => Err(DexFlowError::Validation(format!(
            "{} is out of range: {}",
            field_name, amount
        ))),
    }
}

/// Validate a full submission and build the order input
pub fn validate_submission(
    order_type: &str,
    token_in: &str,
    token_out: &str,
    amount_in: f64,
    target_price: Option<f64>,
) -> Result<NewOrder> {
    let order_type = validate_order_type(order_type)?;
    validate_token_pair(token_in, token_out)?;
    let amount_in = validate_amount(amount_in, "amountIn")?;
    let target_price = target_price
        .map(|price| validate_amount(price, "targetPrice"))
        .transpose()?;

    Ok(NewOrder {
        order_type,
        token_in: token_in.trim().to_string(),
        token_out: token_out.trim().to_string(),
        amount_in,
        target_price,
    })
}
