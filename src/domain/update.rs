use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderPatch, OrderStatus};

/// Status carried on the push feed. `Connected` is the synthetic greeting
/// sent once per observer; the rest mirror `OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Connected,
    Pending,
    Routing,
    Building,
    Submitted,
    Confirmed,
    Failed,
}

impl From<OrderStatus> for StreamStatus {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => StreamStatus::Pending,
            OrderStatus::Routing => StreamStatus::Routing,
            OrderStatus::Building => StreamStatus::Building,
            OrderStatus::Submitted => StreamStatus::Submitted,
            OrderStatus::Confirmed => StreamStatus::Confirmed,
            OrderStatus::Failed => StreamStatus::Failed,
        }
    }
}

/// Wire payload pushed to every observer of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order_id: Uuid,
    pub status: StreamStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_dex: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub expected_output: Option<Decimal>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub executed_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderUpdate {
    pub fn connected(order_id: Uuid) -> Self {
        Self {
            order_id,
            status: StreamStatus::Connected,
            timestamp: Utc::now(),
            selected_dex: None,
            expected_output: None,
            executed_price: None,
            tx_hash: None,
            error: None,
        }
    }

    /// Build the delta for a persisted transition. Only fields carried by the
    /// patch appear on the wire; retry bookkeeping stays internal.
    pub fn transition(order_id: Uuid, status: OrderStatus, patch: &OrderPatch) -> Self {
        Self {
            order_id,
            status: status.into(),
            timestamp: Utc::now(),
            selected_dex: patch.selected_venue.clone(),
            expected_output: patch.expected_output,
            executed_price: patch.executed_price,
            tx_hash: patch.tx_ref.clone(),
            error: patch.error_message.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
