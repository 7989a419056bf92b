use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::domain::OrderStatus;
use crate::error::DexFlowError;
use crate::platform::SchedulerStats;

// ============================================================================
// Order Types
// ============================================================================

/// Body of `POST /api/orders/execute`. Missing fields fall through to
/// validation so the client gets a `{error}` body rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteOrderRequest {
    pub order_type: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub target_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub ws_url: String,
}

impl ExecuteOrderResponse {
    pub fn new(order_id: Uuid, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            ws_url: format!("/api/orders/ws/{}", order_id),
        }
    }
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the runtime was built
    pub uptime: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatsResponse {
    pub waiting: u64,
    pub active: u64,
    pub failed: u64,
    pub scheduler: SchedulerStats,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every handler, rendered as `{ "error": ... }`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DexFlowError> for ApiError {
    fn from(err: DexFlowError) -> Self {
        match err {
            DexFlowError::Validation(message) => Self::bad_request(message),
            DexFlowError::OrderNotFound(_) => Self::not_found("Order not found"),
            other => {
                error!("Request failed: {}", other);
                Self::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
