use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::api::{state::AppState, types::*};
use crate::domain::Order;
use crate::validation::validate_submission;

/// POST /api/orders/execute
pub async fn execute_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteOrderRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<ExecuteOrderResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let input = validate_submission(
        &request.order_type,
        &request.token_in,
        &request.token_out,
        request.amount_in,
        request.target_price,
    )?;

    let order = state.runtime.submit(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ExecuteOrderResponse::new(order.id, order.status)),
    ))
}

/// GET /api/orders/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> std::result::Result<Json<Order>, ApiError> {
    let order_id =
        Uuid::parse_str(&order_id).map_err(|_| ApiError::not_found("Order not found"))?;

    state
        .runtime
        .orders()
        .find_by_id(order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

/// GET /api/queue/stats
pub async fn get_queue_stats(
    State(state): State<AppState>,
) -> std::result::Result<Json<QueueStatsResponse>, ApiError> {
    let scheduler = state.runtime.scheduler();
    let counts = scheduler.job_counts().await?;

    Ok(Json(QueueStatsResponse {
        waiting: counts.waiting,
        active: counts.active,
        failed: counts.failed,
        scheduler: scheduler.stats(),
    }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let uptime = (now - state.runtime.started_at()).num_milliseconds().max(0) as f64 / 1000.0;

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: now,
        uptime,
    })
}
