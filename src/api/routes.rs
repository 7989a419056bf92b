use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::websocket_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Order endpoints
        .route("/api/orders/execute", post(handlers::execute_order))
        .route("/api/orders/:order_id", get(handlers::get_order))
        // Live status feed
        .route("/api/orders/ws/:order_id", get(websocket_handler))
        // System endpoints
        .route("/api/queue/stats", get(handlers::get_queue_stats))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(cors)
}
