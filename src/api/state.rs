use std::sync::Arc;

use crate::bootstrap::Runtime;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Order store, scheduler and notification hub
    pub runtime: Arc<Runtime>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }
}
