use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the order engine
#[derive(Error, Debug)]
pub enum DexFlowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Store errors
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Job queue error: {0}")]
    Queue(String),

    // Routing errors
    #[error("no route found")]
    RouteNotFound { token_in: String, token_out: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Worker errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for DexFlowError
pub type Result<T> = std::result::Result<T, DexFlowError>;

impl DexFlowError {
    /// Persistence failures leave the order in an unconfirmed state; the job
    /// attempt is aborted and retried by the scheduler.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            DexFlowError::Database(_)
                | DexFlowError::Store(_)
                | DexFlowError::OrderNotFound(_)
                | DexFlowError::InvalidStateTransition { .. }
        )
    }
}

/// Failure reported by an execution venue
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Slippage tolerance exceeded")]
    SlippageExceeded {
        venue: String,
        expected_price: Decimal,
    },

    #[error("Unknown venue: {0}")]
    UnknownVenue(String),

    #[error("Invalid expected price: {0}")]
    InvalidPrice(Decimal),

    #[error("Rejected by {venue}: {reason}")]
    Rejected { venue: String, reason: String },
}

impl ExecutionError {
    /// Tolerance violations may clear on a fresh quote; everything else is structural.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::SlippageExceeded { .. })
    }
}

/// Failure reported by a quote provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("Quote from {venue} timed out after {elapsed_ms}ms")]
    Timeout { venue: String, elapsed_ms: u64 },

    #[error("Quote unavailable from {venue}: {reason}")]
    Unavailable { venue: String, reason: String },

    #[error("Unusable quote from {venue}: {reason}")]
    Unusable { venue: String, reason: String },
}
