pub mod adapters;
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod persistence;
pub mod platform;
pub mod validation;

pub use bootstrap::Runtime;
pub use config::AppConfig;
pub use domain::{NewOrder, Order, OrderPatch, OrderStatus, OrderType, OrderUpdate, Quote};
pub use error::{DexFlowError, ExecutionError, QuoteError, Result};
pub use persistence::{JobStore, OrderStore};
pub use platform::{
    ExecutionEngine, NotificationHub, OrderPipeline, OrderScheduler, PipelineOutcome,
    RouteSelector, SlidingWindowLimiter, Subscription,
};
