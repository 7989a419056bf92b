//! Order processing core
//!
//! Route selection, execution, per-order notifications and the scheduler that
//! drives each order through its state machine.

mod executor;
mod hub;
mod pipeline;
mod rate_limit;
mod router;
mod scheduler;

pub use executor::ExecutionEngine;
pub use hub::{NotificationHub, Subscription, DEFAULT_OBSERVER_BUFFER};
pub use pipeline::{OrderPipeline, PipelineOutcome};
pub use rate_limit::SlidingWindowLimiter;
pub use router::RouteSelector;
pub use scheduler::{backoff_delay, OrderScheduler, SchedulerStats};
