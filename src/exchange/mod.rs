pub mod factory;
mod traits;

pub use factory::{build_execution_venue, build_quote_providers};
pub use traits::{ExecutionReceipt, ExecutionVenue, QuoteProvider};
