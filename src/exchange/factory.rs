use std::sync::Arc;

use crate::adapters::{SimulatedQuoteProvider, SimulatedVenue};
use crate::config::{AppConfig, RoutingConfig};

use super::{ExecutionVenue, QuoteProvider};

/// Create the quote providers from `RoutingConfig`, preserving priority order.
pub fn build_quote_providers(routing: &RoutingConfig) -> Vec<Arc<dyn QuoteProvider>> {
    routing
        .providers
        .iter()
        .map(|provider| -> Arc<dyn QuoteProvider> {
            Arc::new(SimulatedQuoteProvider::from_config(provider))
        })
        .collect()
}

/// Create the execution venue from `AppConfig`.
pub fn build_execution_venue(app_config: &AppConfig) -> Arc<dyn ExecutionVenue> {
    Arc::new(SimulatedVenue::from_config(
        &app_config.execution,
        app_config.execution_venues(),
    ))
}
