//! Simulated liquidity venues
//!
//! Quotes and fills are drawn from configured bands after a random latency.
//! Random samples are taken before sleeping so no RNG handle crosses an await.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ExecutionConfig, ProviderConfig};
use crate::domain::Quote;
use crate::error::{ExecutionError, QuoteError};
use crate::exchange::{ExecutionReceipt, ExecutionVenue, QuoteProvider};

const UNIT_SCALE: u32 = 6;
const UNIT_STEPS: i64 = 1_000_000;

/// Uniform sample in [0, 1] with six decimal places
fn unit_sample<R: Rng>(rng: &mut R) -> Decimal {
    Decimal::new(rng.gen_range(0..=UNIT_STEPS), UNIT_SCALE)
}

fn latency_sample<R: Rng>(rng: &mut R, min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}

/// Quote source pricing around a fixed base price
#[derive(Debug, Clone)]
pub struct SimulatedQuoteProvider {
    config: ProviderConfig,
}

impl SimulatedQuoteProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl QuoteProvider for SimulatedQuoteProvider {
    fn venue_id(&self) -> &str {
        &self.config.venue_id
    }

    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
    ) -> Result<Quote, QuoteError> {
        let cfg = &self.config;
        let (latency, price_t, liquidity_t) = {
            let mut rng = rand::thread_rng();
            (
                latency_sample(&mut rng, cfg.latency_min_ms, cfg.latency_max_ms),
                unit_sample(&mut rng),
                unit_sample(&mut rng),
            )
        };

        tokio::time::sleep(latency).await;

        let price = cfg.base_price * (cfg.band_low + (cfg.band_high - cfg.band_low) * price_t);
        let liquidity =
            cfg.liquidity_min + (cfg.liquidity_max - cfg.liquidity_min) * liquidity_t;

        debug!(
            venue = %cfg.venue_id,
            %token_in,
            %token_out,
            %price,
            latency_ms = latency.as_millis() as u64,
            "Quote issued"
        );

        Quote::new(
            cfg.venue_id.clone(),
            price.round_dp(8),
            cfg.fee,
            liquidity.round_dp(2),
            amount,
        )
    }
}

/// Execution venue that lands a submission with a configured probability
#[derive(Debug, Clone)]
pub struct SimulatedVenue {
    config: ExecutionConfig,
    venues: HashSet<String>,
}

impl SimulatedVenue {
    pub fn from_config(config: &ExecutionConfig, venues: Vec<String>) -> Self {
        Self {
            config: config.clone(),
            venues: venues.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ExecutionVenue for SimulatedVenue {
    fn supports(&self, venue_id: &str) -> bool {
        self.venues.contains(venue_id)
    }

    async fn execute(
        &self,
        venue_id: &str,
        expected_price: Decimal,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        if !self.supports(venue_id) {
            return Err(ExecutionError::UnknownVenue(venue_id.to_string()));
        }
        if expected_price <= Decimal::ZERO {
            return Err(ExecutionError::InvalidPrice(expected_price));
        }

        let cfg = &self.config;
        let (latency, landed, drift_t, tx_bytes) = {
            let mut rng = rand::thread_rng();
            let mut tx_bytes = [0u8; 32];
            rng.fill(&mut tx_bytes);
            (
                latency_sample(&mut rng, cfg.latency_min_ms, cfg.latency_max_ms),
                rng.gen_bool(cfg.success_probability.clamp(0.0, 1.0)),
                unit_sample(&mut rng),
                tx_bytes,
            )
        };

        tokio::time::sleep(latency).await;

        if !landed {
            warn!(venue = %venue_id, %expected_price, "Submission rejected on slippage");
            return Err(ExecutionError::SlippageExceeded {
                venue: venue_id.to_string(),
                expected_price,
            });
        }

        let band = cfg.price_band;
        let factor = Decimal::ONE - band + Decimal::TWO * band * drift_t;
        let executed_price = (expected_price * factor).round_dp(8);

        Ok(ExecutionReceipt {
            tx_ref: format!("0x{}", hex::encode(tx_bytes)),
            executed_price,
        })
    }
}
