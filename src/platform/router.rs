//! Route Selector
//!
//! Fans a quote request out to every provider at once and picks the venue with
//! the best net output. Providers that fail, time out or return an unusable
//! quote are dropped from consideration; only a total wipe-out is an error.

use futures_util::stream::{FuturesUnordered, StreamExt};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::domain::Quote;
use crate::error::{DexFlowError, QuoteError, Result};
use crate::exchange::QuoteProvider;

/// A usable quote together with its provider's position in the priority list
#[derive(Debug, Clone)]
struct Candidate {
    priority: usize,
    net_output: Decimal,
    quote: Quote,
}

impl Candidate {
    /// Higher net output, then deeper liquidity, then earlier provider
    fn rank(&self, other: &Self) -> Ordering {
        self.net_output
            .cmp(&other.net_output)
            .then(self.quote.liquidity.cmp(&other.quote.liquidity))
            .then(other.priority.cmp(&self.priority))
    }
}

pub struct RouteSelector {
    providers: Vec<Arc<dyn QuoteProvider>>,
    quote_timeout: Duration,
    overall_deadline: Option<Duration>,
}

impl RouteSelector {
    pub fn new(providers: Vec<Arc<dyn QuoteProvider>>, quote_timeout: Duration) -> Self {
        Self {
            providers,
            quote_timeout,
            overall_deadline: None,
        }
    }

    pub fn from_config(providers: Vec<Arc<dyn QuoteProvider>>, config: &RoutingConfig) -> Self {
        let selector = Self::new(providers, config.quote_timeout());
        match config.overall_deadline() {
            Some(deadline) => selector.with_overall_deadline(deadline),
            None => selector,
        }
    }

    /// Stop waiting for stragglers once `deadline` has passed and a quote is in hand
    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }

    pub async fn select_route(
        &self,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
    ) -> Result<Quote> {
        let started = Instant::now();
        let deadline = self.overall_deadline.map(|d| started + d);

        let mut pending: FuturesUnordered<_> = self
            .providers
            .iter()
            .enumerate()
            .map(|(priority, provider)| {
                let timeout = self.quote_timeout;
                async move {
                    let call_started = Instant::now();
                    let result = match tokio::time::timeout(
                        timeout,
                        provider.quote(token_in, token_out, amount),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(QuoteError::Timeout {
                            venue: provider.venue_id().to_string(),
                            elapsed_ms: call_started.elapsed().as_millis() as u64,
                        }),
                    };
                    (priority, result)
                }
            })
            .collect();

        let mut candidates: Vec<Candidate> = Vec::with_capacity(self.providers.len());

        loop {
            let next = match deadline {
                Some(deadline) if !candidates.is_empty() => {
                    match tokio::time::timeout_at(deadline, pending.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                outstanding = pending.len(),
                                "Routing deadline reached, skipping slow providers"
                            );
                            break;
                        }
                    }
                }
                _ => pending.next().await,
            };

            let Some((priority, result)) = next else {
                break;
            };

            match result.and_then(|quote| screen(quote, amount)) {
                Ok(candidate) => {
                    debug!(
                        venue = %candidate.quote.venue_id,
                        price = %candidate.quote.price,
                        "Quote received"
                    );
                    candidates.push(Candidate {
                        priority,
                        ..candidate
                    });
                }
                Err(err) => warn!("Quote excluded: {}", err),
            }
        }

        let received = candidates.len();
        let best = candidates
            .into_iter()
            .max_by(|a, b| a.rank(b))
            .ok_or_else(|| DexFlowError::RouteNotFound {
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            })?;

        info!(
            venue = %best.quote.venue_id,
            net_output = %best.net_output,
            quotes = received,
            providers = self.providers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Route selected"
        );

        let mut quote = best.quote;
        quote.estimated_output = best.net_output;
        Ok(quote)
    }
}

/// Reject unusable quotes and compute the net output the ranking uses
fn screen(quote: Quote, amount: Decimal) -> std::result::Result<Candidate, QuoteError> {
    if let Some(reason) = quote.defect() {
        return Err(QuoteError::Unusable {
            venue: quote.venue_id,
            reason,
        });
    }
    let net_output = quote
        .net_output(amount)
        .ok_or_else(|| QuoteError::Unusable {
            venue: quote.venue_id.clone(),
            reason: format!("output for amount {} overflows", amount),
        })?;

    Ok(Candidate {
        priority: 0,
        net_output,
        quote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedProvider {
        venue: String,
        price: Decimal,
        fee: Decimal,
        liquidity: Decimal,
        delay: Duration,
        fail: bool,
    }

    impl FixedProvider {
        fn new(venue: &str, price: Decimal, fee: Decimal) -> Self {
            Self {
                venue: venue.to_string(),
                price,
                fee,
                liquidity: dec!(1_000_000),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn liquidity(mut self, liquidity: Decimal) -> Self {
            self.liquidity = liquidity;
            self
        }

        fn delay_ms(mut self, ms: u64) -> Self {
            self.delay = Duration::from_millis(ms);
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn boxed(self) -> Arc<dyn QuoteProvider> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl QuoteProvider for FixedProvider {
        fn venue_id(&self) -> &str {
            &self.venue
        }

        async fn quote(
            &self,
            _token_in: &str,
            _token_out: &str,
            amount: Decimal,
        ) -> std::result::Result<Quote, QuoteError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(QuoteError::Unavailable {
                    venue: self.venue.clone(),
                    reason: "pool offline".to_string(),
                });
            }
            Quote::new(
                self.venue.clone(),
                self.price,
                self.fee,
                self.liquidity,
                amount,
            )
        }
    }

    fn selector(providers: Vec<Arc<dyn QuoteProvider>>) -> RouteSelector {
        RouteSelector::new(providers, Duration::from_millis(2000))
    }

    #[tokio::test]
    async fn test_picks_best_net_output() {
        let route = selector(vec![
            FixedProvider::new("meteora", dec!(99), dec!(0.002)).boxed(),
            FixedProvider::new("raydium", dec!(100), dec!(0.003)).boxed(),
        ]);

        let quote = route.select_route("SOL", "USDC", dec!(1000)).await.unwrap();
        assert_eq!(quote.venue_id, "raydium");
        assert_eq!(quote.estimated_output, dec!(99700));
    }

    #[tokio::test]
    async fn test_tie_prefers_liquidity_then_priority() {
        let route = selector(vec![
            FixedProvider::new("a", dec!(100), dec!(0.003)).boxed(),
            FixedProvider::new("b", dec!(100), dec!(0.003))
                .liquidity(dec!(2_000_000))
                .boxed(),
        ]);
        let quote = route.select_route("SOL", "USDC", dec!(1)).await.unwrap();
        assert_eq!(quote.venue_id, "b");

        let route = selector(vec![
            FixedProvider::new("first", dec!(100), dec!(0.003)).delay_ms(20).boxed(),
            FixedProvider::new("second", dec!(100), dec!(0.003)).boxed(),
        ]);
        let quote = route.select_route("SOL", "USDC", dec!(1)).await.unwrap();
        assert_eq!(quote.venue_id, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_and_slow_providers_are_excluded() {
        let route = selector(vec![
            FixedProvider::new("down", dec!(120), dec!(0.001)).failing().boxed(),
            FixedProvider::new("slow", dec!(130), dec!(0.001)).delay_ms(5_000).boxed(),
            FixedProvider::new("ok", dec!(100), dec!(0.003)).delay_ms(200).boxed(),
        ]);

        let started = Instant::now();
        let quote = route.select_route("SOL", "USDC", dec!(10)).await.unwrap();
        assert_eq!(quote.venue_id, "ok");
        // Bounded by the per-provider timeout, not the slow provider
        assert!(started.elapsed() < Duration::from_millis(2_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_usable_quote_is_route_not_found() {
        let mut broken = FixedProvider::new("broken", dec!(100), dec!(0.003));
        broken.price = Decimal::ZERO;

        let route = selector(vec![
            FixedProvider::new("down", dec!(100), dec!(0.003)).failing().boxed(),
            FixedProvider::new("slow", dec!(100), dec!(0.003)).delay_ms(10_000).boxed(),
            broken.boxed(),
        ]);

        let err = route.select_route("SOL", "USDC", dec!(10)).await.unwrap_err();
        assert!(matches!(err, DexFlowError::RouteNotFound { .. }));
        assert_eq!(err.to_string(), "no route found");
    }

    #[tokio::test]
    async fn test_overflowing_amount_is_route_not_found() {
        let route = selector(vec![
            FixedProvider::new("raydium", dec!(100), dec!(0.003)).boxed(),
            FixedProvider::new("meteora", dec!(99), dec!(0.002)).boxed(),
        ]);
        let amount = Decimal::from_i128_with_scale(10_i128.pow(27), 0);

        let err = route.select_route("SOL", "USDC", amount).await.unwrap_err();
        assert!(matches!(err, DexFlowError::RouteNotFound { .. }));
    }

    #[test]
    fn test_screen_rejects_overflowing_output() {
        let quote = Quote::new("raydium", dec!(100), dec!(0.003), dec!(1), dec!(1)).unwrap();
        let err = screen(quote, Decimal::MAX).unwrap_err();
        assert!(matches!(err, QuoteError::Unusable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline_only_applies_with_a_quote_in_hand() {
        let providers = || {
            vec![
                FixedProvider::new("fast", dec!(99), dec!(0.003)).delay_ms(100).boxed(),
                FixedProvider::new("late", dec!(105), dec!(0.003)).delay_ms(1_500).boxed(),
            ]
        };

        // Default waits for every provider
        let quote = selector(providers())
            .select_route("SOL", "USDC", dec!(1))
            .await
            .unwrap();
        assert_eq!(quote.venue_id, "late");

        let quote = selector(providers())
            .with_overall_deadline(Duration::from_millis(500))
            .select_route("SOL", "USDC", dec!(1))
            .await
            .unwrap();
        assert_eq!(quote.venue_id, "fast");

        // Nothing in hand at the deadline: keep waiting for the first quote
        let quote = selector(vec![FixedProvider::new("late", dec!(105), dec!(0.003))
            .delay_ms(1_500)
            .boxed()])
        .with_overall_deadline(Duration::from_millis(500))
        .select_route("SOL", "USDC", dec!(1))
        .await
        .unwrap();
        assert_eq!(quote.venue_id, "late");
    }
}
