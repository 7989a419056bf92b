use async_trait::async_trait;
use dexflow::adapters::MemoryOrderStore;
use dexflow::config::AppConfig;
use dexflow::domain::{NewOrder, OrderStatus, OrderUpdate, Quote, StreamStatus};
use dexflow::exchange::{ExecutionReceipt, ExecutionVenue, QuoteProvider};
use dexflow::persistence::{JobStore, MemoryJobStore, OrderStore};
use dexflow::{ExecutionError, QuoteError, Runtime, Subscription};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FixedProvider {
    venue: &'static str,
    price: Decimal,
    fee: Decimal,
    online: bool,
}

#[async_trait]
impl QuoteProvider for FixedProvider {
    fn venue_id(&self) -> &str {
        self.venue
    }

    async fn quote(
        &self,
        _token_in: &str,
        _token_out: &str,
        amount: Decimal,
    ) -> Result<Quote, QuoteError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if !self.online {
            return Err(QuoteError::Unavailable {
                venue: self.venue.to_string(),
                reason: "offline".to_string(),
            });
        }
        Quote::new(
            self.venue,
            self.price,
            self.fee,
            dec!(1_000_000),
            amount,
        )
    }
}

/// Replays scripted outcomes, then fills at the expected price
#[derive(Default)]
struct ScriptedVenue {
    outcomes: Mutex<VecDeque<Result<ExecutionReceipt, ExecutionError>>>,
    always_slip: bool,
    panic_on_first_call: bool,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedVenue {
    fn with(outcomes: Vec<Result<ExecutionReceipt, ExecutionError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    fn always_slipping() -> Self {
        Self {
            always_slip: true,
            ..Self::default()
        }
    }

    fn panicking_once() -> Self {
        Self {
            panic_on_first_call: true,
            ..Self::default()
        }
    }

    fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }
}

fn slippage(venue: &str) -> ExecutionError {
    ExecutionError::SlippageExceeded {
        venue: venue.to_string(),
        expected_price: dec!(100),
    }
}

#[async_trait]
impl ExecutionVenue for ScriptedVenue {
    fn supports(&self, venue_id: &str) -> bool {
        venue_id == "raydium" || venue_id == "meteora"
    }

    async fn execute(
        &self,
        venue_id: &str,
        expected_price: Decimal,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_first_call && call == 0 {
            panic!("venue adapter bug");
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5) + self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_slip {
            return Err(slippage(venue_id));
        }
        let scripted = self.outcomes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ExecutionReceipt {
                tx_ref: format!("0x{:064x}", call),
                executed_price: expected_price,
            })
        })
    }
}

struct Harness {
    runtime: Runtime,
    orders: Arc<MemoryOrderStore>,
    jobs: Arc<MemoryJobStore>,
    venue: Arc<ScriptedVenue>,
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.queue.concurrency = 4;
    config.queue.max_attempts = 3;
    config.queue.backoff_base_ms = 10;
    config.queue.poll_interval_ms = 10;
    config
}

fn providers(routes_online: bool) -> Vec<Arc<dyn QuoteProvider>> {
    vec![
        Arc::new(FixedProvider {
            venue: "raydium",
            price: dec!(100),
            fee: dec!(0.003),
            online: routes_online,
        }),
        Arc::new(FixedProvider {
            venue: "meteora",
            price: dec!(99),
            fee: dec!(0.002),
            online: routes_online,
        }),
    ]
}

fn harness(routes_online: bool, venue: ScriptedVenue) -> Harness {
    let orders = Arc::new(MemoryOrderStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let venue = Arc::new(venue);

    let runtime = Runtime::with_components(
        fast_config(),
        orders.clone(),
        jobs.clone(),
        providers(routes_online),
        venue.clone(),
    );

    Harness {
        runtime,
        orders,
        jobs,
        venue,
    }
}

/// Collect every delta up to and including the terminal one
async fn collect_until_terminal(subscription: &mut Subscription) -> Vec<Arc<OrderUpdate>> {
    let mut updates = Vec::new();
    loop {
        let update = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
            .await
            .expect("timed out waiting for order update")
            .expect("feed closed before a terminal update");
        let terminal = matches!(update.status, StreamStatus::Confirmed | StreamStatus::Failed);
        updates.push(update);
        if terminal {
            return updates;
        }
    }
}

fn statuses(updates: &[Arc<OrderUpdate>]) -> Vec<StreamStatus> {
    updates.iter().map(|u| u.status).collect()
}

/// A confirmed order walks the forward path exactly once and lands on the best venue.
#[tokio::test]
async fn order_is_routed_executed_and_confirmed() {
    let h = harness(true, ScriptedVenue::default());
    let order = h
        .runtime
        .submit(NewOrder::market("SOL", "USDC", dec!(1000)))
        .await
        .unwrap();
    let mut feed = h.runtime.hub().subscribe(order.id);
    h.runtime.start().await.unwrap();

    let updates = collect_until_terminal(&mut feed).await;
    assert_eq!(
        statuses(&updates),
        vec![
            StreamStatus::Routing,
            StreamStatus::Building,
            StreamStatus::Submitted,
            StreamStatus::Confirmed
        ]
    );
    assert_eq!(updates[1].selected_dex.as_deref(), Some("raydium"));
    assert_eq!(updates[1].expected_output, Some(dec!(99700)));
    assert!(updates[3].tx_hash.is_some());

    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.retry_count, 0);

    h.runtime.shutdown().await;
    // Completed jobs are discarded
    assert!(h.jobs.get(order.id).await.unwrap().is_none());
}

/// When every provider fails the order fails with "no route found" and never reaches execution.
#[tokio::test]
async fn no_route_fails_without_consuming_retries() {
    let h = harness(false, ScriptedVenue::default());
    let order = h
        .runtime
        .submit(NewOrder::market("SOL", "USDC", dec!(10)))
        .await
        .unwrap();
    let mut feed = h.runtime.hub().subscribe(order.id);
    h.runtime.start().await.unwrap();

    let updates = collect_until_terminal(&mut feed).await;
    assert_eq!(
        statuses(&updates),
        vec![StreamStatus::Routing, StreamStatus::Failed]
    );
    assert_eq!(updates[1].error.as_deref(), Some("no route found"));

    h.runtime.shutdown().await;

    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("no route found"));
    assert_eq!(stored.retry_count, 0);
    assert_eq!(h.venue.calls.load(Ordering::SeqCst), 0);

    // Terminal failures are retained for inspection
    let job = h.jobs.get(order.id).await.unwrap().unwrap();
    assert_eq!(job.attempts_made, 1);
    assert_eq!(h.jobs.counts().await.unwrap().failed, 1);
}

/// A slippage failure re-enters routing and the next attempt can still confirm.
#[tokio::test]
async fn retry_reenters_routing_then_confirms() {
    let h = harness(true, ScriptedVenue::with(vec![Err(slippage("raydium"))]));
    let order = h
        .runtime
        .submit(NewOrder::market("SOL", "USDC", dec!(1)))
        .await
        .unwrap();
    let mut feed = h.runtime.hub().subscribe(order.id);
    h.runtime.start().await.unwrap();

    let updates = collect_until_terminal(&mut feed).await;
    assert_eq!(
        statuses(&updates),
        vec![
            StreamStatus::Routing,
            StreamStatus::Building,
            StreamStatus::Submitted,
            StreamStatus::Routing,
            StreamStatus::Building,
            StreamStatus::Submitted,
            StreamStatus::Confirmed
        ]
    );

    h.runtime.shutdown().await;
    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(h.venue.calls.load(Ordering::SeqCst), 2);
}

/// Repeated slippage exhausts the attempts; retry count ends at the configured maximum.
#[tokio::test]
async fn exhausted_retries_fail_with_max_retry_count() {
    let h = harness(true, ScriptedVenue::always_slipping());
    let order = h
        .runtime
        .submit(NewOrder::market("SOL", "USDC", dec!(1)))
        .await
        .unwrap();
    let mut feed = h.runtime.hub().subscribe(order.id);
    h.runtime.start().await.unwrap();

    let updates = collect_until_terminal(&mut feed).await;
    let routing_entries = updates
        .iter()
        .filter(|u| u.status == StreamStatus::Routing)
        .count();
    assert_eq!(routing_entries, 3);
    assert_eq!(updates.last().unwrap().status, StreamStatus::Failed);
    assert_eq!(
        updates.last().unwrap().error.as_deref(),
        Some("Slippage tolerance exceeded")
    );

    h.runtime.shutdown().await;
    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert_eq!(h.venue.calls.load(Ordering::SeqCst), 3);

    let stats = h.runtime.scheduler().stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.failed, 1);
}

/// Enqueuing the same order many times yields a single pipeline run.
#[tokio::test]
async fn duplicate_enqueue_runs_one_pipeline() {
    let h = harness(true, ScriptedVenue::default());
    let order = h
        .orders
        .create(NewOrder::market("SOL", "USDC", dec!(5)))
        .await
        .unwrap();

    let scheduler = h.runtime.scheduler().clone();
    let mut attempts = Vec::new();
    for _ in 0..8 {
        let scheduler = scheduler.clone();
        let order = order.clone();
        attempts.push(tokio::spawn(async move { scheduler.enqueue(&order).await }));
    }
    let mut admitted = 0;
    for attempt in attempts {
        if attempt.await.unwrap().unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);

    let mut feed = h.runtime.hub().subscribe(order.id);
    h.runtime.start().await.unwrap();
    let updates = collect_until_terminal(&mut feed).await;
    h.runtime.shutdown().await;

    let routing_entries = updates
        .iter()
        .filter(|u| u.status == StreamStatus::Routing)
        .count();
    assert_eq!(routing_entries, 1);

    let stats = scheduler.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.duplicates, 7);
    assert_eq!(h.venue.calls.load(Ordering::SeqCst), 1);
}

/// Two observers of one order see the same payloads in the same order.
#[tokio::test]
async fn observers_of_one_order_receive_identical_updates() {
    let h = harness(true, ScriptedVenue::default());
    let order = h
        .runtime
        .submit(NewOrder::market("SOL", "USDC", dec!(3)))
        .await
        .unwrap();
    let mut first = h.runtime.hub().subscribe(order.id);
    let mut second = h.runtime.hub().subscribe(order.id);
    h.runtime.start().await.unwrap();

    let a = collect_until_terminal(&mut first).await;
    let b = collect_until_terminal(&mut second).await;
    h.runtime.shutdown().await;

    let a_json: Vec<String> = a.iter().map(|u| u.to_json().unwrap()).collect();
    let b_json: Vec<String> = b.iter().map(|u| u.to_json().unwrap()).collect();
    assert_eq!(a_json, b_json);
}

/// Orders nobody watches still run to completion; the hub keeps no entries for them.
#[tokio::test]
async fn unobserved_orders_complete() {
    let h = harness(true, ScriptedVenue::default());
    h.runtime.start().await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..5 {
        let order = h
            .runtime
            .submit(NewOrder::market("SOL", "USDC", dec!(2)))
            .await
            .unwrap();
        ids.push(order.id);
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let mut done = 0;
            for id in &ids {
                let order = h.orders.find_by_id(*id).await.unwrap().unwrap();
                if order.status.is_terminal() {
                    done += 1;
                }
            }
            if done == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("orders did not finish");

    h.runtime.shutdown().await;
    assert_eq!(h.runtime.hub().tracked_orders(), 0);
    assert_eq!(h.runtime.scheduler().stats().completed, 5);
}

/// A stored order reads back with its inputs intact and status pending.
#[tokio::test]
async fn created_order_round_trips() {
    let store = MemoryOrderStore::new();
    let input = NewOrder::market("SOL", "USDC", dec!(12.5)).with_target_price(dec!(101));
    let created = store.create(input.clone()).await.unwrap();

    let found = store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(found.inputs(), input);
    assert_eq!(found.status, OrderStatus::Pending);
    assert_eq!(found.id, created.id);
}

/// Shutdown ends every live feed.
#[tokio::test]
async fn shutdown_closes_feeds() {
    let h = harness(true, ScriptedVenue::default());
    let mut feed = h.runtime.hub().subscribe(uuid::Uuid::new_v4());
    h.runtime.start().await.unwrap();
    h.runtime.shutdown().await;

    let next = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .expect("feed should end promptly");
    assert!(next.is_none());
}

async fn wait_for_terminal(orders: &MemoryOrderStore, id: uuid::Uuid) -> dexflow::Order {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let order = orders.find_by_id(id).await.unwrap().unwrap();
            if order.status.is_terminal() {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("order did not reach a terminal status")
}

/// A panicking venue call costs one attempt; the worker survives and the retry confirms.
#[tokio::test]
async fn panicking_attempt_is_settled_and_retried() {
    let h = harness(true, ScriptedVenue::panicking_once());
    let order = h
        .runtime
        .submit(NewOrder::market("SOL", "USDC", dec!(4)))
        .await
        .unwrap();
    h.runtime.start().await.unwrap();

    let stored = wait_for_terminal(&h.orders, order.id).await;
    h.runtime.shutdown().await;

    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(h.venue.calls.load(Ordering::SeqCst), 2);

    let stats = h.runtime.scheduler().stats();
    assert_eq!(stats.started, 2);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.completed, 1);
    assert!(h.jobs.get(order.id).await.unwrap().is_none());
}

/// An instance starting against a shared queue leaves jobs under a live lease alone.
#[tokio::test]
async fn second_instance_does_not_take_over_leased_jobs() {
    let orders = Arc::new(MemoryOrderStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let venue = Arc::new(ScriptedVenue::slow(Duration::from_millis(500)));
    let runtime = |venue: Arc<ScriptedVenue>| {
        Runtime::with_components(
            fast_config(),
            orders.clone(),
            jobs.clone(),
            providers(true),
            venue,
        )
    };
    let first = runtime(venue.clone());
    let second = runtime(venue.clone());

    let order = first
        .submit(NewOrder::market("SOL", "USDC", dec!(6)))
        .await
        .unwrap();
    first.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while venue.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first instance never reached the venue");
    second.start().await.unwrap();

    let stored = wait_for_terminal(&orders, order.id).await;
    first.shutdown().await;
    second.shutdown().await;

    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(venue.calls.load(Ordering::SeqCst), 1);
    assert_eq!(venue.peak_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(first.scheduler().stats().started, 1);
    assert_eq!(second.scheduler().stats().started, 0);
}
