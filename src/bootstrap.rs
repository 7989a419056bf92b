//! Process runtime
//!
//! Builds every component once, wires them by constructor injection and owns
//! their startup/shutdown order.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::adapters::{MemoryOrderStore, PostgresStore};
use crate::config::AppConfig;
use crate::domain::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::error::{DexFlowError, Result};
use crate::exchange::{build_execution_venue, build_quote_providers, ExecutionVenue, QuoteProvider};
use crate::persistence::{JobStore, MemoryJobStore, OrderStore};
use crate::platform::{
    ExecutionEngine, NotificationHub, OrderPipeline, OrderScheduler, RouteSelector,
};

pub struct Runtime {
    config: AppConfig,
    orders: Arc<dyn OrderStore>,
    hub: Arc<NotificationHub>,
    scheduler: Arc<OrderScheduler>,
    started_at: DateTime<Utc>,
}

impl Runtime {
    /// Build from configuration: Postgres when `database` is set, memory otherwise
    pub async fn build(config: AppConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| DexFlowError::Validation(errors.join("; ")))?;

        let providers = build_quote_providers(&config.routing);
        let venue = build_execution_venue(&config);

        let (orders, jobs): (Arc<dyn OrderStore>, Arc<dyn JobStore>) = match &config.database {
            Some(db) => {
                let store = PostgresStore::new(&db.url, db.max_connections).await?;
                store.migrate().await?;
                let store = Arc::new(store);
                info!("Using PostgreSQL order and job stores");
                let orders: Arc<dyn OrderStore> = store.clone();
                let jobs: Arc<dyn JobStore> = store;
                (orders, jobs)
            }
            None => {
                info!("No database configured, using in-memory stores");
                let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
                let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
                (orders, jobs)
            }
        };

        Ok(Self::with_components(config, orders, jobs, providers, venue))
    }

    /// Wire explicitly supplied stores and venues
    pub fn with_components(
        config: AppConfig,
        orders: Arc<dyn OrderStore>,
        jobs: Arc<dyn JobStore>,
        providers: Vec<Arc<dyn QuoteProvider>>,
        venue: Arc<dyn ExecutionVenue>,
    ) -> Self {
        let hub = Arc::new(NotificationHub::default());
        let router = Arc::new(RouteSelector::from_config(providers, &config.routing));
        let engine = Arc::new(ExecutionEngine::new(venue));
        let pipeline = Arc::new(OrderPipeline::new(
            orders.clone(),
            router,
            engine,
            hub.clone(),
        ));
        let scheduler = Arc::new(OrderScheduler::new(jobs, pipeline, config.queue.clone()));

        Self {
            config,
            orders,
            hub,
            scheduler,
            started_at: Utc::now(),
        }
    }

    /// Recover interrupted jobs and start the workers
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        info!(
            providers = self.config.routing.providers.len(),
            concurrency = self.config.queue.concurrency,
            "Runtime started"
        );
        Ok(())
    }

    /// Let in-flight pipelines finish, then drop every observer
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.hub.close();
        info!("Runtime stopped");
    }

    /// Create a pending order and queue it for processing. An order that
    /// cannot be queued is marked failed rather than left pending.
    pub async fn submit(&self, input: NewOrder) -> Result<Order> {
        let order = self.orders.create(input).await?;
        if let Err(e) = self.scheduler.enqueue(&order).await {
            error!(order_id = %order.id, "Failed to enqueue order: {}", e);
            let patch = OrderPatch::error(format!("enqueue failed: {}", e));
            if let Err(mark_err) = self
                .orders
                .update_status(order.id, OrderStatus::Failed, patch)
                .await
            {
                warn!(order_id = %order.id, "Could not mark unqueued order failed: {}", mark_err);
            }
            return Err(e);
        }
        info!(
            order_id = %order.id,
            order_type = %order.order_type,
            token_in = %order.token_in,
            token_out = %order.token_out,
            amount_in = %order.amount_in,
            "Order accepted"
        );
        Ok(order)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn scheduler(&self) -> &Arc<OrderScheduler> {
        &self.scheduler
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
