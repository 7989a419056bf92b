//! Order Pipeline
//!
//! One run drives a single order through
//! `routing → building → submitted → {confirmed, failed}`.
//! Every transition is persisted before it is broadcast.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::executor::ExecutionEngine;
use super::hub::NotificationHub;
use super::router::RouteSelector;
use crate::domain::{Order, OrderPatch, OrderStatus};
use crate::error::{DexFlowError, Result};
use crate::persistence::{Job, OrderStore};

/// How a pipeline run ended, as seen by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Trade landed
    Confirmed,
    /// Finalized as failed; no further attempts
    Failed { reason: String },
    /// Retryable failure recorded; run again after backoff
    Retry { error: String },
    /// Order was already terminal; nothing to do
    Skipped,
}

impl PipelineOutcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, PipelineOutcome::Retry { .. })
    }
}

pub struct OrderPipeline {
    store: Arc<dyn OrderStore>,
    router: Arc<RouteSelector>,
    engine: Arc<ExecutionEngine>,
    hub: Arc<NotificationHub>,
}

impl OrderPipeline {
    pub fn new(
        store: Arc<dyn OrderStore>,
        router: Arc<RouteSelector>,
        engine: Arc<ExecutionEngine>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            store,
            router,
            engine,
            hub,
        }
    }

    /// Run one attempt for the job's order.
    ///
    /// Route and execution failures become status transitions. `Err` is
    /// returned only when the store fails, leaving the order unconfirmed.
    pub async fn run(&self, job: &Job) -> Result<PipelineOutcome> {
        let order = self
            .store
            .find_by_id(job.order_id)
            .await?
            .ok_or(DexFlowError::OrderNotFound(job.order_id))?;

        if order.status.is_terminal() {
            info!(order_id = %order.id, status = %order.status, "Order already final, skipping");
            return Ok(PipelineOutcome::Skipped);
        }

        let order = self
            .transition(order.id, OrderStatus::Routing, OrderPatch::new())
            .await?;

        let quote = match self
            .router
            .select_route(&order.token_in, &order.token_out, order.amount_in)
            .await
        {
            Ok(quote) => quote,
            Err(e @ DexFlowError::RouteNotFound { .. }) => {
                return self.finalize_failed(&order, e.to_string(), None).await;
            }
            Err(e) => return Err(e),
        };

        self.transition(
            order.id,
            OrderStatus::Building,
            OrderPatch::route(quote.venue_id.clone(), quote.estimated_output),
        )
        .await?;
        self.transition(order.id, OrderStatus::Submitted, OrderPatch::new())
            .await?;

        match self.engine.execute_at(&quote.venue_id, quote.price).await {
            Ok(receipt) => {
                self.transition(
                    order.id,
                    OrderStatus::Confirmed,
                    OrderPatch::fill(receipt.executed_price, receipt.tx_ref),
                )
                .await?;
                Ok(PipelineOutcome::Confirmed)
            }
            Err(e) if e.is_retryable() => {
                let retry_count = order.retry_count + 1;
                let message = e.to_string();

                if retry_count >= job.max_attempts || job.is_final_attempt() {
                    warn!(
                        order_id = %order.id,
                        retry_count,
                        "Retries exhausted: {}",
                        message
                    );
                    return self
                        .finalize_failed(&order, message, Some(retry_count))
                        .await;
                }

                // Bookkeeping only; observers see the re-entry into routing
                self.store
                    .update_status(
                        order.id,
                        OrderStatus::Submitted,
                        OrderPatch::error(message.clone()).with_retry_count(retry_count),
                    )
                    .await?;

                info!(
                    order_id = %order.id,
                    attempt = job.attempt(),
                    retry_count,
                    "Retryable execution failure: {}",
                    message
                );
                Ok(PipelineOutcome::Retry { error: message })
            }
            Err(e) => self.finalize_failed(&order, e.to_string(), None).await,
        }
    }

    /// Finalize an order whose job gave up on infrastructure failures
    pub async fn abandon(&self, order_id: Uuid, reason: &str) -> Result<()> {
        let Some(order) = self.store.find_by_id(order_id).await? else {
            return Err(DexFlowError::OrderNotFound(order_id));
        };
        if order.status.is_terminal() {
            return Ok(());
        }

        self.finalize_failed(&order, reason.to_string(), None).await?;
        Ok(())
    }

    async fn finalize_failed(
        &self,
        order: &Order,
        reason: String,
        retry_count: Option<u32>,
    ) -> Result<PipelineOutcome> {
        let mut patch = OrderPatch::error(reason.clone());
        if let Some(retry_count) = retry_count {
            patch = patch.with_retry_count(retry_count);
        }

        self.transition(order.id, OrderStatus::Failed, patch).await?;
        Ok(PipelineOutcome::Failed { reason })
    }

    /// Persist, then broadcast
    async fn transition(&self, id: Uuid, status: OrderStatus, patch: OrderPatch) -> Result<Order> {
        let order = match self.store.update_status(id, status, patch.clone()).await {
            Ok(order) => order,
            Err(e) => {
                error!(order_id = %id, %status, "Failed to persist transition: {}", e);
                return Err(e);
            }
        };

        let observers = self.hub.broadcast(id, status, &patch);
        info!(order_id = %id, %status, observers, "Order transition");
        Ok(order)
    }
}
