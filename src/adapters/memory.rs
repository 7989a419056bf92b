use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::error::{DexFlowError, Result};
use crate::persistence::OrderStore;

/// In-process order store used when no database is configured
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, input: NewOrder) -> Result<Order> {
        let order = Order::new(Uuid::new_v4(), input);
        self.orders.write().await.insert(order.id, order.clone());
        debug!(order_id = %order.id, "Order created");
        Ok(order)
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus, patch: OrderPatch) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(DexFlowError::OrderNotFound(id))?;

        if !order.status.can_transition_to(status) {
            return Err(DexFlowError::InvalidStateTransition {
                from: order.status.to_string(),
                to: status.to_string(),
            });
        }

        order.apply(status, &patch);
        Ok(order.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }
}
