use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::error::Result;

/// Durable order records.
///
/// Implementations refuse transitions the state machine forbids, which also
/// means a terminal status is never overwritten.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order with a generated id and status `pending`
    async fn create(&self, input: NewOrder) -> Result<Order>;

    /// Move an order to `status`, applying the patch fields.
    /// Fails with `OrderNotFound` when the id does not exist.
    async fn update_status(&self, id: Uuid, status: OrderStatus, patch: OrderPatch)
        -> Result<Order>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>>;
}
