use std::sync::Arc;
use async_trait::async_trait;
use uuid::Uuid;

use super::aggregate::Order;
use super::errors::OrderError;

// ============================================================================
// Order Repository - persistence contract for the whole aggregate
// ============================================================================

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Allocate a new time-ordered identity.
    async fn next_id(&self) -> Result<Uuid, OrderError>;

    /// Load the aggregate. Missing and soft-deleted orders are `NotFound`.
    async fn find(&self, id: Uuid) -> Result<Order, OrderError>;

    /// Upsert the full snapshot, replacing the stored item set exactly.
    ///
    /// `order.version` must match the stored version (`Conflict` otherwise).
    /// On a real write the version is bumped and written back into `order`;
    /// storing a snapshot identical to what is persisted is a no-op.
    async fn store(&self, order: &mut Order) -> Result<(), OrderError>;

    /// Hard delete, for callers outside the domain service's soft-delete path.
    async fn delete(&self, id: Uuid) -> Result<(), OrderError>;
}

#[async_trait]
impl<T: OrderRepository + ?Sized> OrderRepository for Arc<T> {
    async fn next_id(&self) -> Result<Uuid, OrderError> {
        (**self).next_id().await
    }

    async fn find(&self, id: Uuid) -> Result<Order, OrderError> {
        (**self).find(id).await
    }

    async fn store(&self, order: &mut Order) -> Result<(), OrderError> {
        (**self).store(order).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), OrderError> {
        (**self).delete(id).await
    }
}
