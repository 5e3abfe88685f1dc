use std::sync::Arc;
use async_trait::async_trait;

use super::errors::OrderError;
use super::events::OrderEvent;

// ============================================================================
// Event Dispatcher
// ============================================================================
//
// Receives every event the domain service emits. Two variants exist:
// `DiscardDispatcher` here, and the broker-backed `PublishingDispatcher` in
// `crate::messaging`.
//
// ============================================================================

#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: &OrderEvent) -> Result<(), OrderError>;
}

#[async_trait]
impl<T: EventDispatcher + ?Sized> EventDispatcher for Arc<T> {
    async fn dispatch(&self, event: &OrderEvent) -> Result<(), OrderError> {
        (**self).dispatch(event).await
    }
}

/// Drops every event. Used by workflow activities and the synchronous path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardDispatcher;

#[async_trait]
impl EventDispatcher for DiscardDispatcher {
    async fn dispatch(&self, event: &OrderEvent) -> Result<(), OrderError> {
        tracing::trace!(
            order_id = %event.order_id(),
            event_type = event.event_type(),
            "Discarding domain event"
        );
        Ok(())
    }
}
