// ============================================================================
// Messaging - broker publishing for the asynchronous creation path
// ============================================================================
//
// One summary message per created order, not one per domain event:
// `PublishingDispatcher` collects the construction sequence and emits the
// summary through an `EventPublisher` once the total is known.
//
// ============================================================================

mod dispatcher;
mod redpanda;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use dispatcher::PublishingDispatcher;
pub use redpanda::RedpandaPublisher;

pub const ORDER_CREATED_TOPIC: &str = "order.created";

/// Body of the `order.created` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedMessage {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: f64,
}

impl OrderCreatedMessage {
    pub const MESSAGE_TYPE: &'static str = "order.created";
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_order_created(&self, message: &OrderCreatedMessage) -> anyhow::Result<()>;
}
