use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EventPublisher, OrderCreatedMessage};
use crate::domain::order::{EventDispatcher, OrderError, OrderEvent};
use crate::utils::{retry_with_backoff, RetryConfig};

/// Forward-to-broker dispatcher for one order construction sequence.
///
/// Domain events are only collected; `publish_summary` sends the single
/// `order.created` message once the caller knows the total.
pub struct PublishingDispatcher {
    publisher: Arc<dyn EventPublisher>,
    retry: RetryConfig,
    created: Mutex<Option<(Uuid, Uuid)>>,
}

impl PublishingDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_retry(publisher, RetryConfig::publish())
    }

    pub fn with_retry(publisher: Arc<dyn EventPublisher>, retry: RetryConfig) -> Self {
        Self { publisher, retry, created: Mutex::new(None) }
    }

    pub async fn publish_summary(&self, total_amount: f64) -> anyhow::Result<OrderCreatedMessage> {
        let Some((order_id, user_id)) = *self.created.lock().await else {
            anyhow::bail!("no OrderCreated event was dispatched; nothing to publish");
        };

        let message = OrderCreatedMessage { order_id, user_id, total_amount };

        retry_with_backoff(self.retry.clone(), |attempt| {
            let publisher = self.publisher.clone();
            let message = message.clone();
            async move {
                tracing::debug!(order_id = %message.order_id, attempt = attempt, "Publishing order summary");
                publisher.publish_order_created(&message).await
            }
        })
        .await
        .into_result()?;

        Ok(message)
    }
}

#[async_trait]
impl EventDispatcher for PublishingDispatcher {
    async fn dispatch(&self, event: &OrderEvent) -> Result<(), OrderError> {
        match event {
            OrderEvent::OrderCreated(created) => {
                *self.created.lock().await = Some((created.order_id, created.customer_id));
            }
            OrderEvent::OrderItemChanged(_) | OrderEvent::OrderStatusChanged(_) | OrderEvent::OrderDeleted(_) => {
                tracing::trace!(
                    order_id = %event.order_id(),
                    event_type = event.event_type(),
                    "Folded into order summary"
                );
            }
        }
        Ok(())
    }
}
