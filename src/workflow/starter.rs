use std::sync::Arc;
use async_trait::async_trait;
use uuid::Uuid;

use super::create_order::{CreateOrderInput, CreateOrderResult, CreateOrderWorkflow};
use super::engine::WorkflowEngine;
use super::errors::WorkflowError;

/// Launches the order saga and waits for its outcome.
#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    async fn start_create_order(&self, input: CreateOrderInput) -> Result<CreateOrderResult, WorkflowError>;
}

pub struct EngineWorkflowStarter {
    engine: Arc<WorkflowEngine<CreateOrderWorkflow>>,
}

impl EngineWorkflowStarter {
    pub fn new(engine: Arc<WorkflowEngine<CreateOrderWorkflow>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl WorkflowStarter for EngineWorkflowStarter {
    async fn start_create_order(&self, input: CreateOrderInput) -> Result<CreateOrderResult, WorkflowError> {
        let run_id = format!("order-{}", Uuid::new_v4());
        let handle = self.engine.start(run_id, input).await?;

        tracing::debug!(run_id = handle.run_id(), "Waiting for order workflow");
        // Cancelling this wait leaves the run on the engine.
        handle.result().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::persistence::{InMemoryOrderStore, InMemoryUnitOfWork};
    use crate::testing::{FakeNotificationClient, FakePaymentClient, FakeProductClient};
    use crate::utils::RetryConfig;
    use crate::workflow::{ActivityOptions, HistoryStore, InMemoryHistoryStore, OrderActivities, OrderLine};

    #[tokio::test]
    async fn test_dropped_wait_does_not_stop_the_run() {
        let product_id = Uuid::now_v7();
        let orders = Arc::new(InMemoryOrderStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let payments = Arc::new(FakePaymentClient::gated());
        let activities = OrderActivities::new(
            InMemoryUnitOfWork::new(orders.clone()),
            Arc::new(FakeProductClient::with_price(product_id, 2.0)),
            payments.clone(),
            Arc::new(FakeNotificationClient::default()),
        );
        let engine = Arc::new(WorkflowEngine::new(
            CreateOrderWorkflow,
            history.clone(),
            Arc::new(activities),
            ActivityOptions { start_to_close: Duration::from_secs(5), retry: RetryConfig::activity(1) },
        ));
        let starter = EngineWorkflowStarter::new(engine.clone());

        let input = CreateOrderInput {
            customer_id: Uuid::now_v7(),
            items: vec![OrderLine { product_id, quantity: 1 }],
        };
        let waiting = tokio::spawn(async move { starter.start_create_order(input).await });
        payments.wait_until_called().await;
        waiting.abort();

        payments.release();
        let mut finished = false;
        for _ in 0..100 {
            let runs = history.running_runs("CreateOrderWorkflow").await.unwrap();
            if runs.is_empty() {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(finished);
        assert_eq!(payments.calls().await.len(), 1);
        assert_eq!(orders.len().await, 1);
    }
}
