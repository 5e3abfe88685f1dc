use std::sync::Arc;
use uuid::Uuid;

use super::model::{parse_order_id, CreateOrderRequest};
use crate::clients::{NotificationClient, PaymentClient, ProductClient};
use crate::domain::order::{DiscardDispatcher, EventDispatcher, OrderCreated, OrderError, OrderEvent, OrderService};
use crate::messaging::{EventPublisher, PublishingDispatcher};
use crate::metrics::Metrics;
use crate::persistence::{OrderQueryService, OrderView, UnitOfWork};
use crate::utils::RetryConfig;
use crate::workflow::{WorkflowError, WorkflowFailure, WorkflowStarter};

const SYNC_PATH: &str = "sync";
const WORKFLOW_PATH: &str = "workflow";

/// The step that stopped an order creation.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("publishing order summary failed: {0}")]
    Publish(#[source] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CreateOrderError {
    /// Nothing was written.
    #[error("order not created: {0}")]
    NotCreated(#[source] StepError),

    /// The order exists, a later step failed. Nothing is compensated.
    #[error("order {order_id} was created but a later step failed: {source}")]
    PartiallyApplied {
        order_id: Uuid,
        #[source]
        source: StepError,
    },
}

impl CreateOrderError {
    fn not_created(err: impl Into<StepError>) -> Self {
        CreateOrderError::NotCreated(err.into())
    }

    fn partial(order_id: Uuid, err: impl Into<StepError>) -> Self {
        CreateOrderError::PartiallyApplied { order_id, source: err.into() }
    }

    fn from_workflow(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Failed(WorkflowFailure::PartiallyApplied { aggregate_id, cause }) => {
                Self::partial(aggregate_id, WorkflowError::Failed(*cause))
            }
            other => Self::not_created(other),
        }
    }

    /// Id of the order left behind, if any.
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            CreateOrderError::NotCreated(_) => None,
            CreateOrderError::PartiallyApplied { order_id, .. } => Some(*order_id),
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            CreateOrderError::PartiallyApplied { .. } => "partially_applied",
            CreateOrderError::NotCreated(StepError::Order(e)) => e.kind(),
            CreateOrderError::NotCreated(StepError::Workflow(_)) => "workflow",
            CreateOrderError::NotCreated(StepError::Publish(_)) => "publish",
        }
    }
}

/// Inbound order operations: `CreateOrder`, `CreateOrderAsync`, `GetOrder`.
pub struct OrderApplicationService<U> {
    uow: U,
    queries: Arc<dyn OrderQueryService>,
    products: Arc<dyn ProductClient>,
    payments: Arc<dyn PaymentClient>,
    notifications: Arc<dyn NotificationClient>,
    starter: Arc<dyn WorkflowStarter>,
    publisher: Arc<dyn EventPublisher>,
    publish_retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<U: UnitOfWork> OrderApplicationService<U> {
    pub fn new(
        uow: U,
        queries: Arc<dyn OrderQueryService>,
        products: Arc<dyn ProductClient>,
        payments: Arc<dyn PaymentClient>,
        notifications: Arc<dyn NotificationClient>,
        starter: Arc<dyn WorkflowStarter>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            uow,
            queries,
            products,
            payments,
            notifications,
            starter,
            publisher,
            publish_retry: RetryConfig::publish(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_publish_retry(mut self, retry: RetryConfig) -> Self {
        self.publish_retry = retry;
        self
    }

    /// Synchronous path: price, one unit of work for the order and its items,
    /// then payment and a best-effort notification.
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Uuid, CreateOrderError> {
        let result = self.create_order_in_process(request).await;
        self.record(SYNC_PATH, &result);
        result
    }

    /// Saga path: the order workflow runs on the engine; once it completed,
    /// one `order.created` summary goes to the broker.
    pub async fn create_order_async(&self, request: &CreateOrderRequest) -> Result<Uuid, CreateOrderError> {
        let result = self.create_order_with_workflow(request).await;
        self.record(WORKFLOW_PATH, &result);
        result
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<OrderView>, OrderError> {
        let order_id = parse_order_id(order_id)?;
        self.queries.get_order(order_id).await
    }

    async fn create_order_in_process(&self, request: &CreateOrderRequest) -> Result<Uuid, CreateOrderError> {
        let input = request.validate().map_err(CreateOrderError::not_created)?;
        let customer_id = input.customer_id;

        // Remote pricing happens before the transaction opens.
        let mut priced = Vec::with_capacity(input.items.len());
        let mut total_amount = 0.0;
        for line in &input.items {
            let price = self
                .products
                .get_price(line.product_id)
                .await
                .map_err(|e| CreateOrderError::not_created(OrderError::from(e)))?;
            total_amount += price * f64::from(line.quantity);
            priced.push((line.product_id, price, line.quantity));
        }

        let order_id = self
            .uow
            .execute(move |provider| {
                Box::pin(async move {
                    let service = OrderService::new(provider.order_repository(), DiscardDispatcher);
                    let order_id = service.create_order(customer_id).await?;
                    for (product_id, price, quantity) in priced {
                        for _ in 0..quantity {
                            service.add_item(order_id, product_id, price).await?;
                        }
                    }
                    Ok::<_, OrderError>(order_id)
                })
            })
            .await
            .map_err(CreateOrderError::not_created)?;

        self.payments
            .process_payment(customer_id, order_id, total_amount)
            .await
            .map_err(|e| CreateOrderError::partial(order_id, OrderError::from(e)))?;

        if let Err(e) = self
            .notifications
            .send_notification(customer_id, "Order created successfully")
            .await
        {
            tracing::warn!(order_id = %order_id, error = %e, "Notification not delivered");
        }

        tracing::info!(order_id = %order_id, customer_id = %customer_id, total_amount = total_amount, "Order placed");
        Ok(order_id)
    }

    async fn create_order_with_workflow(&self, request: &CreateOrderRequest) -> Result<Uuid, CreateOrderError> {
        let input = request.validate().map_err(CreateOrderError::not_created)?;

        let created = self
            .starter
            .start_create_order(input)
            .await
            .map_err(CreateOrderError::from_workflow)?;
        let order_id = created.order_id;

        let dispatcher = PublishingDispatcher::with_retry(self.publisher.clone(), self.publish_retry.clone());
        dispatcher
            .dispatch(&OrderEvent::OrderCreated(OrderCreated { order_id, customer_id: created.customer_id }))
            .await
            .map_err(|e| CreateOrderError::partial(order_id, e))?;
        dispatcher
            .publish_summary(created.total_amount)
            .await
            .map_err(|e| CreateOrderError::partial(order_id, StepError::Publish(e)))?;

        tracing::info!(
            order_id = %order_id,
            customer_id = %created.customer_id,
            total_amount = created.total_amount,
            "Order placed through workflow"
        );
        Ok(order_id)
    }

    fn record(&self, path: &str, result: &Result<Uuid, CreateOrderError>) {
        match result {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_order_created(path);
                }
            }
            Err(e) => {
                tracing::error!(path = path, reason = e.reason(), order_id = ?e.order_id(), error = %e, "Order creation failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_order_failed(path, e.reason());
                }
            }
        }
    }
}
