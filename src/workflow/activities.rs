use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::ActivityError;
use crate::clients::{NotificationClient, PaymentClient, ProductClient};
use crate::domain::order::{DiscardDispatcher, OrderError, OrderService};
use crate::persistence::UnitOfWork;

// ============================================================================
// Activities - the side-effecting steps of order creation
// ============================================================================
//
// Each activity is either one unit of work against the order store or one
// remote call. The engine may run an activity more than once for the same
// step, so every write here converges when repeated.
//
// ============================================================================

/// A single activity invocation, recorded verbatim in the workflow history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "activity", content = "input")]
pub enum ActivityCall {
    /// `order_id` comes from `order_identity`, so a repeated attempt finds
    /// the order it already created.
    #[serde(rename = "CreateOrderActivity")]
    CreateOrder { order_id: Uuid, customer_id: Uuid },

    #[serde(rename = "GetProductPriceActivity")]
    GetProductPrice { product_id: Uuid },

    /// `line` is the index of the requested line within the order input.
    #[serde(rename = "AddItemActivity")]
    AddItem {
        order_id: Uuid,
        product_id: Uuid,
        price: f64,
        quantity: u32,
        line: u32,
    },

    #[serde(rename = "ProcessPaymentActivity")]
    ProcessPayment {
        customer_id: Uuid,
        order_id: Uuid,
        amount: f64,
    },

    #[serde(rename = "SendNotificationActivity")]
    SendNotification { customer_id: Uuid, message: String },
}

impl ActivityCall {
    pub fn name(&self) -> &'static str {
        match self {
            ActivityCall::CreateOrder { .. } => "CreateOrderActivity",
            ActivityCall::GetProductPrice { .. } => "GetProductPriceActivity",
            ActivityCall::AddItem { .. } => "AddItemActivity",
            ActivityCall::ProcessPayment { .. } => "ProcessPaymentActivity",
            ActivityCall::SendNotification { .. } => "SendNotificationActivity",
        }
    }
}

#[async_trait]
pub trait ActivityRunner: Send + Sync {
    /// Run one attempt. Unit results are `Value::Null`.
    async fn run(&self, call: &ActivityCall) -> Result<Value, ActivityError>;
}

/// Identity of the order created by workflow run `run_id`.
pub fn order_identity(run_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("order/{run_id}").as_bytes())
}

/// Identity of unit `unit` of request line `line`. The same step always
/// appends the same items, however often it runs.
pub fn item_identity(order_id: Uuid, line: u32, unit: u32) -> Uuid {
    Uuid::new_v5(&order_id, format!("{line}/{unit}").as_bytes())
}

pub struct OrderActivities<U> {
    uow: U,
    products: Arc<dyn ProductClient>,
    payments: Arc<dyn PaymentClient>,
    notifications: Arc<dyn NotificationClient>,
}

impl<U: UnitOfWork> OrderActivities<U> {
    pub fn new(
        uow: U,
        products: Arc<dyn ProductClient>,
        payments: Arc<dyn PaymentClient>,
        notifications: Arc<dyn NotificationClient>,
    ) -> Self {
        Self { uow, products, payments, notifications }
    }

    async fn create_order(&self, order_id: Uuid, customer_id: Uuid) -> Result<Uuid, OrderError> {
        self.uow
            .execute(move |provider| {
                Box::pin(async move {
                    OrderService::new(provider.order_repository(), DiscardDispatcher)
                        .create_order_with_id(order_id, customer_id)
                        .await
                })
            })
            .await
    }

    async fn add_item(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        price: f64,
        quantity: u32,
        line: u32,
    ) -> Result<(), OrderError> {
        self.uow
            .execute(move |provider| {
                Box::pin(async move {
                    let service = OrderService::new(provider.order_repository(), DiscardDispatcher);
                    for unit in 0..quantity {
                        service
                            .add_item_with_id(order_id, item_identity(order_id, line, unit), product_id, price)
                            .await?;
                    }
                    Ok::<_, OrderError>(())
                })
            })
            .await
    }
}

#[async_trait]
impl<U: UnitOfWork> ActivityRunner for OrderActivities<U> {
    async fn run(&self, call: &ActivityCall) -> Result<Value, ActivityError> {
        let result = match call {
            ActivityCall::CreateOrder { order_id, customer_id } => {
                serde_json::to_value(self.create_order(*order_id, *customer_id).await?)?
            }
            ActivityCall::GetProductPrice { product_id } => {
                serde_json::to_value(self.products.get_price(*product_id).await.map_err(OrderError::from)?)?
            }
            ActivityCall::AddItem { order_id, product_id, price, quantity, line } => {
                self.add_item(*order_id, *product_id, *price, *quantity, *line).await?;
                Value::Null
            }
            ActivityCall::ProcessPayment { customer_id, order_id, amount } => {
                self.payments
                    .process_payment(*customer_id, *order_id, *amount)
                    .await
                    .map_err(OrderError::from)?;
                Value::Null
            }
            ActivityCall::SendNotification { customer_id, message } => {
                self.notifications
                    .send_notification(*customer_id, message)
                    .await
                    .map_err(OrderError::from)?;
                Value::Null
            }
        };

        tracing::debug!(activity = call.name(), "Activity attempt finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryOrderStore, InMemoryUnitOfWork};
    use crate::testing::{FakeNotificationClient, FakePaymentClient, FakeProductClient};

    #[test]
    fn test_call_is_recorded_under_activity_name() {
        let call = ActivityCall::GetProductPrice { product_id: Uuid::nil() };
        let json = serde_json::to_value(&call).unwrap();

        assert_eq!(json["activity"], call.name());
        assert_eq!(serde_json::from_value::<ActivityCall>(json).unwrap(), call);
    }

    #[test]
    fn test_item_identity_is_deterministic() {
        let order_id = Uuid::now_v7();
        assert_eq!(item_identity(order_id, 0, 1), item_identity(order_id, 0, 1));
        assert_ne!(item_identity(order_id, 0, 1), item_identity(order_id, 1, 0));
        assert_ne!(item_identity(order_id, 0, 0), item_identity(Uuid::now_v7(), 0, 0));
    }

    #[test]
    fn test_order_identity_is_per_run() {
        assert_eq!(order_identity("order-1"), order_identity("order-1"));
        assert_ne!(order_identity("order-1"), order_identity("order-2"));
    }

    #[tokio::test]
    async fn test_create_order_activity_is_idempotent() {
        let store = Arc::new(InMemoryOrderStore::new());
        let activities = OrderActivities::new(
            InMemoryUnitOfWork::new(store.clone()),
            Arc::new(FakeProductClient::default()),
            Arc::new(FakePaymentClient::default()),
            Arc::new(FakeNotificationClient::default()),
        );
        let call = ActivityCall::CreateOrder { order_id: order_identity("run-create"), customer_id: Uuid::now_v7() };

        let first = activities.run(&call).await.unwrap();
        let second = activities.run(&call).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(serde_json::from_value::<Uuid>(first).unwrap(), order_identity("run-create"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_item_activity_is_idempotent() {
        let store = Arc::new(InMemoryOrderStore::new());
        let activities = OrderActivities::new(
            InMemoryUnitOfWork::new(store.clone()),
            Arc::new(FakeProductClient::default()),
            Arc::new(FakePaymentClient::default()),
            Arc::new(FakeNotificationClient::default()),
        );

        let order_id: Uuid = serde_json::from_value(
            activities
                .run(&ActivityCall::CreateOrder { order_id: order_identity("run-add"), customer_id: Uuid::now_v7() })
                .await
                .unwrap(),
        )
        .unwrap();

        let add = ActivityCall::AddItem { order_id, product_id: Uuid::now_v7(), price: 7.5, quantity: 2, line: 0 };
        activities.run(&add).await.unwrap();
        activities.run(&add).await.unwrap();

        let order = store.get(order_id).await.unwrap();
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total_price(), 15.0);
    }

    #[tokio::test]
    async fn test_missing_order_is_a_permanent_failure() {
        use crate::utils::IsTransient;

        let activities = OrderActivities::new(
            InMemoryUnitOfWork::new(Arc::new(InMemoryOrderStore::new())),
            Arc::new(FakeProductClient::default()),
            Arc::new(FakePaymentClient::default()),
            Arc::new(FakeNotificationClient::default()),
        );

        let err = activities
            .run(&ActivityCall::AddItem {
                order_id: Uuid::now_v7(),
                product_id: Uuid::now_v7(),
                price: 1.0,
                quantity: 1,
                line: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ActivityError::Order(OrderError::NotFound(_))));
        assert!(!err.is_transient());
    }
}
