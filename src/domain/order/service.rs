use uuid::Uuid;

use super::aggregate::{now, Order};
use super::dispatcher::EventDispatcher;
use super::errors::OrderError;
use super::events::*;
use super::repository::OrderRepository;
use super::value_objects::{Item, OrderStatus};

// ============================================================================
// Order Domain Service
// ============================================================================
//
// Orchestrates: load → mutate aggregate → store → dispatch one event
//
// Each command works on a freshly loaded aggregate. The repository rejects
// stale snapshots, so two commands racing on one order cannot both win.
//
// ============================================================================

pub struct OrderService<R, D> {
    repo: R,
    dispatcher: D,
}

impl<R: OrderRepository, D: EventDispatcher> OrderService<R, D> {
    pub fn new(repo: R, dispatcher: D) -> Self {
        Self { repo, dispatcher }
    }

    pub async fn create_order(&self, customer_id: Uuid) -> Result<Uuid, OrderError> {
        let order_id = self.repo.next_id().await?;
        self.insert(order_id, customer_id).await
    }

    /// Create an order whose identity the caller chose. If it already exists
    /// nothing is written and no event is emitted.
    pub async fn create_order_with_id(&self, order_id: Uuid, customer_id: Uuid) -> Result<Uuid, OrderError> {
        match self.repo.find(order_id).await {
            Ok(_) => {
                tracing::debug!(order_id = %order_id, "Order already present");
                Ok(order_id)
            }
            Err(OrderError::NotFound(_)) => self.insert(order_id, customer_id).await,
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, order_id: Uuid, customer_id: Uuid) -> Result<Uuid, OrderError> {
        let mut order = Order::new(order_id, customer_id, now());

        self.repo.store(&mut order).await?;

        tracing::info!(order_id = %order_id, customer_id = %customer_id, "Order created");

        self.dispatcher
            .dispatch(&OrderEvent::OrderCreated(OrderCreated { order_id, customer_id }))
            .await?;

        Ok(order_id)
    }

    /// Soft delete: the row stays, `find` stops returning it.
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), OrderError> {
        let mut order = self.repo.find(order_id).await?;
        order.mark_deleted(now());

        self.repo.store(&mut order).await?;

        tracing::info!(order_id = %order_id, "Order deleted");

        self.dispatcher
            .dispatch(&OrderEvent::OrderDeleted(OrderDeleted { order_id }))
            .await
    }

    pub async fn set_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), OrderError> {
        let mut order = self.repo.find(order_id).await?;

        let Some(previous_status) = order.change_status(status, now()) else {
            tracing::debug!(order_id = %order_id, status = %status, "Status unchanged, skipping write");
            return Ok(());
        };

        self.repo.store(&mut order).await?;

        tracing::info!(
            order_id = %order_id,
            previous_status = %previous_status,
            status = %status,
            "Order status changed"
        );

        self.dispatcher
            .dispatch(&OrderEvent::OrderStatusChanged(OrderStatusChanged {
                order_id,
                previous_status,
                status,
            }))
            .await
    }

    pub async fn add_item(&self, order_id: Uuid, product_id: Uuid, price: f64) -> Result<Uuid, OrderError> {
        let mut order = self.repo.find(order_id).await?;

        if order.status != OrderStatus::Open {
            return Err(OrderError::InvalidStatus { order_id, status: order.status });
        }

        let item_id = self.repo.next_id().await?;
        self.append(&mut order, Item::new(item_id, product_id, price)?).await?;
        Ok(item_id)
    }

    /// Append an item whose identity the caller chose. If the order already
    /// holds `item_id` nothing is written and no event is emitted, so a
    /// retried caller converges on the same state.
    pub async fn add_item_with_id(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        product_id: Uuid,
        price: f64,
    ) -> Result<Uuid, OrderError> {
        let mut order = self.repo.find(order_id).await?;

        if order.contains_item(item_id) {
            tracing::debug!(order_id = %order_id, item_id = %item_id, "Item already present");
            return Ok(item_id);
        }

        self.append(&mut order, Item::new(item_id, product_id, price)?).await?;
        Ok(item_id)
    }

    async fn append(&self, order: &mut Order, item: Item) -> Result<(), OrderError> {
        let item_id = item.id;
        order.append_item(item, now())?;

        self.repo.store(order).await?;

        tracing::debug!(order_id = %order.id, item_id = %item_id, "Item added");

        self.dispatcher
            .dispatch(&OrderEvent::OrderItemChanged(OrderItemChanged::added(order.id, item_id)))
            .await
    }

    pub async fn delete_item(&self, order_id: Uuid, item_id: Uuid) -> Result<(), OrderError> {
        let mut order = self.repo.find(order_id).await?;
        order.remove_item(item_id, now())?;

        self.repo.store(&mut order).await?;

        tracing::debug!(order_id = %order_id, item_id = %item_id, "Item removed");

        self.dispatcher
            .dispatch(&OrderEvent::OrderItemChanged(OrderItemChanged::removed(order_id, item_id)))
            .await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Barrier;
    use async_trait::async_trait;

    use crate::persistence::{InMemoryOrderRepository, InMemoryOrderStore};
    use crate::testing::RecordingDispatcher;

    struct Fixture {
        store: Arc<InMemoryOrderStore>,
        dispatcher: Arc<RecordingDispatcher>,
        service: OrderService<InMemoryOrderRepository, Arc<RecordingDispatcher>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryOrderStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let service = OrderService::new(InMemoryOrderRepository::new(store.clone()), dispatcher.clone());
        Fixture { store, dispatcher, service }
    }

    async fn snapshot(store: &InMemoryOrderStore, id: Uuid) -> String {
        serde_json::to_string(&store.get(id).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_order() {
        let f = fixture();
        let customer_id = Uuid::now_v7();

        let order_id = f.service.create_order(customer_id).await.unwrap();

        let order = f.store.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.customer_id, customer_id);
        assert_eq!(order.created_at, order.updated_at);
        assert_eq!(
            f.dispatcher.events().await,
            vec![OrderEvent::OrderCreated(OrderCreated { order_id, customer_id })]
        );
    }

    #[tokio::test]
    async fn test_add_item_appends_exactly_one() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
        let existing = f.service.add_item(order_id, Uuid::now_v7(), 1.0).await.unwrap();
        f.dispatcher.clear().await;

        let product_id = Uuid::now_v7();
        let item_id = f.service.add_item(order_id, product_id, 99.99).await.unwrap();

        let order = f.store.get(order_id).await.unwrap();
        assert_eq!(order.items.len(), 2);
        assert_ne!(item_id, existing);
        assert_eq!(order.items[1], Item { id: item_id, product_id, price: 99.99 });
        assert_eq!(
            f.dispatcher.events().await,
            vec![OrderEvent::OrderItemChanged(OrderItemChanged::added(order_id, item_id))]
        );
    }

    #[tokio::test]
    async fn test_delete_item() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
        let first = f.service.add_item(order_id, Uuid::now_v7(), 50.0).await.unwrap();
        let second = f.service.add_item(order_id, Uuid::now_v7(), 20.0).await.unwrap();
        let before = f.store.get(order_id).await.unwrap();
        f.dispatcher.clear().await;

        f.service.delete_item(order_id, first).await.unwrap();

        let order = f.store.get(order_id).await.unwrap();
        assert_eq!(order.items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![second]);
        assert!(order.updated_at >= before.updated_at);
        assert_eq!(
            f.dispatcher.events().await,
            vec![OrderEvent::OrderItemChanged(OrderItemChanged::removed(order_id, first))]
        );
    }

    #[tokio::test]
    async fn test_delete_missing_item() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();

        let result = f.service.delete_item(order_id, Uuid::now_v7()).await;
        assert!(matches!(result, Err(OrderError::ItemNotFound { .. })));
    }

    #[tokio::test]
    async fn test_non_open_order_rejects_item_changes_without_writing() {
        for status in [OrderStatus::Pending, OrderStatus::Paid] {
            let f = fixture();
            let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
            let item_id = f.service.add_item(order_id, Uuid::now_v7(), 50.0).await.unwrap();
            f.service.set_status(order_id, status).await.unwrap();
            f.dispatcher.clear().await;
            let before = snapshot(&f.store, order_id).await;
            let writes = f.store.store_calls();

            let added = f.service.add_item(order_id, Uuid::now_v7(), 100.0).await;
            assert!(matches!(added, Err(OrderError::InvalidStatus { .. })));

            let removed = f.service.delete_item(order_id, item_id).await;
            assert!(matches!(removed, Err(OrderError::InvalidStatus { .. })));

            assert_eq!(snapshot(&f.store, order_id).await, before);
            assert_eq!(f.store.store_calls(), writes);
            assert!(f.dispatcher.events().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_change_order_status() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
        f.dispatcher.clear().await;

        f.service.set_status(order_id, OrderStatus::Pending).await.unwrap();

        assert_eq!(f.store.get(order_id).await.unwrap().status, OrderStatus::Pending);
        assert_eq!(
            f.dispatcher.events().await,
            vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
                order_id,
                previous_status: OrderStatus::Open,
                status: OrderStatus::Pending,
            })]
        );
    }

    #[tokio::test]
    async fn test_set_same_status_writes_and_dispatches_nothing() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
        f.dispatcher.clear().await;
        let writes = f.store.store_calls();

        f.service.set_status(order_id, OrderStatus::Open).await.unwrap();

        assert_eq!(f.store.store_calls(), writes);
        assert!(f.dispatcher.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_order_hides_it() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
        f.dispatcher.clear().await;

        f.service.delete_order(order_id).await.unwrap();

        let stored = f.store.get(order_id).await.unwrap();
        assert!(stored.deleted_at.is_some());
        assert_eq!(stored.deleted_at, Some(stored.updated_at));
        assert_eq!(
            f.dispatcher.events().await,
            vec![OrderEvent::OrderDeleted(OrderDeleted { order_id })]
        );

        let repo = InMemoryOrderRepository::new(f.store.clone());
        assert!(matches!(repo.find(order_id).await, Err(OrderError::NotFound(id)) if id == order_id));

        let added = f.service.add_item(order_id, Uuid::now_v7(), 100.0).await;
        assert!(matches!(added, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_add_item_with_known_id_is_idempotent() {
        let f = fixture();
        let order_id = f.service.create_order(Uuid::now_v7()).await.unwrap();
        let item_id = Uuid::new_v5(&order_id, b"0/0");
        let product_id = Uuid::now_v7();

        f.service.add_item_with_id(order_id, item_id, product_id, 7.5).await.unwrap();
        f.dispatcher.clear().await;
        let writes = f.store.store_calls();

        let again = f.service.add_item_with_id(order_id, item_id, product_id, 7.5).await.unwrap();

        assert_eq!(again, item_id);
        assert_eq!(f.store.get(order_id).await.unwrap().items.len(), 1);
        assert_eq!(f.store.store_calls(), writes);
        assert!(f.dispatcher.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_order_with_known_id_is_idempotent() {
        let f = fixture();
        let customer_id = Uuid::now_v7();
        let order_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, b"order-run-1");

        assert_eq!(f.service.create_order_with_id(order_id, customer_id).await.unwrap(), order_id);
        let before = snapshot(&f.store, order_id).await;
        let writes = f.store.store_calls();
        f.dispatcher.clear().await;

        let again = f.service.create_order_with_id(order_id, customer_id).await.unwrap();

        assert_eq!(again, order_id);
        assert_eq!(f.store.len().await, 1);
        assert_eq!(snapshot(&f.store, order_id).await, before);
        assert_eq!(f.store.store_calls(), writes);
        assert!(f.dispatcher.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_item_freeze_after_pending() {
        let f = fixture();
        let customer_id = Uuid::now_v7();
        let (p1, p2) = (Uuid::now_v7(), Uuid::now_v7());

        let order_id = f.service.create_order(customer_id).await.unwrap();
        f.service.add_item(order_id, p1, 10.0).await.unwrap();
        f.service.set_status(order_id, OrderStatus::Pending).await.unwrap();
        let last = f.service.add_item(order_id, p2, 5.0).await;

        assert!(matches!(last, Err(OrderError::InvalidStatus { .. })));
        let order = f.store.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].product_id, p1);
        assert_eq!(order.items[0].price, 10.0);
    }

    /// Makes two callers load the same snapshot before either stores it.
    struct InterleavingRepository {
        inner: InMemoryOrderRepository,
        barrier: Barrier,
    }

    #[async_trait]
    impl OrderRepository for InterleavingRepository {
        async fn next_id(&self) -> Result<Uuid, OrderError> {
            self.inner.next_id().await
        }

        async fn find(&self, id: Uuid) -> Result<Order, OrderError> {
            let order = self.inner.find(id).await?;
            self.barrier.wait().await;
            Ok(order)
        }

        async fn store(&self, order: &mut Order) -> Result<(), OrderError> {
            self.inner.store(order).await
        }

        async fn delete(&self, id: Uuid) -> Result<(), OrderError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_add_item_race_is_detected() {
        let store = Arc::new(InMemoryOrderStore::new());
        let setup = OrderService::new(InMemoryOrderRepository::new(store.clone()), crate::domain::order::DiscardDispatcher);
        let order_id = setup.create_order(Uuid::now_v7()).await.unwrap();

        let racing = Arc::new(InterleavingRepository {
            inner: InMemoryOrderRepository::new(store.clone()),
            barrier: Barrier::new(2),
        });
        let a = OrderService::new(racing.clone(), crate::domain::order::DiscardDispatcher);
        let b = OrderService::new(racing.clone(), crate::domain::order::DiscardDispatcher);

        let (first, second) = tokio::join!(
            a.add_item(order_id, Uuid::now_v7(), 1.0),
            b.add_item(order_id, Uuid::now_v7(), 2.0),
        );

        // Both loaded version 1; exactly one write may land.
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(OrderError::Conflict { expected: 1, actual: 2, .. }))));
        assert_eq!(store.get(order_id).await.unwrap().items.len(), 1);
    }
}
