use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{check_version, OrderQueryService, OrderView, RepositoryProvider, UnitOfWork};
use crate::domain::order::{Order, OrderError, OrderRepository};

// ============================================================================
// In-Memory Persistence
// ============================================================================

/// Committed order snapshots, including soft-deleted ones.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
    store_calls: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw committed snapshot, soft-deleted or not.
    pub async fn get(&self, order_id: Uuid) -> Option<Order> {
        self.orders.lock().await.get(&order_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.orders.lock().await.len()
    }

    /// Number of `store` calls made through any repository on this store.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    fn count_store(&self) {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn visible(order: Option<&Order>, order_id: Uuid) -> Result<Order, OrderError> {
    match order {
        Some(order) if !order.is_deleted() => Ok(order.clone()),
        _ => Err(OrderError::NotFound(order_id)),
    }
}

/// Auto-commit repository: every `store` is its own transaction.
pub struct InMemoryOrderRepository {
    store: Arc<InMemoryOrderStore>,
}

impl InMemoryOrderRepository {
    pub fn new(store: Arc<InMemoryOrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn next_id(&self) -> Result<Uuid, OrderError> {
        Ok(Uuid::now_v7())
    }

    async fn find(&self, id: Uuid) -> Result<Order, OrderError> {
        visible(self.store.orders.lock().await.get(&id), id)
    }

    async fn store(&self, order: &mut Order) -> Result<(), OrderError> {
        self.store.count_store();
        let mut orders = self.store.orders.lock().await;

        if check_version(orders.get(&order.id), order)? {
            order.version += 1;
            orders.insert(order.id, order.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), OrderError> {
        self.store
            .orders
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(OrderError::NotFound(id))
    }
}

// ============================================================================
// In-Memory Unit of Work
// ============================================================================

struct StagedWrite {
    /// Committed version when this transaction first touched the order.
    base_version: i64,
    /// `None` records a hard delete.
    order: Option<Order>,
}

/// Writes go to a private staging area and reach the store only on commit.
struct StagedOrderRepository {
    store: Arc<InMemoryOrderStore>,
    staged: Mutex<HashMap<Uuid, StagedWrite>>,
}

impl StagedOrderRepository {
    async fn current(&self, id: Uuid) -> Option<Order> {
        if let Some(write) = self.staged.lock().await.get(&id) {
            return write.order.clone();
        }
        self.store.get(id).await
    }

    async fn stage(&self, id: Uuid, order: Option<Order>) {
        let base_version = self.store.get(id).await.map_or(0, |stored| stored.version);
        let mut staged = self.staged.lock().await;
        staged
            .entry(id)
            .and_modify(|write| write.order = order.clone())
            .or_insert(StagedWrite { base_version, order });
    }

    /// Validate every staged base version against the store, then apply all
    /// writes under one lock.
    async fn commit(&self) -> Result<(), OrderError> {
        let staged = std::mem::take(&mut *self.staged.lock().await);
        let mut orders = self.store.orders.lock().await;

        for (id, write) in &staged {
            let actual = orders.get(id).map_or(0, |stored| stored.version);
            if actual != write.base_version {
                return Err(OrderError::Conflict {
                    order_id: *id,
                    expected: write.base_version,
                    actual,
                });
            }
        }

        for (id, write) in staged {
            match write.order {
                Some(order) => orders.insert(id, order),
                None => orders.remove(&id),
            };
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for StagedOrderRepository {
    async fn next_id(&self) -> Result<Uuid, OrderError> {
        Ok(Uuid::now_v7())
    }

    async fn find(&self, id: Uuid) -> Result<Order, OrderError> {
        visible(self.current(id).await.as_ref(), id)
    }

    async fn store(&self, order: &mut Order) -> Result<(), OrderError> {
        self.store.count_store();

        if check_version(self.current(order.id).await.as_ref(), order)? {
            order.version += 1;
            self.stage(order.id, Some(order.clone())).await;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), OrderError> {
        if self.current(id).await.is_none() {
            return Err(OrderError::NotFound(id));
        }
        self.stage(id, None).await;
        Ok(())
    }
}

struct StagedProvider(Arc<StagedOrderRepository>);

impl RepositoryProvider for StagedProvider {
    fn order_repository(&self) -> Arc<dyn OrderRepository> {
        self.0.clone()
    }
}

#[derive(Clone)]
pub struct InMemoryUnitOfWork {
    store: Arc<InMemoryOrderStore>,
}

impl InMemoryUnitOfWork {
    pub fn new(store: Arc<InMemoryOrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn execute<T, F>(&self, body: F) -> Result<T, OrderError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn RepositoryProvider>) -> BoxFuture<'static, Result<T, OrderError>> + Send + 'static,
    {
        let repo = Arc::new(StagedOrderRepository {
            store: self.store.clone(),
            staged: Mutex::new(HashMap::new()),
        });

        let value = match body(Arc::new(StagedProvider(repo.clone()))).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Unit of work rolled back");
                return Err(e);
            }
        };

        repo.commit().await?;
        Ok(value)
    }
}

// ============================================================================
// In-Memory Query Service
// ============================================================================

pub struct InMemoryOrderQueryService {
    store: Arc<InMemoryOrderStore>,
}

impl InMemoryOrderQueryService {
    pub fn new(store: Arc<InMemoryOrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OrderQueryService for InMemoryOrderQueryService {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderView>, OrderError> {
        Ok(self
            .store
            .get(order_id)
            .await
            .filter(|order| !order.is_deleted())
            .map(|order| OrderView::from_order(&order)))
    }
}
