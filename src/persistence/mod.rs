// ============================================================================
// Persistence - Unit of Work, Repositories and the Order read model
// ============================================================================
//
// Two backends share one contract:
// - `in_memory`: staged writes validated at commit, used by tests
// - `postgres`: sqlx transaction per unit of work, used by the binary
//
// A unit of work hands its body a transaction-scoped `RepositoryProvider`.
// Everything the body writes commits together or not at all.
//
// ============================================================================

mod in_memory;
mod postgres;

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::{Order, OrderError, OrderRepository, OrderStatus};

pub use in_memory::{InMemoryOrderQueryService, InMemoryOrderRepository, InMemoryOrderStore, InMemoryUnitOfWork};
pub use postgres::{ensure_schema, PgOrderQueryService, PgOrderRepository, PgUnitOfWork};

/// Repositories bound to one open transaction.
pub trait RepositoryProvider: Send + Sync {
    fn order_repository(&self) -> Arc<dyn OrderRepository>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Run `body` inside one transaction. Commits once if it returns `Ok`,
    /// rolls back every write otherwise. Not reentrant.
    async fn execute<T, F>(&self, body: F) -> Result<T, OrderError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn RepositoryProvider>) -> BoxFuture<'static, Result<T, OrderError>> + Send + 'static;
}

#[async_trait]
pub trait OrderQueryService: Send + Sync {
    /// `None` for missing and soft-deleted orders.
    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderView>, OrderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub total_price: f64,
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    /// Collapses unit items into lines keyed by (product, price), in the
    /// order each line first appears.
    pub fn from_order(order: &Order) -> Self {
        let mut items: Vec<OrderItemView> = Vec::new();

        for item in &order.items {
            match items
                .iter_mut()
                .find(|line| line.product_id == item.product_id && line.price == item.price)
            {
                Some(line) => line.quantity += 1,
                None => items.push(OrderItemView {
                    product_id: item.product_id,
                    quantity: 1,
                    price: item.price,
                }),
            }
        }

        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            total_price: order.total_price(),
            items,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Version check shared by both backends.
///
/// `Ok(true)` means `order` differs from `current` and must be written with a
/// bumped version; `Ok(false)` means the snapshot is already persisted.
pub(crate) fn check_version(current: Option<&Order>, order: &Order) -> Result<bool, OrderError> {
    let actual = current.map_or(0, |stored| stored.version);

    if order.version != actual {
        return Err(OrderError::Conflict {
            order_id: order.id,
            expected: order.version,
            actual,
        });
    }

    Ok(current != Some(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{now, Item};

    #[test]
    fn test_view_groups_units_by_product_and_price() {
        let (p1, p2) = (Uuid::now_v7(), Uuid::now_v7());
        let mut order = Order::new(Uuid::now_v7(), Uuid::now_v7(), now());
        for (product, price) in [(p1, 7.5), (p2, 3.0), (p1, 7.5), (p1, 8.0)] {
            order.append_item(Item::new(Uuid::now_v7(), product, price).unwrap(), now()).unwrap();
        }

        let view = OrderView::from_order(&order);

        assert_eq!(view.total_price, 26.0);
        assert_eq!(
            view.items,
            vec![
                OrderItemView { product_id: p1, quantity: 2, price: 7.5 },
                OrderItemView { product_id: p2, quantity: 1, price: 3.0 },
                OrderItemView { product_id: p1, quantity: 1, price: 8.0 },
            ]
        );
        assert_eq!(serde_json::to_value(&view).unwrap()["status"], "open");
    }

    #[test]
    fn test_check_version() {
        let mut order = Order::new(Uuid::now_v7(), Uuid::now_v7(), now());
        assert!(check_version(None, &order).unwrap());

        order.version = 1;
        let stored = order.clone();
        assert!(!check_version(Some(&stored), &order).unwrap());

        order.status = OrderStatus::Pending;
        assert!(check_version(Some(&stored), &order).unwrap());

        order.version = 0;
        assert!(matches!(
            check_version(Some(&stored), &order),
            Err(OrderError::Conflict { expected: 0, actual: 1, .. })
        ));
    }
}
