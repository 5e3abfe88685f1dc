use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{check_version, OrderQueryService, OrderView, RepositoryProvider, UnitOfWork};
use crate::domain::order::{Item, Order, OrderError, OrderRepository, OrderStatus};

// ============================================================================
// PostgreSQL Persistence (sqlx)
// ============================================================================
//
// One sqlx transaction per unit of work. The transaction-scoped repository
// shares it behind a mutex; queries borrow the connection for one statement
// at a time. Remote calls never run while a transaction is open: callers
// price and pay outside `execute`.
//
// ============================================================================

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        OrderError::storage(err)
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        status TEXT NOT NULL,
        total_price DOUBLE PRECISION NOT NULL DEFAULT 0,
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        item_id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (order_id) ON DELETE CASCADE,
        product_id UUID NOT NULL,
        quantity INT NOT NULL DEFAULT 1,
        price DOUBLE PRECISION NOT NULL,
        position INT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id)",
];

/// Create the order tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> anyhow::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Order schema ready");
    Ok(())
}

/// Load an order with its items, soft-deleted or not.
async fn fetch_order(conn: &mut PgConnection, order_id: Uuid, for_update: bool) -> Result<Option<Order>, OrderError> {
    let sql = if for_update {
        "SELECT user_id, status, version, created_at, updated_at, deleted_at FROM orders WHERE order_id = $1 FOR UPDATE"
    } else {
        "SELECT user_id, status, version, created_at, updated_at, deleted_at FROM orders WHERE order_id = $1"
    };

    let Some(row) = sqlx::query(sql).bind(order_id).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;

    let items = sqlx::query("SELECT item_id, product_id, price FROM order_items WHERE order_id = $1 ORDER BY position")
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|item| -> Result<Item, sqlx::Error> {
            Ok(Item {
                id: item.try_get("item_id")?,
                product_id: item.try_get("product_id")?,
                price: item.try_get("price")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Order {
        id: order_id,
        version: row.try_get("version")?,
        customer_id: row.try_get("user_id")?,
        status: OrderStatus::from_str(&status)?,
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    }))
}

async fn write_order(conn: &mut PgConnection, order: &mut Order) -> Result<(), OrderError> {
    let current = fetch_order(conn, order.id, true).await?;

    if !check_version(current.as_ref(), order)? {
        tracing::debug!(order_id = %order.id, version = order.version, "Snapshot unchanged, skipping write");
        return Ok(());
    }

    let version = order.version + 1;

    // Guarded upsert: also catches a concurrent insert of the same id.
    let written = sqlx::query(
        r#"
        INSERT INTO orders (order_id, user_id, status, total_price, version, created_at, updated_at, deleted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (order_id) DO UPDATE SET
            user_id = EXCLUDED.user_id,
            status = EXCLUDED.status,
            total_price = EXCLUDED.total_price,
            version = EXCLUDED.version,
            updated_at = EXCLUDED.updated_at,
            deleted_at = EXCLUDED.deleted_at
        WHERE orders.version = $9
        "#,
    )
    .bind(order.id)
    .bind(order.customer_id)
    .bind(order.status.as_str())
    .bind(order.total_price())
    .bind(version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.deleted_at)
    .bind(order.version)
    .execute(&mut *conn)
    .await?;

    if written.rows_affected() == 0 {
        let actual: i64 = sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1")
            .bind(order.id)
            .fetch_one(&mut *conn)
            .await?;
        return Err(OrderError::Conflict { order_id: order.id, expected: order.version, actual });
    }

    let item_ids: Vec<Uuid> = order.items.iter().map(|item| item.id).collect();
    sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND NOT (item_id = ANY($2))")
        .bind(order.id)
        .bind(item_ids)
        .execute(&mut *conn)
        .await?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (item_id, order_id, product_id, quantity, price, position)
            VALUES ($1, $2, $3, 1, $4, $5)
            ON CONFLICT (item_id) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                price = EXCLUDED.price,
                position = EXCLUDED.position
            "#,
        )
        .bind(item.id)
        .bind(order.id)
        .bind(item.product_id)
        .bind(item.price)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    order.version = version;
    Ok(())
}

/// Repository bound to one open transaction.
pub struct PgOrderRepository {
    tx: Arc<Mutex<Transaction<'static, Postgres>>>,
}

impl PgOrderRepository {
    fn new(tx: Arc<Mutex<Transaction<'static, Postgres>>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn next_id(&self) -> Result<Uuid, OrderError> {
        Ok(Uuid::now_v7())
    }

    async fn find(&self, id: Uuid) -> Result<Order, OrderError> {
        let mut guard = self.tx.lock().await;
        fetch_order(&mut **guard, id, false)
            .await?
            .filter(|order| !order.is_deleted())
            .ok_or(OrderError::NotFound(id))
    }

    async fn store(&self, order: &mut Order) -> Result<(), OrderError> {
        let mut guard = self.tx.lock().await;
        write_order(&mut **guard, order).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), OrderError> {
        let mut guard = self.tx.lock().await;
        let deleted = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(id)
            .execute(&mut **guard)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(OrderError::NotFound(id));
        }
        Ok(())
    }
}

struct PgRepositoryProvider {
    orders: Arc<PgOrderRepository>,
}

impl RepositoryProvider for PgRepositoryProvider {
    fn order_repository(&self) -> Arc<dyn OrderRepository> {
        self.orders.clone()
    }
}

#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn execute<T, F>(&self, body: F) -> Result<T, OrderError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn RepositoryProvider>) -> BoxFuture<'static, Result<T, OrderError>> + Send + 'static,
    {
        let tx = Arc::new(Mutex::new(self.pool.begin().await?));

        // Dropping this future before commit drops the transaction, which
        // rolls it back.
        let result = body(Arc::new(PgRepositoryProvider {
            orders: Arc::new(PgOrderRepository::new(tx.clone())),
        }))
        .await;

        let (tx, result) = reclaim(tx, result)?;

        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                tracing::debug!(error = %e, "Unit of work rolled back");
                Err(e)
            }
        }
    }
}

/// Take the transaction back from the repositories. If one of them kept it
/// alive the transaction is abandoned, and rolls back once that handle drops.
/// A failed body keeps its own error either way.
fn reclaim<X, T>(
    tx: Arc<Mutex<X>>,
    result: Result<T, OrderError>,
) -> Result<(X, Result<T, OrderError>), OrderError> {
    match Arc::try_unwrap(tx) {
        Ok(tx) => Ok((tx.into_inner(), result)),
        Err(_) => {
            tracing::warn!("Repository outlived its unit of work, transaction abandoned");
            match result {
                Ok(_) => Err(OrderError::storage(anyhow::anyhow!(
                    "repository outlived its unit of work; transaction abandoned"
                ))),
                Err(e) => Err(e),
            }
        }
    }
}

pub struct PgOrderQueryService {
    pool: PgPool,
}

impl PgOrderQueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderQueryService for PgOrderQueryService {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderView>, OrderError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_order(&mut conn, order_id, false)
            .await?
            .filter(|order| !order.is_deleted())
            .map(|order| OrderView::from_order(&order)))
    }
}
