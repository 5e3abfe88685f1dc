use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::clients::RemoteCallError;
use crate::utils::IsTransient;

// ============================================================================
// Order Errors
// ============================================================================
//
// Single taxonomy shared by the domain service, the unit of work and the
// remote clients. Business-rule failures happen before any write; storage,
// conflict and remote failures may be retried by the workflow engine, unless
// the remote service rejected the request outright.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("order {order_id} is {status}, only open orders can change items")]
    InvalidStatus { order_id: Uuid, status: OrderStatus },

    #[error("item {item_id} not found in order {order_id}")]
    ItemNotFound { order_id: Uuid, item_id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order {order_id} was modified concurrently: expected version {expected}, found {actual}")]
    Conflict { order_id: Uuid, expected: i64, actual: i64 },

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Remote(#[from] RemoteCallError),

    #[error("event dispatch failed: {0}")]
    Dispatch(#[source] anyhow::Error),
}

impl OrderError {
    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        OrderError::Storage(err.into())
    }

    /// Stable name of the variant, used as a metric label and in recorded
    /// workflow failures.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::NotFound(_) => "not_found",
            OrderError::InvalidStatus { .. } => "invalid_status",
            OrderError::ItemNotFound { .. } => "item_not_found",
            OrderError::Validation(_) => "validation",
            OrderError::Conflict { .. } => "conflict",
            OrderError::Storage(_) => "storage",
            OrderError::Remote(_) => "remote",
            OrderError::Dispatch(_) => "dispatch",
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Remote(e) => !e.permanent,
            OrderError::Conflict { .. } | OrderError::Storage(_) | OrderError::Dispatch(_) => true,
            OrderError::NotFound(_)
            | OrderError::InvalidStatus { .. }
            | OrderError::ItemNotFound { .. }
            | OrderError::Validation(_) => false,
        }
    }
}
