use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, SubsecRound, Utc};

use super::value_objects::{Item, OrderStatus};
use super::errors::OrderError;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Pure data plus invariants; no I/O. The domain service loads it, calls one
// of the mutators below and hands the whole snapshot back to the repository.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    /// Persisted version this snapshot was loaded at (0 = never stored).
    pub version: i64,

    // Current State
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<Item>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Current time at the precision the database keeps, so a stored snapshot
/// compares equal to the one it was written from.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl Order {
    pub fn new(id: Uuid, customer_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id,
            version: 0,
            customer_id,
            status: OrderStatus::Open,
            items: Vec::new(),
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn contains_item(&self, item_id: Uuid) -> bool {
        self.items.iter().any(|item| item.id == item_id)
    }

    pub fn total_price(&self) -> f64 {
        self.items.iter().map(|item| item.price).sum()
    }

    fn ensure_open(&self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Open {
            return Err(OrderError::InvalidStatus {
                order_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn append_item(&mut self, item: Item, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_open()?;

        if self.contains_item(item.id) {
            return Err(OrderError::Validation(format!(
                "item {} already exists in order {}",
                item.id, self.id
            )));
        }

        self.items.push(item);
        self.updated_at = at;
        Ok(())
    }

    /// Removes the item, keeping the remaining items in their relative order.
    pub fn remove_item(&mut self, item_id: Uuid, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_open()?;

        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(OrderError::ItemNotFound { order_id: self.id, item_id })?;

        self.items.remove(index);
        self.updated_at = at;
        Ok(())
    }

    /// Returns the previous status, or `None` when `status` is already current.
    pub fn change_status(&mut self, status: OrderStatus, at: DateTime<Utc>) -> Option<OrderStatus> {
        if self.status == status {
            return None;
        }

        let previous = self.status;
        self.status = status;
        self.updated_at = at;
        Some(previous)
    }

    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.updated_at = at;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
