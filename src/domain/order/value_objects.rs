use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;
use std::str::FromStr;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One purchased unit. `price` is the price charged when the item was
/// appended, not a live reference to the product's current price.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: f64,
}

impl Item {
    pub fn new(id: Uuid, product_id: Uuid, price: f64) -> Result<Self, OrderError> {
        if !price.is_finite() || price < 0.0 {
            return Err(OrderError::Validation(format!(
                "item price must be a non-negative number, got {price}"
            )));
        }

        Ok(Self { id, product_id, price })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Pending,
    Paid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OrderStatus::Open),
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            other => Err(OrderError::Validation(format!("unknown order status: {other}"))),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
