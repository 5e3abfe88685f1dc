use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderItemChanged(OrderItemChanged),
    OrderStatusChanged(OrderStatusChanged),
    OrderDeleted(OrderDeleted),
}

impl OrderEvent {
    /// Routing discriminant. Never branch business logic on it.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => OrderCreated::EVENT_TYPE,
            OrderEvent::OrderItemChanged(_) => OrderItemChanged::EVENT_TYPE,
            OrderEvent::OrderStatusChanged(_) => OrderStatusChanged::EVENT_TYPE,
            OrderEvent::OrderDeleted(_) => OrderDeleted::EVENT_TYPE,
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::OrderCreated(e) => e.order_id,
            OrderEvent::OrderItemChanged(e) => e.order_id,
            OrderEvent::OrderStatusChanged(e) => e.order_id,
            OrderEvent::OrderDeleted(e) => e.order_id,
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub customer_id: Uuid,
}

impl OrderCreated {
    pub const EVENT_TYPE: &'static str = "OrderCreated";
}

/// At most one of the two lists is non-empty per event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItemChanged {
    pub order_id: Uuid,
    pub added_items: Vec<Uuid>,
    pub removed_items: Vec<Uuid>,
}

impl OrderItemChanged {
    pub const EVENT_TYPE: &'static str = "OrderItemChanged";

    pub fn added(order_id: Uuid, item_id: Uuid) -> Self {
        Self { order_id, added_items: vec![item_id], removed_items: Vec::new() }
    }

    pub fn removed(order_id: Uuid, item_id: Uuid) -> Self {
        Self { order_id, added_items: Vec::new(), removed_items: vec![item_id] }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
}

impl OrderStatusChanged {
    pub const EVENT_TYPE: &'static str = "OrderStatusChanged";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderDeleted {
    pub order_id: Uuid,
}

impl OrderDeleted {
    pub const EVENT_TYPE: &'static str = "OrderDeleted";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_discriminants() {
        let id = Uuid::now_v7();
        let events = vec![
            OrderEvent::OrderCreated(OrderCreated { order_id: id, customer_id: Uuid::now_v7() }),
            OrderEvent::OrderItemChanged(OrderItemChanged::added(id, Uuid::now_v7())),
            OrderEvent::OrderStatusChanged(OrderStatusChanged {
                order_id: id,
                previous_status: OrderStatus::Open,
                status: OrderStatus::Pending,
            }),
            OrderEvent::OrderDeleted(OrderDeleted { order_id: id }),
        ];

        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["OrderCreated", "OrderItemChanged", "OrderStatusChanged", "OrderDeleted"]);
        assert!(events.iter().all(|e| e.order_id() == id));
    }

    #[test]
    fn test_item_changed_carries_one_list() {
        let event = OrderItemChanged::removed(Uuid::now_v7(), Uuid::now_v7());
        assert!(event.added_items.is_empty());
        assert_eq!(event.removed_items.len(), 1);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OrderEvent::OrderDeleted(OrderDeleted { order_id: Uuid::nil() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderDeleted");
    }
}
