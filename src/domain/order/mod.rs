// ============================================================================
// Order Domain - Business Logic for Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific domain code:
// - Value objects (Item, OrderStatus)
// - Events (OrderCreated, OrderItemChanged, ...)
// - Errors (OrderError enum)
// - Aggregate (Order with its invariants)
// - Repository contract and event dispatch capability
// - Domain service (OrderService)
//
// No I/O happens here; persistence lives behind OrderRepository.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod errors;
pub mod aggregate;
pub mod repository;
pub mod dispatcher;
pub mod service;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use errors::*;
pub use aggregate::*;
pub use repository::*;
pub use dispatcher::*;
pub use service::*;
