// ============================================================================
// Application Layer - inbound order operations
// ============================================================================
//
// CreateOrder       validate → price → unit of work → payment → notification
// CreateOrderAsync  validate → CreateOrderWorkflow → order.created summary
// GetOrder          read model lookup
//
// The transport binding (gRPC server) calls into this layer and is not part
// of the crate.
//
// ============================================================================

mod model;
mod service;

pub use model::{parse_order_id, CreateOrderRequest, OrderLineRequest};
pub use service::{CreateOrderError, OrderApplicationService, StepError};
