// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Aggregates, their invariants and the domain services that drive them.
// Infrastructure (storage, brokers, remote services, workflows) depends on
// this layer, never the other way round.
//
// ============================================================================

pub mod order;
