// ============================================================================
// Workflow - durable orchestration of the order creation saga
// ============================================================================
//
// engine        WorkflowEngine: start / resume_pending / shutdown
// context       WorkflowContext: numbered steps, replay from history
// history       HistoryStore contract + in-memory store
// postgres      HistoryStore on PostgreSQL
// activities    ActivityCall + OrderActivities (the side effects)
// create_order  CreateOrderWorkflow (the deterministic step sequence)
// starter       WorkflowStarter: start a run and wait for its result
//
// ============================================================================

mod activities;
mod context;
mod create_order;
mod engine;
mod errors;
mod history;
mod postgres;
mod starter;

pub use activities::{item_identity, order_identity, ActivityCall, ActivityRunner, OrderActivities};
pub use context::{ActivityOptions, WorkflowContext};
pub use create_order::{CreateOrderInput, CreateOrderResult, CreateOrderWorkflow, OrderLine};
pub use engine::{Workflow, WorkflowEngine, WorkflowHandle};
pub use errors::{ActivityError, ActivityFailure, WorkflowError, WorkflowFailure};
pub use history::{ActivityOutcome, HistoryEvent, HistoryStore, InMemoryHistoryStore, RunStatus, WorkflowRun};
pub use postgres::PgHistoryStore;
pub use starter::{EngineWorkflowStarter, WorkflowStarter};
