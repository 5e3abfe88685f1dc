use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::OrderError;
use crate::utils::IsTransient;

// ============================================================================
// Workflow Errors
// ============================================================================
//
// `WorkflowFailure` is part of the durable history (serde), so a resumed run
// replays exactly the failure the original run saw. `WorkflowError` is what
// callers of the engine get back.
//
// ============================================================================

/// Final failure of one activity step, after its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{activity} (step {sequence}) failed [{kind}]: {message}")]
pub struct ActivityFailure {
    pub activity: String,
    pub sequence: u32,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowFailure {
    #[error(transparent)]
    ActivityFailed(ActivityFailure),

    #[error("non-deterministic replay at step {sequence}: history has {recorded}, workflow asked for {replayed}")]
    NonDeterministic {
        sequence: u32,
        recorded: String,
        replayed: String,
    },

    #[error("payload error: {message}")]
    Payload { message: String },

    #[error("history unavailable: {message}")]
    History { message: String },

    /// A write on `aggregate_id` already happened when `cause` stopped the run.
    #[error("partially applied to {aggregate_id}: {cause}")]
    PartiallyApplied {
        aggregate_id: Uuid,
        cause: Box<WorkflowFailure>,
    },
}

impl WorkflowFailure {
    pub fn payload(err: impl std::fmt::Display) -> Self {
        WorkflowFailure::Payload { message: err.to_string() }
    }

    pub fn history(err: impl std::fmt::Display) -> Self {
        WorkflowFailure::History { message: err.to_string() }
    }

    /// Wrap once; an already partial failure keeps its original aggregate.
    pub fn partially_applied(self, aggregate_id: Uuid) -> Self {
        match self {
            partial @ WorkflowFailure::PartiallyApplied { .. } => partial,
            cause => WorkflowFailure::PartiallyApplied { aggregate_id, cause: Box::new(cause) },
        }
    }

    /// The failure that actually stopped the run, without the partial wrapper.
    pub fn root(&self) -> &WorkflowFailure {
        match self {
            WorkflowFailure::PartiallyApplied { cause, .. } => cause.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> &str {
        match self.root() {
            WorkflowFailure::ActivityFailed(failure) => &failure.kind,
            WorkflowFailure::NonDeterministic { .. } => "non_deterministic",
            WorkflowFailure::Payload { .. } => "payload",
            WorkflowFailure::History { .. } => "history",
            WorkflowFailure::PartiallyApplied { .. } => "partially_applied",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Failed(#[from] WorkflowFailure),

    #[error("workflow run {0} already exists")]
    AlreadyStarted(String),

    #[error("workflow run {0} not found")]
    RunNotFound(String),

    #[error("workflow run {0} stopped before reporting a result")]
    Interrupted(String),

    #[error(transparent)]
    History(#[from] anyhow::Error),
}

/// Error of a single activity attempt.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("activity did not finish within {0:?}")]
    Timeout(Duration),

    #[error("activity payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ActivityError {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityError::Order(e) => e.kind(),
            ActivityError::Timeout(_) => "timeout",
            ActivityError::Payload(_) => "payload",
        }
    }
}

impl IsTransient for ActivityError {
    fn is_transient(&self) -> bool {
        match self {
            ActivityError::Order(e) => e.is_transient(),
            ActivityError::Timeout(_) => true,
            ActivityError::Payload(_) => false,
        }
    }
}
