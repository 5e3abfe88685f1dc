use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::errors::{ActivityFailure, WorkflowFailure};

// ============================================================================
// Workflow History - durable record of runs and completed activity steps
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed { result: Value },
    Failed { failure: WorkflowFailure },
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed { .. } => "completed",
            RunStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_type: String,
    pub input: Value,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn start(run_id: impl Into<String>, workflow_type: &str, input: Value) -> Self {
        let now = crate::domain::order::now();
        Self {
            run_id: run_id.into(),
            workflow_type: workflow_type.to_string(),
            input,
            status: RunStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActivityOutcome {
    Completed { result: Value },
    Failed { failure: ActivityFailure },
}

/// One activity step as it finished, keyed by (run_id, sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub run_id: String,
    pub sequence: u32,
    pub activity: String,
    pub input: Value,
    pub outcome: ActivityOutcome,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Returns `false` when a run with this id already exists.
    async fn create_run(&self, run: &WorkflowRun) -> anyhow::Result<bool>;

    async fn get_run(&self, run_id: &str) -> anyhow::Result<Option<WorkflowRun>>;

    /// Runs of `workflow_type` that have not reached a terminal status.
    async fn running_runs(&self, workflow_type: &str) -> anyhow::Result<Vec<WorkflowRun>>;

    /// Recorded steps of a run, ordered by sequence.
    async fn load_history(&self, run_id: &str) -> anyhow::Result<Vec<HistoryEvent>>;

    /// Fails if the step is already recorded.
    async fn append_event(&self, event: &HistoryEvent) -> anyhow::Result<()>;

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    runs: Mutex<HashMap<String, WorkflowRun>>,
    events: Mutex<HashMap<String, Vec<HistoryEvent>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_run(&self, run: &WorkflowRun) -> anyhow::Result<bool> {
        let mut runs = self.runs.lock().await;
        if runs.contains_key(&run.run_id) {
            return Ok(false);
        }
        runs.insert(run.run_id.clone(), run.clone());
        Ok(true)
    }

    async fn get_run(&self, run_id: &str) -> anyhow::Result<Option<WorkflowRun>> {
        Ok(self.runs.lock().await.get(run_id).cloned())
    }

    async fn running_runs(&self, workflow_type: &str) -> anyhow::Result<Vec<WorkflowRun>> {
        let mut running: Vec<WorkflowRun> = self
            .runs
            .lock()
            .await
            .values()
            .filter(|run| run.workflow_type == workflow_type && run.status == RunStatus::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(running)
    }

    async fn load_history(&self, run_id: &str) -> anyhow::Result<Vec<HistoryEvent>> {
        Ok(self.events.lock().await.get(run_id).cloned().unwrap_or_default())
    }

    async fn append_event(&self, event: &HistoryEvent) -> anyhow::Result<()> {
        let mut events = self.events.lock().await;
        let history = events.entry(event.run_id.clone()).or_default();

        if history.iter().any(|recorded| recorded.sequence == event.sequence) {
            anyhow::bail!("step {} of run {} is already recorded", event.sequence, event.run_id);
        }

        history.push(event.clone());
        history.sort_by_key(|recorded| recorded.sequence);
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> anyhow::Result<()> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow::anyhow!("workflow run {run_id} not found"))?;

        run.status = status;
        run.updated_at = crate::domain::order::now();
        Ok(())
    }
}
