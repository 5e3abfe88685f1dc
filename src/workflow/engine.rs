use std::collections::HashSet;
use std::sync::Arc;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;

use super::activities::ActivityRunner;
use super::context::{ActivityOptions, WorkflowContext};
use super::errors::{WorkflowError, WorkflowFailure};
use super::history::{HistoryStore, RunStatus, WorkflowRun};
use crate::metrics::Metrics;

// ============================================================================
// Workflow Engine - durable, resumable runs on the tokio runtime
// ============================================================================
//
// start   → persist run record (status running) → spawn
// spawn   → load history → replay/execute workflow → persist terminal status
// resume  → spawn every run still marked running that this engine is not
//           already driving
//
// A run's task is owned by the engine, not by whoever started it: dropping a
// `WorkflowHandle` only stops waiting.
//
// ============================================================================

/// Deterministic orchestration logic. Everything with side effects goes
/// through `WorkflowContext::execute`.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    type Input: Serialize + DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    const NAME: &'static str;

    async fn run(&self, ctx: &mut WorkflowContext, input: Self::Input) -> Result<Self::Output, WorkflowFailure>;
}

/// Waits for one run's result.
pub struct WorkflowHandle<T> {
    run_id: String,
    receiver: oneshot::Receiver<Result<T, WorkflowError>>,
}

impl<T> WorkflowHandle<T> {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn result(self) -> Result<T, WorkflowError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::Interrupted(self.run_id)),
        }
    }
}

struct RunDeps {
    history: Arc<dyn HistoryStore>,
    activities: Arc<dyn ActivityRunner>,
    options: ActivityOptions,
    metrics: Option<Arc<Metrics>>,
}

pub struct WorkflowEngine<W: Workflow> {
    workflow: Arc<W>,
    deps: Arc<RunDeps>,
    tasks: Mutex<JoinSet<()>>,
    /// Run ids with a live task in `tasks`.
    active: Arc<Mutex<HashSet<String>>>,
}

impl<W: Workflow> WorkflowEngine<W> {
    pub fn new(
        workflow: W,
        history: Arc<dyn HistoryStore>,
        activities: Arc<dyn ActivityRunner>,
        options: ActivityOptions,
    ) -> Self {
        Self::build(workflow, history, activities, options, None)
    }

    pub fn with_metrics(
        workflow: W,
        history: Arc<dyn HistoryStore>,
        activities: Arc<dyn ActivityRunner>,
        options: ActivityOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::build(workflow, history, activities, options, Some(metrics))
    }

    fn build(
        workflow: W,
        history: Arc<dyn HistoryStore>,
        activities: Arc<dyn ActivityRunner>,
        options: ActivityOptions,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            workflow: Arc::new(workflow),
            deps: Arc::new(RunDeps { history, activities, options, metrics }),
            tasks: Mutex::new(JoinSet::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Record a new run and start executing it.
    pub async fn start(&self, run_id: impl Into<String>, input: W::Input) -> Result<WorkflowHandle<W::Output>, WorkflowError> {
        let run_id = run_id.into();
        let payload = serde_json::to_value(&input).map_err(WorkflowFailure::payload)?;

        if !self.deps.history.create_run(&WorkflowRun::start(&run_id, W::NAME, payload)).await? {
            return Err(WorkflowError::AlreadyStarted(run_id));
        }

        tracing::info!(run_id = %run_id, workflow = W::NAME, "Workflow run started");
        if let Some(metrics) = &self.deps.metrics {
            metrics.record_workflow_started(W::NAME, false);
        }

        self.active.lock().await.insert(run_id.clone());
        Ok(self.spawn(run_id, input).await)
    }

    /// Pick up every run of this workflow that has not finished, e.g. after
    /// the previous process died.
    pub async fn resume_pending(&self) -> Result<Vec<WorkflowHandle<W::Output>>, WorkflowError> {
        let mut handles = Vec::new();

        for run in self.deps.history.running_runs(W::NAME).await? {
            if self.active.lock().await.contains(&run.run_id) {
                tracing::debug!(run_id = %run.run_id, "Run already in progress, not resuming");
                continue;
            }

            let input: W::Input = match serde_json::from_value(run.input) {
                Ok(input) => input,
                Err(e) => {
                    tracing::error!(run_id = %run.run_id, error = %e, "Stored workflow input is unreadable");
                    self.deps
                        .history
                        .finish_run(&run.run_id, RunStatus::Failed { failure: WorkflowFailure::payload(e) })
                        .await?;
                    continue;
                }
            };

            // Claim the id; a concurrent resume may have taken it meanwhile.
            if !self.active.lock().await.insert(run.run_id.clone()) {
                continue;
            }

            tracing::info!(run_id = %run.run_id, workflow = W::NAME, "Resuming workflow run");
            if let Some(metrics) = &self.deps.metrics {
                metrics.record_workflow_started(W::NAME, true);
            }

            handles.push(self.spawn(run.run_id, input).await);
        }

        Ok(handles)
    }

    pub async fn run_status(&self, run_id: &str) -> Result<RunStatus, WorkflowError> {
        self.deps
            .history
            .get_run(run_id)
            .await?
            .map(|run| run.status)
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.to_string()))
    }

    /// Abort every in-flight run. Their records stay `running`, so a later
    /// `resume_pending` continues them.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        self.active.lock().await.clear();
        tracing::info!(workflow = W::NAME, "Workflow engine stopped");
    }

    async fn spawn(&self, run_id: String, input: W::Input) -> WorkflowHandle<W::Output> {
        let (sender, receiver) = oneshot::channel();
        let workflow = self.workflow.clone();
        let deps = self.deps.clone();
        let active = self.active.clone();
        let task_run_id = run_id.clone();

        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let result = drive(workflow, deps, task_run_id.clone(), input).await;
            active.lock().await.remove(&task_run_id);
            // The caller may have stopped waiting; the run is finished either way.
            let _ = sender.send(result);
        });

        WorkflowHandle { run_id, receiver }
    }
}

async fn drive<W: Workflow>(
    workflow: Arc<W>,
    deps: Arc<RunDeps>,
    run_id: String,
    input: W::Input,
) -> Result<W::Output, WorkflowError> {
    let recorded = deps.history.load_history(&run_id).await?;
    let mut ctx = WorkflowContext::new(
        run_id.clone(),
        recorded,
        deps.history.clone(),
        deps.activities.clone(),
        deps.options.clone(),
        deps.metrics.clone(),
    );

    let result = workflow
        .run(&mut ctx, input)
        .await
        .and_then(|output| {
            let value = serde_json::to_value(&output).map_err(WorkflowFailure::payload)?;
            Ok((output, value))
        });

    let (status, result) = match result {
        Ok((output, value)) => (RunStatus::Completed { result: value }, Ok(output)),
        Err(failure) if matches!(failure.root(), WorkflowFailure::History { .. }) => {
            // Without a trustworthy history the run stays resumable.
            tracing::error!(run_id = %run_id, error = %failure, "Workflow run suspended");
            return Err(failure.into());
        }
        Err(failure) => (RunStatus::Failed { failure: failure.clone() }, Err(failure)),
    };

    deps.history.finish_run(&run_id, status).await?;

    match &result {
        Ok(_) => tracing::info!(run_id = %run_id, workflow = W::NAME, "Workflow run completed"),
        Err(failure) => tracing::error!(
            run_id = %run_id,
            workflow = W::NAME,
            kind = failure.kind(),
            error = %failure,
            "Workflow run failed"
        ),
    }
    if let Some(metrics) = &deps.metrics {
        metrics.record_workflow_finished(W::NAME, result.is_ok());
    }

    result.map_err(WorkflowError::from)
}
