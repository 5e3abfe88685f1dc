use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::de::DeserializeOwned;

use super::activities::{ActivityCall, ActivityRunner};
use super::errors::{ActivityError, ActivityFailure, WorkflowFailure};
use super::history::{ActivityOutcome, HistoryEvent, HistoryStore};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

/// How every activity of a run is executed.
#[derive(Clone, Debug)]
pub struct ActivityOptions {
    /// Upper bound for one attempt, start to close.
    pub start_to_close: Duration,
    pub retry: RetryConfig,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(60),
            retry: RetryConfig::activity(5),
        }
    }
}

/// Execution context handed to a workflow run.
///
/// Steps are numbered in the order the workflow asks for them. A step that
/// is already in the history is answered from there; the activity only runs
/// for steps the history does not have yet.
pub struct WorkflowContext {
    run_id: String,
    recorded: Vec<HistoryEvent>,
    next_sequence: u32,
    history: Arc<dyn HistoryStore>,
    activities: Arc<dyn ActivityRunner>,
    options: ActivityOptions,
    metrics: Option<Arc<Metrics>>,
}

impl WorkflowContext {
    pub(crate) fn new(
        run_id: String,
        recorded: Vec<HistoryEvent>,
        history: Arc<dyn HistoryStore>,
        activities: Arc<dyn ActivityRunner>,
        options: ActivityOptions,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { run_id, recorded, next_sequence: 0, history, activities, options, metrics }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// True while the run is still walking through recorded steps.
    pub fn is_replaying(&self) -> bool {
        self.recorded.iter().any(|event| event.sequence >= self.next_sequence)
    }

    pub async fn execute<T: DeserializeOwned>(&mut self, call: ActivityCall) -> Result<T, WorkflowFailure> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let recorded = self.recorded.iter().find(|event| event.sequence == sequence).cloned();

        let outcome = match recorded {
            Some(event) if event.activity != call.name() => {
                return Err(WorkflowFailure::NonDeterministic {
                    sequence,
                    recorded: event.activity.clone(),
                    replayed: call.name().to_string(),
                });
            }
            Some(event) => {
                tracing::debug!(
                    run_id = %self.run_id,
                    sequence = sequence,
                    activity = call.name(),
                    "Replaying recorded activity outcome"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_activity(call.name(), "replayed", None);
                }
                event.outcome
            }
            None => self.run_activity(sequence, call).await?,
        };

        match outcome {
            ActivityOutcome::Completed { result } => serde_json::from_value(result).map_err(WorkflowFailure::payload),
            ActivityOutcome::Failed { failure } => Err(WorkflowFailure::ActivityFailed(failure)),
        }
    }

    async fn run_activity(&mut self, sequence: u32, call: ActivityCall) -> Result<ActivityOutcome, WorkflowFailure> {
        let activity = call.name();
        let input = serde_json::to_value(&call).map_err(WorkflowFailure::payload)?;
        let timeout = self.options.start_to_close;
        let runner = self.activities.clone();
        let run_id = self.run_id.clone();
        let started = Instant::now();
        let mut attempts = 0;

        let result = retry_on_transient(self.options.retry.clone(), |attempt| {
            attempts = attempt;
            let runner = runner.clone();
            let call = call.clone();
            let run_id = run_id.clone();
            async move {
                tracing::debug!(run_id = %run_id, sequence = sequence, activity = activity, attempt = attempt, "Running activity");
                match tokio::time::timeout(timeout, runner.run(&call)).await {
                    Ok(result) => result,
                    Err(_) => Err(ActivityError::Timeout(timeout)),
                }
            }
        })
        .await
        .into_result();

        let outcome = match result {
            Ok(result) => ActivityOutcome::Completed { result },
            Err(error) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    sequence = sequence,
                    activity = activity,
                    attempts = attempts,
                    error = %error,
                    "Activity failed"
                );
                ActivityOutcome::Failed {
                    failure: ActivityFailure {
                        activity: activity.to_string(),
                        sequence,
                        kind: error.kind().to_string(),
                        message: error.to_string(),
                    },
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            let label = match outcome {
                ActivityOutcome::Completed { .. } => "completed",
                ActivityOutcome::Failed { .. } => "failed",
            };
            metrics.record_activity(activity, label, Some(started.elapsed().as_secs_f64()));
        }

        let event = HistoryEvent {
            run_id: self.run_id.clone(),
            sequence,
            activity: activity.to_string(),
            input,
            outcome,
            attempts,
            recorded_at: crate::domain::order::now(),
        };

        self.history.append_event(&event).await.map_err(WorkflowFailure::history)?;

        let outcome = event.outcome.clone();
        self.recorded.push(event);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use async_trait::async_trait;
    use serde_json::Value;
    use uuid::Uuid;

    use crate::clients::RemoteCallError;
    use crate::domain::order::OrderError;
    use crate::workflow::history::InMemoryHistoryStore;

    /// Answers every call with a price, failing transiently a few times first.
    struct CountingRunner {
        calls: AtomicU32,
        transient_failures: u32,
    }

    #[async_trait]
    impl ActivityRunner for CountingRunner {
        async fn run(&self, _call: &ActivityCall) -> Result<Value, ActivityError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.transient_failures {
                return Err(OrderError::Remote(RemoteCallError::new("GetPrice", anyhow::anyhow!("unavailable"))).into());
            }
            Ok(serde_json::json!(7.5))
        }
    }

    fn options() -> ActivityOptions {
        ActivityOptions {
            start_to_close: Duration::from_secs(1),
            retry: RetryConfig::activity(3).with_initial_delay(Duration::from_millis(1)),
        }
    }

    fn context(history: Arc<InMemoryHistoryStore>, runner: Arc<CountingRunner>, recorded: Vec<HistoryEvent>) -> WorkflowContext {
        WorkflowContext::new("run-1".into(), recorded, history, runner, options(), None)
    }

    fn price_call() -> ActivityCall {
        ActivityCall::GetProductPrice { product_id: Uuid::nil() }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_and_recorded_once() {
        let history = Arc::new(InMemoryHistoryStore::new());
        let runner = Arc::new(CountingRunner { calls: AtomicU32::new(0), transient_failures: 2 });
        let mut ctx = context(history.clone(), runner.clone(), Vec::new());

        let price: f64 = ctx.execute(price_call()).await.unwrap();

        assert_eq!(price, 7.5);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        let recorded = history.load_history("run-1").await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_recorded_step_is_not_executed_again() {
        let history = Arc::new(InMemoryHistoryStore::new());
        let runner = Arc::new(CountingRunner { calls: AtomicU32::new(0), transient_failures: 0 });

        let mut first = context(history.clone(), runner.clone(), Vec::new());
        let _: f64 = first.execute(price_call()).await.unwrap();

        let recorded = history.load_history("run-1").await.unwrap();
        let mut replay = context(history.clone(), runner.clone(), recorded);
        assert!(replay.is_replaying());
        let price: f64 = replay.execute(price_call()).await.unwrap();

        assert_eq!(price, 7.5);
        assert!(!replay.is_replaying());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_diverging_replay_is_rejected() {
        let history = Arc::new(InMemoryHistoryStore::new());
        let runner = Arc::new(CountingRunner { calls: AtomicU32::new(0), transient_failures: 0 });

        let mut first = context(history.clone(), runner.clone(), Vec::new());
        let _: f64 = first.execute(price_call()).await.unwrap();

        let recorded = history.load_history("run-1").await.unwrap();
        let mut replay = context(history, runner.clone(), recorded);
        let result = replay
            .execute::<Uuid>(ActivityCall::CreateOrder { order_id: Uuid::nil(), customer_id: Uuid::nil() })
            .await;

        assert!(matches!(result, Err(WorkflowFailure::NonDeterministic { sequence: 0, .. })));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_a_failure() {
        let history = Arc::new(InMemoryHistoryStore::new());
        let runner = Arc::new(CountingRunner { calls: AtomicU32::new(0), transient_failures: u32::MAX });
        let mut ctx = context(history.clone(), runner.clone(), Vec::new());

        let result = ctx.execute::<f64>(price_call()).await;

        let Err(WorkflowFailure::ActivityFailed(failure)) = result else {
            panic!("expected activity failure");
        };
        assert_eq!(failure.kind, "remote");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            history.load_history("run-1").await.unwrap()[0].outcome,
            ActivityOutcome::Failed { .. }
        ));
    }
}
