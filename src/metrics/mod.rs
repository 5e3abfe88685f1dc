// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Order creation per entry path (sync / workflow)
// - Workflow runs (started, resumed, finished) and activity executions
// - Broker publishes
// - Circuit breaker state per remote dependency
//
// All metrics are registered with one Registry, scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created: IntCounterVec,
    pub orders_failed: IntCounterVec,

    // Workflow Metrics
    pub workflow_runs_started: IntCounterVec,
    pub workflow_runs_resumed: IntCounterVec,
    pub workflow_runs_finished: IntCounterVec,
    pub activity_executions: IntCounterVec,
    pub activity_duration: HistogramVec,

    // Publish Metrics
    pub messages_published: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGaugeVec,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_created = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created, by entry path"),
            &["path"],
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_failed = IntCounterVec::new(
            Opts::new("orders_failed_total", "Order creations that failed"),
            &["path", "reason"],
        )?;
        registry.register(Box::new(orders_failed.clone()))?;

        // Workflow Metrics
        let workflow_runs_started = IntCounterVec::new(
            Opts::new("workflow_runs_started_total", "Workflow runs started"),
            &["workflow"],
        )?;
        registry.register(Box::new(workflow_runs_started.clone()))?;

        let workflow_runs_resumed = IntCounterVec::new(
            Opts::new("workflow_runs_resumed_total", "Workflow runs resumed from history"),
            &["workflow"],
        )?;
        registry.register(Box::new(workflow_runs_resumed.clone()))?;

        let workflow_runs_finished = IntCounterVec::new(
            Opts::new("workflow_runs_finished_total", "Workflow runs that reached a terminal state"),
            &["workflow", "outcome"],
        )?;
        registry.register(Box::new(workflow_runs_finished.clone()))?;

        let activity_executions = IntCounterVec::new(
            Opts::new("activity_executions_total", "Activity steps, executed or replayed"),
            &["activity", "outcome"],
        )?;
        registry.register(Box::new(activity_executions.clone()))?;

        let activity_duration = HistogramVec::new(
            HistogramOpts::new("activity_duration_seconds", "Activity execution duration, retries included")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["activity"],
        )?;
        registry.register(Box::new(activity_duration.clone()))?;

        // Publish Metrics
        let messages_published = IntCounterVec::new(
            Opts::new("messages_published_total", "Broker publishes by topic and outcome"),
            &["topic", "outcome"],
        )?;
        registry.register(Box::new(messages_published.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["breaker", "from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_failed,
            workflow_runs_started,
            workflow_runs_resumed,
            workflow_runs_finished,
            activity_executions,
            activity_duration,
            messages_published,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, path: &str) {
        self.orders_created.with_label_values(&[path]).inc();
    }

    pub fn record_order_failed(&self, path: &str, reason: &str) {
        self.orders_failed.with_label_values(&[path, reason]).inc();
    }

    pub fn record_workflow_started(&self, workflow: &str, resumed: bool) {
        if resumed {
            self.workflow_runs_resumed.with_label_values(&[workflow]).inc();
        } else {
            self.workflow_runs_started.with_label_values(&[workflow]).inc();
        }
    }

    pub fn record_workflow_finished(&self, workflow: &str, success: bool) {
        let outcome = if success { "completed" } else { "failed" };
        self.workflow_runs_finished.with_label_values(&[workflow, outcome]).inc();
    }

    /// `outcome` is one of `completed`, `failed` or `replayed`.
    pub fn record_activity(&self, activity: &str, outcome: &str, duration_secs: Option<f64>) {
        self.activity_executions.with_label_values(&[activity, outcome]).inc();
        if let Some(duration) = duration_secs {
            self.activity_duration.with_label_values(&[activity]).observe(duration);
        }
    }

    pub fn record_publish(&self, topic: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.messages_published.with_label_values(&[topic, outcome]).inc();
    }

    pub fn update_circuit_breaker_state(&self, breaker: &str, state: i64) {
        self.circuit_breaker_state.with_label_values(&[breaker]).set(state);
    }

    pub fn record_circuit_breaker_transition(&self, breaker: &str, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions
            .with_label_values(&[breaker, from_state, to_state])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(metrics: &Metrics, name: &str) -> Vec<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .map(|family| family.metric.iter().filter_map(|m| m.counter.value).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created("sync");
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_workflow_lifecycle() {
        let metrics = Metrics::new().unwrap();
        metrics.record_workflow_started("CreateOrderWorkflow", false);
        metrics.record_workflow_started("CreateOrderWorkflow", true);
        metrics.record_workflow_finished("CreateOrderWorkflow", true);

        assert_eq!(counter(&metrics, "workflow_runs_started_total"), vec![1.0]);
        assert_eq!(counter(&metrics, "workflow_runs_resumed_total"), vec![1.0]);
        assert_eq!(counter(&metrics, "workflow_runs_finished_total"), vec![1.0]);
    }

    #[test]
    fn test_record_activity() {
        let metrics = Metrics::new().unwrap();
        metrics.record_activity("GetProductPriceActivity", "completed", Some(0.02));
        metrics.record_activity("GetProductPriceActivity", "replayed", None);

        let executions = counter(&metrics, "activity_executions_total");
        assert_eq!(executions.len(), 2); // Two different outcome labels
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state("payment_service", 0);
        metrics.record_circuit_breaker_transition("payment_service", "Closed", "Open");
        metrics.update_circuit_breaker_state("payment_service", 1);

        let gathered = metrics.registry().gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
