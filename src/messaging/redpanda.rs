use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
};
use anyhow::Result;

use super::{EventPublisher, OrderCreatedMessage};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

/// Kafka-compatible publisher (Redpanda) guarded by a circuit breaker.
pub struct RedpandaPublisher {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    topic: String,
    metrics: Option<Arc<Metrics>>,
}

impl RedpandaPublisher {
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::named("redpanda", cb_config),
            topic: topic.into(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub async fn publish(&self, key: &str, message_type: &str, payload: &str) -> Result<()> {
        let topic = self.topic.as_str();

        let result = self
            .circuit_breaker
            .call(async {
                let headers = OwnedHeaders::new()
                    .insert(Header { key: "content-type", value: Some("application/json") })
                    .insert(Header { key: "type", value: Some(message_type) });

                let record = FutureRecord::to(topic)
                    .key(key)
                    .payload(payload)
                    .headers(headers);

                self.producer
                    .send(record, rdkafka::util::Timeout::After(Duration::from_secs(5)))
                    .await
                    .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;

                Ok::<(), anyhow::Error>(())
            })
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_publish(topic, result.is_ok());
        }

        match result {
            Ok(()) => {
                tracing::info!(topic = %topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                tracing::error!(topic = %topic, "Circuit breaker open - Redpanda unavailable");
                Err(anyhow::anyhow!("Circuit breaker open for Redpanda"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for RedpandaPublisher {
    async fn publish_order_created(&self, message: &OrderCreatedMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.publish(&message.order_id.to_string(), OrderCreatedMessage::MESSAGE_TYPE, &payload)
            .await
    }
}
