// ============================================================================
// Remote Service Clients
// ============================================================================
//
// Capability interfaces for the pricing, payment and notification services.
// The order core only ever talks to these traits; `grpc` holds the tonic
// implementations used by the binary.
//
// ============================================================================

mod grpc;

use async_trait::async_trait;
use uuid::Uuid;

pub use grpc::{GrpcNotificationClient, GrpcPaymentClient, GrpcProductClient};

/// A remote call failed. `source()` is the original transport or service error.
#[derive(Debug, thiserror::Error)]
#[error("{operation} call failed: {source}")]
pub struct RemoteCallError {
    pub operation: &'static str,
    #[source]
    pub source: anyhow::Error,
    /// The service rejected the request itself; repeating it cannot succeed.
    pub permanent: bool,
}

impl RemoteCallError {
    pub fn new(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self { operation, source: source.into(), permanent: false }
    }

    pub fn permanent(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self { operation, source: source.into(), permanent: true }
    }
}

#[async_trait]
pub trait ProductClient: Send + Sync {
    async fn get_price(&self, product_id: Uuid) -> Result<f64, RemoteCallError>;
}

#[async_trait]
pub trait PaymentClient: Send + Sync {
    async fn process_payment(&self, customer_id: Uuid, order_id: Uuid, amount: f64) -> Result<(), RemoteCallError>;
}

#[async_trait]
pub trait NotificationClient: Send + Sync {
    async fn send_notification(&self, customer_id: Uuid, message: &str) -> Result<(), RemoteCallError>;
}
