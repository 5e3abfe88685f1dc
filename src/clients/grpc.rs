use async_trait::async_trait;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{NotificationClient, PaymentClient, ProductClient, RemoteCallError};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// gRPC Clients (tonic + prost)
// ============================================================================
//
// Message types mirror the internal service contracts. Calls go through
// `tonic::client::Grpc` directly and every client is guarded by its own
// circuit breaker.
//
// ============================================================================

const FIND_PRODUCT: &str = "/product.ProductInternalService/FindProduct";
const PROCESS_PAYMENT: &str = "/payment.PaymentServiceInternal/ProcessPayment";
const SEND_NOTIFICATION: &str = "/notification.NotificationInternalService/SendNotification";

#[derive(Clone, PartialEq, prost::Message)]
pub struct FindProductRequest {
    #[prost(string, tag = "1")]
    pub product_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Product {
    #[prost(string, tag = "1")]
    pub product_id: String,
    #[prost(double, tag = "2")]
    pub price: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FindProductResponse {
    #[prost(message, optional, tag = "1")]
    pub product: Option<Product>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProcessPaymentRequest {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub order_id: String,
    #[prost(double, tag = "3")]
    pub amount: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProcessPaymentResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SendNotificationRequest {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SendNotificationResponse {}

/// Lazily connected channel plus the breaker guarding it.
#[derive(Clone)]
struct GrpcConnection {
    channel: Channel,
    circuit_breaker: CircuitBreaker,
}

impl GrpcConnection {
    fn connect_lazy(name: &'static str, address: &str) -> anyhow::Result<Self> {
        let channel = Endpoint::from_shared(address.to_string())?
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .connect_lazy();

        Ok(Self {
            channel,
            circuit_breaker: CircuitBreaker::named(name, CircuitBreakerConfig::default()),
        })
    }

    fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_metrics(metrics);
        self
    }

    async fn unary<Req, Resp>(
        &self,
        operation: &'static str,
        path: &'static str,
        request: Req,
    ) -> Result<Resp, RemoteCallError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());

        let result = self
            .circuit_breaker
            .call(async move {
                grpc.ready()
                    .await
                    .map_err(|e| tonic::Status::unavailable(format!("service was not ready: {e}")))?;

                let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
                let response = grpc
                    .unary(tonic::Request::new(request), PathAndQuery::from_static(path), codec)
                    .await?;

                Ok::<Resp, tonic::Status>(response.into_inner())
            })
            .await;

        result.map_err(|e| {
            tracing::warn!(operation = operation, error = %e, "Remote call failed");
            remote_error(operation, e)
        })
    }
}

/// `NotFound` and `InvalidArgument` are answers about the request, not the
/// service, so they are not worth retrying.
fn remote_error(operation: &'static str, err: CircuitBreakerError<tonic::Status>) -> RemoteCallError {
    let rejected = matches!(
        &err,
        CircuitBreakerError::OperationFailed(status)
            if matches!(status.code(), tonic::Code::NotFound | tonic::Code::InvalidArgument)
    );

    if rejected {
        RemoteCallError::permanent(operation, err)
    } else {
        RemoteCallError::new(operation, err)
    }
}

pub struct GrpcProductClient {
    connection: GrpcConnection,
}

impl GrpcProductClient {
    pub fn connect_lazy(address: &str) -> anyhow::Result<Self> {
        Ok(Self { connection: GrpcConnection::connect_lazy("product_service", address)? })
    }

    pub fn with_metrics(self, metrics: Arc<Metrics>) -> Self {
        Self { connection: self.connection.with_metrics(metrics) }
    }
}

#[async_trait]
impl ProductClient for GrpcProductClient {
    async fn get_price(&self, product_id: Uuid) -> Result<f64, RemoteCallError> {
        let response: FindProductResponse = self
            .connection
            .unary(
                "GetPrice",
                FIND_PRODUCT,
                FindProductRequest { product_id: product_id.to_string() },
            )
            .await?;

        response
            .product
            .map(|product| product.price)
            .ok_or_else(|| RemoteCallError::permanent("GetPrice", anyhow::anyhow!("product {product_id} not found")))
    }
}

pub struct GrpcPaymentClient {
    connection: GrpcConnection,
}

impl GrpcPaymentClient {
    pub fn connect_lazy(address: &str) -> anyhow::Result<Self> {
        Ok(Self { connection: GrpcConnection::connect_lazy("payment_service", address)? })
    }

    pub fn with_metrics(self, metrics: Arc<Metrics>) -> Self {
        Self { connection: self.connection.with_metrics(metrics) }
    }
}

#[async_trait]
impl PaymentClient for GrpcPaymentClient {
    async fn process_payment(&self, customer_id: Uuid, order_id: Uuid, amount: f64) -> Result<(), RemoteCallError> {
        let _: ProcessPaymentResponse = self
            .connection
            .unary(
                "ProcessPayment",
                PROCESS_PAYMENT,
                ProcessPaymentRequest {
                    user_id: customer_id.to_string(),
                    order_id: order_id.to_string(),
                    amount,
                },
            )
            .await?;

        tracing::info!(order_id = %order_id, amount = amount, "Payment processed");
        Ok(())
    }
}

pub struct GrpcNotificationClient {
    connection: GrpcConnection,
}

impl GrpcNotificationClient {
    pub fn connect_lazy(address: &str) -> anyhow::Result<Self> {
        Ok(Self { connection: GrpcConnection::connect_lazy("notification_service", address)? })
    }

    pub fn with_metrics(self, metrics: Arc<Metrics>) -> Self {
        Self { connection: self.connection.with_metrics(metrics) }
    }
}

#[async_trait]
impl NotificationClient for GrpcNotificationClient {
    async fn send_notification(&self, customer_id: Uuid, message: &str) -> Result<(), RemoteCallError> {
        let _: SendNotificationResponse = self
            .connection
            .unary(
                "SendNotification",
                SEND_NOTIFICATION,
                SendNotificationRequest {
                    user_id: customer_id.to_string(),
                    message: message.to_string(),
                },
            )
            .await?;
        Ok(())
    }
}
