use std::sync::Arc;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_service::application::OrderApplicationService;
use order_service::clients::{
    GrpcNotificationClient, GrpcPaymentClient, GrpcProductClient, NotificationClient, PaymentClient, ProductClient,
};
use order_service::config::Config;
use order_service::messaging::{EventPublisher, RedpandaPublisher};
use order_service::metrics::{self, Metrics};
use order_service::persistence::{self, PgOrderQueryService, PgUnitOfWork};
use order_service::utils::RetryConfig;
use order_service::workflow::{
    ActivityOptions, CreateOrderWorkflow, EngineWorkflowStarter, OrderActivities, PgHistoryStore, WorkflowEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting order service");

    // === 1. PostgreSQL ===
    tracing::info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    persistence::ensure_schema(&pool).await?;

    let history = Arc::new(PgHistoryStore::new(pool.clone()));
    history.ensure_schema().await?;

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // The metrics server runs its own actix system on a dedicated thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 3. Remote services and broker ===
    let products: Arc<dyn ProductClient> =
        Arc::new(GrpcProductClient::connect_lazy(&config.product_service_address)?.with_metrics(metrics.clone()));
    let payments: Arc<dyn PaymentClient> =
        Arc::new(GrpcPaymentClient::connect_lazy(&config.payment_service_address)?.with_metrics(metrics.clone()));
    let notifications: Arc<dyn NotificationClient> = Arc::new(
        GrpcNotificationClient::connect_lazy(&config.notification_service_address)?.with_metrics(metrics.clone()),
    );
    let publisher: Arc<dyn EventPublisher> = Arc::new(
        RedpandaPublisher::new(&config.kafka_brokers, config.order_created_topic.clone())?.with_metrics(metrics.clone()),
    );

    // === 4. Workflow engine ===
    let uow = PgUnitOfWork::new(pool.clone());
    let activities = OrderActivities::new(uow.clone(), products.clone(), payments.clone(), notifications.clone());
    let engine = Arc::new(WorkflowEngine::with_metrics(
        CreateOrderWorkflow,
        history,
        Arc::new(activities),
        ActivityOptions {
            start_to_close: config.activity_timeout,
            retry: RetryConfig::activity(config.activity_max_attempts),
        },
        metrics.clone(),
    ));

    // Runs left behind by a previous process
    let resumed = engine.resume_pending().await?;
    tracing::info!(count = resumed.len(), "Resumed pending workflow runs");
    for handle in resumed {
        tokio::spawn(async move {
            let run_id = handle.run_id().to_string();
            match handle.result().await {
                Ok(result) => tracing::info!(run_id = %run_id, order_id = %result.order_id, "Resumed run completed"),
                Err(e) => tracing::error!(run_id = %run_id, error = %e, "Resumed run failed"),
            }
        });
    }

    // === 5. Application service ===
    // Handed to the inbound RPC binding, which lives outside this crate.
    let _orders = Arc::new(
        OrderApplicationService::new(
            uow,
            Arc::new(PgOrderQueryService::new(pool.clone())),
            products,
            payments,
            notifications,
            Arc::new(EngineWorkflowStarter::new(engine.clone())),
            publisher,
        )
        .with_metrics(metrics.clone()),
    );

    tracing::info!("Order service ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    engine.shutdown().await;
    pool.close().await;

    Ok(())
}
