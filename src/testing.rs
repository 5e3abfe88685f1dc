//! In-memory stand-ins for the remote services, the broker and the event
//! dispatcher, shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::clients::{NotificationClient, PaymentClient, ProductClient, RemoteCallError};
use crate::domain::order::{EventDispatcher, OrderError, OrderEvent};
use crate::messaging::{EventPublisher, OrderCreatedMessage};

#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<OrderEvent>>,
}

impl RecordingDispatcher {
    pub async fn events(&self) -> Vec<OrderEvent> {
        self.events.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &OrderEvent) -> Result<(), OrderError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Price list lookup. Unknown products fail like the real service does.
#[derive(Default)]
pub struct FakeProductClient {
    prices: HashMap<Uuid, f64>,
    calls: AtomicU32,
}

impl FakeProductClient {
    pub fn with_price(product_id: Uuid, price: f64) -> Self {
        Self::default().and_price(product_id, price)
    }

    pub fn and_price(mut self, product_id: Uuid, price: f64) -> Self {
        self.prices.insert(product_id, price);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductClient for FakeProductClient {
    async fn get_price(&self, product_id: Uuid) -> Result<f64, RemoteCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prices
            .get(&product_id)
            .copied()
            .ok_or_else(|| RemoteCallError::permanent("FindProduct", anyhow::anyhow!("product {product_id} not found")))
    }
}

#[derive(Default, Clone, Copy, PartialEq)]
enum PaymentMode {
    #[default]
    Accept,
    Fail,
    /// Never answers.
    Block,
    /// Answers once `release` was called.
    Gate,
}

#[derive(Default)]
pub struct FakePaymentClient {
    mode: PaymentMode,
    attempts: AtomicU32,
    calls: Mutex<Vec<(Uuid, Uuid, f64)>>,
    reached: Notify,
    gate: Notify,
}

impl FakePaymentClient {
    pub fn failing() -> Self {
        Self { mode: PaymentMode::Fail, ..Self::default() }
    }

    pub fn blocking() -> Self {
        Self { mode: PaymentMode::Block, ..Self::default() }
    }

    pub fn gated() -> Self {
        Self { mode: PaymentMode::Gate, ..Self::default() }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Resolves once a payment attempt has started.
    pub async fn wait_until_called(&self) {
        self.reached.notified().await;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted payments as (customer, order, amount).
    pub async fn calls(&self) -> Vec<(Uuid, Uuid, f64)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PaymentClient for FakePaymentClient {
    async fn process_payment(&self, customer_id: Uuid, order_id: Uuid, amount: f64) -> Result<(), RemoteCallError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.reached.notify_one();

        match self.mode {
            PaymentMode::Accept => {}
            PaymentMode::Fail => {
                return Err(RemoteCallError::new("ProcessPayment", anyhow::anyhow!("card declined")));
            }
            PaymentMode::Block => std::future::pending::<()>().await,
            PaymentMode::Gate => self.gate.notified().await,
        }

        self.calls.lock().await.push((customer_id, order_id, amount));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotificationClient {
    fail: AtomicBool,
    attempts: AtomicU32,
    calls: Mutex<Vec<(Uuid, String)>>,
}

impl FakeNotificationClient {
    pub fn failing() -> Self {
        Self { fail: AtomicBool::new(true), ..Self::default() }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Delivered notifications as (customer, message).
    pub async fn calls(&self) -> Vec<(Uuid, String)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl NotificationClient for FakeNotificationClient {
    async fn send_notification(&self, customer_id: Uuid, message: &str) -> Result<(), RemoteCallError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteCallError::new("SendNotification", anyhow::anyhow!("notification service unavailable")));
        }
        self.calls.lock().await.push((customer_id, message.to_string()));
        Ok(())
    }
}

/// Broker stand-in; fails the first `failures` publish attempts.
#[derive(Default)]
pub struct RecordingPublisher {
    failures: u32,
    attempts: AtomicU32,
    messages: Mutex<Vec<OrderCreatedMessage>>,
}

impl RecordingPublisher {
    pub fn failing_times(failures: u32) -> Self {
        Self { failures, ..Self::default() }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn messages(&self) -> Vec<OrderCreatedMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_order_created(&self, message: &OrderCreatedMessage) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            anyhow::bail!("broker unavailable");
        }
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}
