use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::activities::{order_identity, ActivityCall};
use super::context::WorkflowContext;
use super::engine::Workflow;
use super::errors::WorkflowFailure;

// ============================================================================
// CreateOrderWorkflow - the order creation saga
// ============================================================================
//
// 1. CreateOrderActivity                      → order_id (derived from run_id)
// 2. per line: GetProductPriceActivity        → price
//              AddItemActivity (quantity units at price)
// 3. ProcessPaymentActivity(total)
// 4. SendNotificationActivity                 (failure is logged, not fatal)
//
// No compensation: once step 1 succeeded, any later failure is reported as
// partially applied to the created order.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderInput {
    pub customer_id: Uuid,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderResult {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreateOrderWorkflow;

impl CreateOrderWorkflow {
    async fn fill_and_charge(
        &self,
        ctx: &mut WorkflowContext,
        input: &CreateOrderInput,
        order_id: Uuid,
    ) -> Result<f64, WorkflowFailure> {
        let mut total_amount = 0.0;

        for (line, item) in input.items.iter().enumerate() {
            let price: f64 = ctx
                .execute(ActivityCall::GetProductPrice { product_id: item.product_id })
                .await?;

            total_amount += price * f64::from(item.quantity);

            ctx.execute::<()>(ActivityCall::AddItem {
                order_id,
                product_id: item.product_id,
                price,
                quantity: item.quantity,
                line: line as u32,
            })
            .await?;
        }

        ctx.execute::<()>(ActivityCall::ProcessPayment {
            customer_id: input.customer_id,
            order_id,
            amount: total_amount,
        })
        .await?;

        Ok(total_amount)
    }
}

#[async_trait]
impl Workflow for CreateOrderWorkflow {
    type Input = CreateOrderInput;
    type Output = CreateOrderResult;

    const NAME: &'static str = "CreateOrderWorkflow";

    async fn run(&self, ctx: &mut WorkflowContext, input: CreateOrderInput) -> Result<CreateOrderResult, WorkflowFailure> {
        let order_id = order_identity(ctx.run_id());
        let order_id: Uuid = ctx
            .execute(ActivityCall::CreateOrder { order_id, customer_id: input.customer_id })
            .await?;

        let total_amount = self
            .fill_and_charge(ctx, &input, order_id)
            .await
            .map_err(|cause| cause.partially_applied(order_id))?;

        let notification = ctx
            .execute::<()>(ActivityCall::SendNotification {
                customer_id: input.customer_id,
                message: format!("Order {order_id} created, total {total_amount:.2}"),
            })
            .await;

        match notification {
            Ok(()) => {}
            Err(WorkflowFailure::ActivityFailed(failure)) => {
                tracing::warn!(run_id = %ctx.run_id(), order_id = %order_id, error = %failure, "Notification not delivered");
            }
            Err(other) => return Err(other.partially_applied(order_id)),
        }

        Ok(CreateOrderResult {
            order_id,
            customer_id: input.customer_id,
            total_amount,
        })
    }
}
