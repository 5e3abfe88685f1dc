use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::OrderError;
use crate::workflow::{CreateOrderInput, OrderLine};

/// Inbound order request as it arrives from the transport: identifiers are
/// still strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

fn parse_id(field: &str, value: &str) -> Result<Uuid, OrderError> {
    Uuid::parse_str(value.trim()).map_err(|e| OrderError::Validation(format!("{field} {value:?} is not a UUID: {e}")))
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<CreateOrderInput, OrderError> {
        let customer_id = parse_id("customer_id", &self.customer_id)?;
        if customer_id.is_nil() {
            return Err(OrderError::Validation("customer_id must not be nil".into()));
        }

        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(line, item)| {
                let product_id = parse_id("product_id", &item.product_id)?;
                if item.quantity == 0 {
                    return Err(OrderError::Validation(format!("line {line}: quantity must be at least 1")));
                }
                Ok(OrderLine { product_id, quantity: item.quantity })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CreateOrderInput { customer_id, items })
    }
}

/// `order_id` as received from the transport.
pub fn parse_order_id(order_id: &str) -> Result<Uuid, OrderError> {
    parse_id("order_id", order_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(customer_id: &str, lines: &[(&str, u32)]) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: customer_id.to_string(),
            items: lines
                .iter()
                .map(|(product_id, quantity)| OrderLineRequest { product_id: product_id.to_string(), quantity: *quantity })
                .collect(),
        }
    }

    #[test]
    fn test_valid_request() {
        let customer_id = Uuid::now_v7();
        let product_id = Uuid::now_v7();

        let input = request(&customer_id.to_string(), &[(&product_id.to_string(), 2)]).validate().unwrap();

        assert_eq!(input.customer_id, customer_id);
        assert_eq!(input.items, vec![OrderLine { product_id, quantity: 2 }]);
    }

    #[test]
    fn test_empty_item_list_is_allowed() {
        let input = request(&Uuid::now_v7().to_string(), &[]).validate().unwrap();
        assert!(input.items.is_empty());
    }

    #[test]
    fn test_malformed_identifiers_are_rejected() {
        let product_id = Uuid::now_v7().to_string();
        for bad in [
            request("not-a-uuid", &[(&product_id, 1)]),
            request(&Uuid::nil().to_string(), &[(&product_id, 1)]),
            request(&Uuid::now_v7().to_string(), &[("", 1)]),
            request(&Uuid::now_v7().to_string(), &[(&product_id, 0)]),
        ] {
            assert!(matches!(bad.validate(), Err(OrderError::Validation(_))), "{bad:?}");
        }
        assert!(parse_order_id("42").is_err());
    }
}
