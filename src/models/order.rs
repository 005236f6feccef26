use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Customer details attached to an order.
///
/// Free-form text; no format validation is performed on any field.
/// Unknown fields are ignored here so that readers accept commands written
/// by newer producers; inbound requests reject them instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Request-side shape of [`Customer`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictCustomer {
    first_name: String,
    last_name: String,
    email: String,
}

fn strict_customer<'de, D>(deserializer: D) -> Result<Customer, D::Error>
where
    D: Deserializer<'de>,
{
    let customer = StrictCustomer::deserialize(deserializer)?;
    Ok(Customer {
        first_name: customer.first_name,
        last_name: customer.last_name,
        email: customer.email,
    })
}

/// Lifecycle tag of an order command.
///
/// Commands are always created as `New`; nothing in this pipeline
/// transitions them further.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    New,
}

/// Inbound body of `POST /api/v1/order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    /// Integral amount, copied verbatim into the command
    pub price: u64,
    #[serde(deserialize_with = "strict_customer")]
    pub customer: Customer,
}

/// The unit of record on the log.
///
/// Built once by the ingestion service and never mutated afterwards. The
/// `order_id` doubles as the record's partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCommand {
    pub order_id: Uuid,
    pub price: u64,
    pub customer: Customer,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderCommand {
    /// Create a `New` command from a validated request.
    pub fn new(order_id: Uuid, request: CreateOrderRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            price: request.price,
            customer: request.customer,
            status: OrderStatus::New,
            created_at,
        }
    }

    /// Partition key for this command: the textual order id as raw bytes.
    pub fn partition_key(&self) -> Bytes {
        Bytes::from(self.order_id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            price: 1500,
            customer: Customer {
                first_name: "Ana".to_string(),
                last_name: "Kos".to_string(),
                email: "ana@example.com".to_string(),
            },
        }
    }

    #[test]
    fn test_new_command_copies_request() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let command = OrderCommand::new(id, request(), now);

        assert_eq!(command.order_id, id);
        assert_eq!(command.price, 1500);
        assert_eq!(command.customer.email, "ana@example.com");
        assert_eq!(command.status, OrderStatus::New);
        assert_eq!(command.created_at, now);
    }

    #[test]
    fn test_partition_key_is_textual_order_id() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let command = OrderCommand::new(id, request(), Utc::now());

        assert_eq!(
            command.partition_key().as_ref(),
            b"550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_order_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::New).unwrap();
        assert_eq!(json, "\"new\"");
    }

    #[test]
    fn test_request_rejects_unknown_customer_field() {
        let json = r#"{"price": 1, "customer":
            {"first_name": "a", "last_name": "b", "email": "c", "phone": "d"}}"#;
        assert!(serde_json::from_str::<CreateOrderRequest>(json).is_err());
    }

    #[test]
    fn test_customer_ignores_unknown_field() {
        let json = r#"{"first_name": "a", "last_name": "b", "email": "c", "phone": "d"}"#;
        let customer: Customer = serde_json::from_str(json).unwrap();
        assert_eq!(customer.email, "c");
    }

    #[test]
    fn test_request_rejects_negative_price() {
        let json = r#"{"price": -1, "customer":
            {"first_name": "a", "last_name": "b", "email": "c"}}"#;
        assert!(serde_json::from_str::<CreateOrderRequest>(json).is_err());
    }
}
