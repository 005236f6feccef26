use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderCommand;

/// Response after an order command was accepted onto the log.
///
/// Acceptance only confirms the publish; downstream processing happens
/// asynchronously in the worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub message: String,
    pub data: OrderCommand,
}

impl CreateOrderResponse {
    pub fn accepted(command: OrderCommand) -> Self {
        Self {
            success: true,
            message: "order accepted".to_string(),
            data: command,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Whether the log writer holds a live broker connection
    pub log_connected: bool,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Orders accepted since startup
    pub orders_accepted: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{CreateOrderRequest, Customer};
    use uuid::Uuid;

    #[test]
    fn test_create_order_response_shape() {
        let command = OrderCommand::new(
            Uuid::new_v4(),
            CreateOrderRequest {
                price: 10,
                customer: Customer {
                    first_name: "a".to_string(),
                    last_name: "b".to_string(),
                    email: "c".to_string(),
                },
            },
            Utc::now(),
        );
        let json = serde_json::to_value(CreateOrderResponse::accepted(command)).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["status"], "new");
        assert_eq!(json["data"]["price"], 10);
        assert!(json["data"]["order_id"].is_string());
        assert!(json["data"]["created_at"].is_string());
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            log_connected: true,
            version: "0.1.0".to_string(),
            timestamp: Utc::now(),
            uptime_seconds: 3,
            orders_accepted: 0,
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"log_connected\":true"));
    }
}
