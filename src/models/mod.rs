mod api;
mod order;

pub use api::{CreateOrderResponse, HealthResponse};
pub use order::{CreateOrderRequest, Customer, OrderCommand, OrderStatus};
