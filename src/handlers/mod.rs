mod health;
mod orders;

pub use health::{health_check, readiness_check};
pub use orders::create_order;
