// Request/Response models
pub mod common;
pub mod membership;
pub mod order;
pub mod payment;
pub mod plan;
pub mod quota;
