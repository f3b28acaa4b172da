// Service modules
pub mod codec;
pub mod gateway;
pub mod jwt_service;
pub mod membership;
pub mod order_service;
pub mod quota_service;
pub mod settlement_service;
pub mod signature;

pub use jwt_service::JWTService;
pub use membership::MembershipService;
pub use order_service::OrderService;
pub use quota_service::{QuotaCalendar, QuotaService};
pub use settlement_service::{NotifyKeys, SettlementService};
