//! Storage port for orders and the membership ledger.
//!
//! Every mutation that can race is a single conditional update, so two
//! callers can never both observe the same state change. The sea-orm store
//! backs production; the in-memory store backs tests and local runs.

use async_trait::async_trait;
use entity::{orders, sea_orm_active_enums::OrderStatus, users};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;
use crate::models::payment::{MembershipGrant, PaidTransition, ProviderCorrelation};
use crate::models::quota::QuotaSnapshot;

mod memory;
mod sea_orm_store;

pub use memory::MemoryStore;
pub use sea_orm_store::SeaOrmStore;

#[async_trait]
pub trait SettlementStore: Send + Sync {
    // Orders

    /// Insert a new order. Returns `false` when the order number is taken.
    async fn insert_order(&self, order: &orders::Model) -> Result<bool>;

    async fn find_order(&self, order_no: &str) -> Result<Option<orders::Model>>;

    /// Order lookup scoped to its owner
    async fn find_user_order(&self, user_id: Uuid, order_no: &str)
        -> Result<Option<orders::Model>>;

    /// Page through a user's orders, newest first. `page` is 1-based.
    async fn list_user_orders(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<orders::Model>, u64)>;

    async fn attach_prepay(&self, order_no: &str, prepay_id: &str, nonce_str: &str)
        -> Result<()>;

    /// Move an order from `pending` to `paid`, recording the provider
    /// correlation. Only one concurrent caller gets `Transitioned`.
    async fn transition_to_paid(
        &self,
        order_no: &str,
        correlation: &ProviderCorrelation,
        paid_at: OffsetDateTime,
    ) -> Result<PaidTransition>;

    /// Delete pending orders whose expiry has passed. Returns the count.
    async fn purge_expired_orders(&self, now: OffsetDateTime) -> Result<u64>;

    // Membership ledger

    async fn find_user(&self, user_id: Uuid) -> Result<Option<users::Model>>;

    /// Overwrite the membership columns. Returns `false` if the user is gone.
    async fn apply_membership(&self, user_id: Uuid, grant: &MembershipGrant) -> Result<bool>;

    /// Start a new quota window unless `today` is already the stored one.
    async fn reset_quota_window(&self, user_id: Uuid, today: &str, total: i32) -> Result<bool>;

    /// Take one slot of today's window if `used < limit`. `None` means the
    /// window is full or not current.
    async fn consume_quota(
        &self,
        user_id: Uuid,
        today: &str,
        limit: i32,
    ) -> Result<Option<QuotaSnapshot>>;
}

/// Correlation columns written by a paid transition
pub(crate) struct CorrelationColumns {
    pub wechat_transaction_id: Option<String>,
    pub alipay_trade_no: Option<String>,
    pub alipay_buyer_id: Option<String>,
    pub alipay_buyer_logon_id: Option<String>,
}

impl From<&ProviderCorrelation> for CorrelationColumns {
    fn from(correlation: &ProviderCorrelation) -> Self {
        match correlation {
            ProviderCorrelation::Wechat { transaction_id } => Self {
                wechat_transaction_id: Some(transaction_id.clone()),
                alipay_trade_no: None,
                alipay_buyer_id: None,
                alipay_buyer_logon_id: None,
            },
            ProviderCorrelation::Alipay {
                trade_no,
                buyer_id,
                buyer_logon_id,
            } => Self {
                wechat_transaction_id: None,
                alipay_trade_no: Some(trade_no.clone()),
                alipay_buyer_id: buyer_id.clone(),
                alipay_buyer_logon_id: buyer_logon_id.clone(),
            },
        }
    }
}

/// Classify an order that a conditional `pending -> paid` update did not touch
pub(crate) fn classify_untouched(order: Option<orders::Model>) -> PaidTransition {
    match order {
        None => PaidTransition::NotFound,
        Some(order) if order.status == OrderStatus::Paid => PaidTransition::AlreadyPaid(order),
        Some(order) => PaidTransition::NotPending(order),
    }
}
