use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use entity::{orders, sea_orm_active_enums::OrderStatus, users};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{classify_untouched, CorrelationColumns, SettlementStore};
use crate::error::Result;
use crate::models::payment::{MembershipGrant, PaidTransition, ProviderCorrelation};
use crate::models::quota::QuotaSnapshot;

/// In-memory store for tests and local development.
///
/// Each conditional update runs under the write lock of its table, which
/// gives the same single-winner behavior as the SQL `WHERE` guards.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: RwLock<HashMap<String, orders::Model>>,
    users: RwLock<HashMap<Uuid, users::Model>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user row
    pub fn upsert_user(&self, user: users::Model) {
        self.inner
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id, user);
    }

    /// Replace an order row, bypassing the state machine
    pub fn put_order(&self, order: orders::Model) {
        self.inner
            .orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order.order_no.clone(), order);
    }

    pub fn order_count(&self) -> usize {
        self.inner
            .orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn insert_order(&self, order: &orders::Model) -> Result<bool> {
        let mut orders = self
            .inner
            .orders
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if orders.contains_key(&order.order_no) {
            return Ok(false);
        }
        orders.insert(order.order_no.clone(), order.clone());
        Ok(true)
    }

    async fn find_order(&self, order_no: &str) -> Result<Option<orders::Model>> {
        Ok(self
            .inner
            .orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(order_no)
            .cloned())
    }

    async fn find_user_order(
        &self,
        user_id: Uuid,
        order_no: &str,
    ) -> Result<Option<orders::Model>> {
        Ok(self
            .find_order(order_no)
            .await?
            .filter(|order| order.user_id == user_id))
    }

    async fn list_user_orders(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<orders::Model>, u64)> {
        let orders = self
            .inner
            .orders
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<orders::Model> = orders
            .values()
            .filter(|order| order.user_id == user_id)
            .filter(|order| status.map_or(true, |status| order.status == status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_no.cmp(&a.order_no))
        });

        let total = matching.len() as u64;
        let page_size = page_size.max(1);
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let items = matching
            .into_iter()
            .skip(skip as usize)
            .take(page_size as usize)
            .collect();

        Ok((items, total))
    }

    async fn attach_prepay(&self, order_no: &str, prepay_id: &str, nonce_str: &str) -> Result<()> {
        let mut orders = self
            .inner
            .orders
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(order) = orders.get_mut(order_no) {
            order.wechat_prepay_id = Some(prepay_id.to_string());
            order.wechat_nonce_str = Some(nonce_str.to_string());
            order.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn transition_to_paid(
        &self,
        order_no: &str,
        correlation: &ProviderCorrelation,
        paid_at: OffsetDateTime,
    ) -> Result<PaidTransition> {
        let mut orders = self
            .inner
            .orders
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match orders.get(order_no) {
            Some(order) if order.status == OrderStatus::Pending => {}
            other => return Ok(classify_untouched(other.cloned())),
        }
        let Some(order) = orders.get_mut(order_no) else {
            return Ok(PaidTransition::NotFound);
        };

        let columns = CorrelationColumns::from(correlation);
        order.status = OrderStatus::Paid;
        order.paid_at = Some(paid_at);
        order.updated_at = paid_at;
        if columns.wechat_transaction_id.is_some() {
            order.wechat_transaction_id = columns.wechat_transaction_id;
        }
        if columns.alipay_trade_no.is_some() {
            order.alipay_trade_no = columns.alipay_trade_no;
        }
        if columns.alipay_buyer_id.is_some() {
            order.alipay_buyer_id = columns.alipay_buyer_id;
        }
        if columns.alipay_buyer_logon_id.is_some() {
            order.alipay_buyer_logon_id = columns.alipay_buyer_logon_id;
        }

        Ok(PaidTransition::Transitioned(order.clone()))
    }

    async fn purge_expired_orders(&self, now: OffsetDateTime) -> Result<u64> {
        let mut orders = self
            .inner
            .orders
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = orders.len();
        orders.retain(|_, order| !(order.status == OrderStatus::Pending && order.expire_at < now));
        Ok((before - orders.len()) as u64)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<users::Model>> {
        Ok(self
            .inner
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned())
    }

    async fn apply_membership(&self, user_id: Uuid, grant: &MembershipGrant) -> Result<bool> {
        let mut users = self
            .inner
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };

        user.membership_tier = grant.tier;
        user.membership_started_at = Some(grant.started_at);
        user.membership_expires_at = Some(grant.expires_at);
        user.daily_total = grant.daily_total;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn reset_quota_window(&self, user_id: Uuid, today: &str, total: i32) -> Result<bool> {
        let mut users = self
            .inner
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(user) = users.get_mut(&user_id).filter(|user| user.daily_date != today) else {
            return Ok(false);
        };

        user.daily_date = today.to_string();
        user.daily_used = 0;
        user.daily_total = total;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn consume_quota(
        &self,
        user_id: Uuid,
        today: &str,
        limit: i32,
    ) -> Result<Option<QuotaSnapshot>> {
        let mut users = self
            .inner
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(user) = users
            .get_mut(&user_id)
            .filter(|user| user.daily_date == today && user.daily_used < limit)
        else {
            return Ok(None);
        };

        user.daily_used += 1;
        user.daily_total = limit;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(QuotaSnapshot::new(
            user.daily_date.clone(),
            user.daily_used,
            user.daily_total,
        )))
    }
}
