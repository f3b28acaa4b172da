use std::sync::Arc;

use entity::{
    orders,
    sea_orm_active_enums::{OrderStatus, PaymentMethod, PlanType},
};
use rand::Rng;
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::OrdersConfig,
    error::{ApiError, Result},
    models::{
        common::Pagination,
        order::{ClientInfo, OrderListQuery, OrderListResponse, OrderSummary},
        plan::PlanCatalog,
    },
    store::SettlementStore,
};

const MAX_ORDER_NO_ATTEMPTS: usize = 5;
const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;

/// `<prefix><YYYYMMDDHHmm><4 random digits>`, wall clock at `offset`
pub fn generate_order_no(prefix: &str, at: OffsetDateTime, offset: UtcOffset) -> String {
    let local = at.to_offset(offset);
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}{:04}{:02}{:02}{:02}{:02}{:04}",
        prefix,
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        suffix
    )
}

pub struct OrderService {
    store: Arc<dyn SettlementStore>,
    catalog: PlanCatalog,
    config: OrdersConfig,
    offset: UtcOffset,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        catalog: &PlanCatalog,
        config: &OrdersConfig,
        offset: UtcOffset,
    ) -> Self {
        Self {
            store,
            catalog: catalog.clone(),
            config: config.clone(),
            offset,
        }
    }

    /// Persist a pending order priced from the plan catalog
    #[instrument(skip(self, client))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        plan: PlanType,
        method: PaymentMethod,
        client: ClientInfo,
    ) -> Result<orders::Model> {
        let now = OffsetDateTime::now_utc();
        let mut order = orders::Model {
            id: Uuid::new_v4(),
            order_no: String::new(),
            user_id,
            plan_type: plan,
            amount: self.catalog.plan(plan).price,
            payment_method: method,
            status: OrderStatus::Pending,
            wechat_prepay_id: None,
            wechat_nonce_str: None,
            wechat_transaction_id: None,
            alipay_trade_no: None,
            alipay_buyer_id: None,
            alipay_buyer_logon_id: None,
            paid_at: None,
            expire_at: now + Duration::minutes(self.config.pending_ttl_minutes),
            refund_amount: None,
            refund_reason: None,
            refund_no: None,
            refunded_at: None,
            client_ip: Some(client.ip),
            client_user_agent: client.user_agent,
            client_device: client.device,
            remark: None,
            created_at: now,
            updated_at: now,
        };

        for attempt in 1..=MAX_ORDER_NO_ATTEMPTS {
            order.order_no = generate_order_no(&self.config.order_no_prefix, now, self.offset);
            if self.store.insert_order(&order).await? {
                info!(
                    order_no = %order.order_no,
                    user_id = %user_id,
                    plan = plan.as_str(),
                    method = method.as_str(),
                    amount = %order.amount,
                    "Order created"
                );
                return Ok(order);
            }
            warn!(order_no = %order.order_no, attempt, "Order number collision, retrying");
        }

        Err(ApiError::Conflict(
            "Could not allocate an order number, please retry".to_string(),
        ))
    }

    /// Owner-scoped order lookup
    pub async fn find_user_order(&self, user_id: Uuid, order_no: &str) -> Result<orders::Model> {
        self.store
            .find_user_order(user_id, order_no)
            .await?
            .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_order_status(&self, user_id: Uuid, order_no: &str) -> Result<OrderSummary> {
        let order = self.find_user_order(user_id, order_no).await?;
        Ok(OrderSummary::from(&order))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        query: OrderListQuery,
    ) -> Result<OrderListResponse> {
        let page = query.page.unwrap_or(1).max(1);
        let page_size = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
                ApiError::BadRequest(format!("Unknown order status: {}", raw))
            })?),
            None => None,
        };

        let (orders, total) = self
            .store
            .list_user_orders(user_id, status, page, page_size)
            .await?;

        Ok(OrderListResponse {
            list: orders.iter().map(OrderSummary::from).collect(),
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Drop pending orders past their expiry
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self
            .store
            .purge_expired_orders(OffsetDateTime::now_utc())
            .await?;
        if removed > 0 {
            info!(removed, "Expired pending orders purged");
        }
        Ok(removed)
    }
}
