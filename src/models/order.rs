use entity::{
    orders,
    sea_orm_active_enums::{OrderStatus, PaymentMethod, PlanType},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{common::Pagination, payment::PayParams};

/// Purchase request for a membership plan
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 16))]
    pub plan_type: String,
    #[validate(length(min = 1, max = 16))]
    pub payment_method: String,
    #[validate(length(max = 100))]
    pub device: Option<String>,
}

/// Request metadata stored with an order
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
    pub device: Option<String>,
}

/// Freshly created order plus what the client needs to pay for it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: uuid::Uuid,
    pub order_no: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub payment_method: PaymentMethod,
    pub pay_params: PayParams,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: time::OffsetDateTime,
}

/// Order as shown to its owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_no: String,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<time::OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl From<&orders::Model> for OrderSummary {
    fn from(order: &orders::Model) -> Self {
        Self {
            order_no: order.order_no.clone(),
            plan_type: order.plan_type,
            amount: order.amount,
            payment_method: order.payment_method,
            status: order.status,
            paid_at: order.paid_at,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub list: Vec<OrderSummary>,
    pub pagination: Pagination,
}
