//! Settlement records exchanged between the gateway clients, the settlement
//! service and the storage port.

use entity::{
    orders,
    sea_orm_active_enums::{MembershipTier, OrderStatus},
};
use rust_decimal::Decimal;
use serde::Serialize;

/// Provider-side identifiers recorded when an order is paid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCorrelation {
    Wechat {
        transaction_id: String,
    },
    Alipay {
        trade_no: String,
        buyer_id: Option<String>,
        buyer_logon_id: Option<String>,
    },
}

/// Outcome of the conditional `pending -> paid` update
#[derive(Debug, Clone)]
pub enum PaidTransition {
    /// This caller moved the order to `paid`
    Transitioned(orders::Model),
    /// Someone else already settled it
    AlreadyPaid(orders::Model),
    /// The order exists but is neither pending nor paid
    NotPending(orders::Model),
    NotFound,
}

/// Absolute membership state written by an upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipGrant {
    pub tier: MembershipTier,
    pub started_at: time::OffsetDateTime,
    pub expires_at: time::OffsetDateTime,
    pub daily_total: i32,
}

/// Amount as reported by a provider, in its native representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedAmount {
    /// WeChat `total_fee`, integer fen
    Cents(i64),
    /// Alipay `total_amount`, decimal yuan
    Decimal(Decimal),
}

impl std::fmt::Display for ReportedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportedAmount::Cents(cents) => write!(f, "{} fen", cents),
            ReportedAmount::Decimal(amount) => write!(f, "{} yuan", amount),
        }
    }
}

/// Provider view of a trade, as returned by an order query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeState {
    Paid {
        correlation: ProviderCorrelation,
        amount: Option<ReportedAmount>,
    },
    /// Not paid (yet); carries the provider's raw state for logging
    Unpaid(String),
}

/// Input to a provider-side order creation
#[derive(Debug, Clone)]
pub struct GatewayOrderRequest {
    pub order_no: String,
    pub amount: Decimal,
    pub subject: String,
    pub client_ip: String,
    /// Payer's WeChat openid, required for JSAPI payments
    pub openid: Option<String>,
    /// The provider must stop accepting payment at this instant
    pub expire_at: time::OffsetDateTime,
}

/// WeChat JSAPI parameters handed to `WeixinJSBridge.invoke("getBrandWCPayRequest")`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WechatPayParams {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

/// Client-side parameters needed to launch the provider's payment UI
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PayParams {
    Wechat(WechatPayParams),
    /// Signed Alipay app-pay order string
    Alipay(String),
}

/// Result of a provider-side order creation
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub params: PayParams,
    /// WeChat prepay correlation, recorded on the order
    pub prepay_id: Option<String>,
    pub nonce_str: Option<String>,
}

/// Successful result of an inbound payment notification
#[derive(Debug, Clone)]
pub enum NotifyOutcome {
    /// This notification moved the order to `paid` and upgraded the member
    Settled(orders::Model),
    /// Duplicate delivery; nothing changed
    AlreadySettled(orders::Model),
    /// Provider reported a non-success trade; acknowledged without changes
    Ignored { order_no: Option<String>, reason: String },
}

/// Snapshot returned by order polling
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusSnapshot {
    pub order_no: String,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<time::OffsetDateTime>,
}

impl From<&orders::Model> for OrderStatusSnapshot {
    fn from(order: &orders::Model) -> Self {
        Self {
            order_no: order.order_no.clone(),
            status: order.status,
            paid_at: order.paid_at,
        }
    }
}
