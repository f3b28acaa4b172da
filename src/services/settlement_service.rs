//! Settlement engine.
//!
//! Turns a verified provider payment (pushed by webhook or pulled by a
//! client poll) into exactly one `pending -> paid` transition followed by
//! exactly one membership upgrade. Duplicate and concurrent deliveries
//! converge on the conditional update in the store: only its winner
//! upgrades, everyone else sees `AlreadySettled`.

use std::sync::Arc;

use entity::{
    orders,
    sea_orm_active_enums::{OrderStatus, PaymentMethod, PlanType},
};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::SettlementConfig,
    error::{ApiError, Result},
    models::{
        order::{CheckoutResponse, ClientInfo, CreateOrderRequest},
        payment::{
            GatewayOrderRequest, NotifyOutcome, OrderStatusSnapshot, PaidTransition,
            ProviderCorrelation, ReportedAmount, TradeState,
        },
        plan::PlanCatalog,
    },
    services::{
        codec::{parse_alipay_form, parse_wechat_xml, Params},
        gateway::{to_cents, Gateways},
        membership::MembershipService,
        order_service::OrderService,
        signature::{wechat_verify, AlipaySigner},
    },
    store::SettlementStore,
};

/// Largest accepted gap between the Alipay-reported and the expected amount
const ALIPAY_AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Credentials for authenticating inbound notifications
#[derive(Clone)]
pub struct NotifyKeys {
    pub wechat_app_id: String,
    pub wechat_api_key: String,
    pub alipay_app_id: String,
    pub alipay: AlipaySigner,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("malformed notification: {0}")]
    Malformed(String),

    #[error("notification signature is invalid")]
    InvalidSignature,

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("amount mismatch on order {order_no}: expected {expected}, provider reported {reported}")]
    AmountMismatch {
        order_no: String,
        expected: Decimal,
        reported: String,
    },

    #[error("order {order_no} is {status} and cannot be settled")]
    InvalidState { order_no: String, status: OrderStatus },

    #[error("order {order_no} is paid but the membership upgrade of user {user_id} failed: {reason}")]
    Integrity {
        order_no: String,
        user_id: Uuid,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] ApiError),
}

impl SettlementError {
    /// The provider must still receive a success ack: the money has been
    /// recorded and redelivery cannot fix the failed upgrade.
    pub fn acknowledges_receipt(&self) -> bool {
        matches!(self, SettlementError::Integrity { .. })
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Malformed(msg) => ApiError::BadRequest(msg),
            SettlementError::InvalidSignature => {
                ApiError::Unauthorized("Invalid payment signature".to_string())
            }
            SettlementError::OrderNotFound(_) => ApiError::NotFound("Order not found".to_string()),
            e @ SettlementError::AmountMismatch { .. } => ApiError::AmountMismatch(e.to_string()),
            e @ SettlementError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            e @ SettlementError::Integrity { .. } => ApiError::Integrity(e.to_string()),
            SettlementError::Store(e) => e,
        }
    }
}

fn required<'a>(params: &'a Params, key: &str) -> std::result::Result<&'a str, SettlementError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SettlementError::Malformed(format!("missing {}", key)))
}

fn optional(params: &Params, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

/// WeChat amounts must match to the fen; Alipay allows a one-fen gap.
pub fn amount_matches(expected: Decimal, reported: &ReportedAmount) -> bool {
    match reported {
        ReportedAmount::Cents(cents) => to_cents(expected) == Some(*cents),
        ReportedAmount::Decimal(amount) => (expected - amount).abs() <= ALIPAY_AMOUNT_TOLERANCE,
    }
}

pub struct SettlementService {
    store: Arc<dyn SettlementStore>,
    orders: Arc<OrderService>,
    membership: Arc<MembershipService>,
    gateways: Gateways,
    keys: NotifyKeys,
    catalog: PlanCatalog,
    config: SettlementConfig,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        orders: Arc<OrderService>,
        membership: Arc<MembershipService>,
        gateways: Gateways,
        keys: NotifyKeys,
        catalog: &PlanCatalog,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            store,
            orders,
            membership,
            gateways,
            keys,
            catalog: catalog.clone(),
            config: config.clone(),
        }
    }

    /// Create a pending order and register it with the provider
    #[instrument(skip(self, request, client))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
        client: ClientInfo,
    ) -> Result<CheckoutResponse> {
        let plan = PlanType::parse(&request.plan_type)
            .ok_or_else(|| ApiError::InvalidPlan(format!("Unknown plan: {}", request.plan_type)))?;
        let method = PaymentMethod::parse(&request.payment_method).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unsupported payment method: {}",
                request.payment_method
            ))
        })?;

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        if method == PaymentMethod::Wechat && user.wechat_openid.is_none() {
            return Err(ApiError::BadRequest("Bind a WeChat account first".to_string()));
        }

        let client_ip = client.ip.clone();
        let client = ClientInfo {
            device: client.device.or(request.device),
            ..client
        };
        let order = self
            .orders
            .create_order(user_id, plan, method, client)
            .await?;

        let created = self
            .gateways
            .for_method(method)
            .create_order(&GatewayOrderRequest {
                order_no: order.order_no.clone(),
                amount: order.amount,
                subject: self.catalog.subject(plan),
                client_ip,
                openid: user.wechat_openid.clone(),
                expire_at: order.expire_at,
            })
            .await?;

        if let (Some(prepay_id), Some(nonce_str)) = (&created.prepay_id, &created.nonce_str) {
            self.store
                .attach_prepay(&order.order_no, prepay_id, nonce_str)
                .await?;
        }

        Ok(CheckoutResponse {
            order_id: order.id,
            order_no: order.order_no,
            amount: order.amount,
            plan_type: order.plan_type,
            payment_method: order.payment_method,
            pay_params: created.params,
            expire_at: order.expire_at,
        })
    }

    /// Process a WeChat Pay notification body
    #[instrument(skip(self, body))]
    pub async fn handle_wechat_notify(
        &self,
        body: &str,
    ) -> std::result::Result<NotifyOutcome, SettlementError> {
        let params =
            parse_wechat_xml(body).map_err(|e| SettlementError::Malformed(e.to_string()))?;

        let sign = params
            .get("sign")
            .filter(|s| !s.is_empty())
            .ok_or(SettlementError::InvalidSignature)?;
        if !wechat_verify(&params, &self.keys.wechat_api_key, sign) {
            warn!(order_no = ?params.get("out_trade_no"), "WeChat notification signature rejected");
            return Err(SettlementError::InvalidSignature);
        }
        if optional(&params, "appid").is_some_and(|appid| appid != self.keys.wechat_app_id) {
            return Err(SettlementError::Malformed("appid does not match".to_string()));
        }

        let order_no = optional(&params, "out_trade_no");
        if params.get("return_code").map(String::as_str) != Some("SUCCESS")
            || params.get("result_code").map(String::as_str) != Some("SUCCESS")
        {
            let reason = optional(&params, "err_code_des")
                .or_else(|| optional(&params, "return_msg"))
                .unwrap_or_else(|| "trade not successful".to_string());
            info!(order_no = ?order_no, reason = %reason, "WeChat notification without payment");
            return Ok(NotifyOutcome::Ignored { order_no, reason });
        }

        let order_no = required(&params, "out_trade_no")?;
        let transaction_id = required(&params, "transaction_id")?;
        let total_fee = required(&params, "total_fee")?
            .parse::<i64>()
            .map_err(|_| SettlementError::Malformed("total_fee is not an integer".to_string()))?;

        self.settle(
            order_no,
            ProviderCorrelation::Wechat {
                transaction_id: transaction_id.to_string(),
            },
            Some(ReportedAmount::Cents(total_fee)),
            true,
        )
        .await
    }

    /// Process an Alipay notification body
    #[instrument(skip(self, body))]
    pub async fn handle_alipay_notify(
        &self,
        body: &[u8],
    ) -> std::result::Result<NotifyOutcome, SettlementError> {
        let params =
            parse_alipay_form(body).map_err(|e| SettlementError::Malformed(e.to_string()))?;

        let sign = params
            .get("sign")
            .filter(|s| !s.is_empty())
            .ok_or(SettlementError::InvalidSignature)?;
        if !self.keys.alipay.verify(&params, sign) {
            warn!(order_no = ?params.get("out_trade_no"), "Alipay notification signature rejected");
            return Err(SettlementError::InvalidSignature);
        }
        if optional(&params, "app_id").is_some_and(|app_id| app_id != self.keys.alipay_app_id) {
            return Err(SettlementError::Malformed("app_id does not match".to_string()));
        }

        let order_no = optional(&params, "out_trade_no");
        let trade_status = params.get("trade_status").map(String::as_str).unwrap_or("");
        if !matches!(trade_status, "TRADE_SUCCESS" | "TRADE_FINISHED") {
            info!(order_no = ?order_no, trade_status, "Alipay notification without payment");
            return Ok(NotifyOutcome::Ignored {
                order_no,
                reason: format!("trade_status {}", trade_status),
            });
        }

        let order_no = required(&params, "out_trade_no")?;
        let trade_no = required(&params, "trade_no")?;
        let total_amount = required(&params, "total_amount")?
            .parse::<Decimal>()
            .map_err(|_| SettlementError::Malformed("total_amount is not a decimal".to_string()))?;

        self.settle(
            order_no,
            ProviderCorrelation::Alipay {
                trade_no: trade_no.to_string(),
                buyer_id: optional(&params, "buyer_id"),
                buyer_logon_id: optional(&params, "buyer_logon_id"),
            },
            Some(ReportedAmount::Decimal(total_amount)),
            true,
        )
        .await
    }

    /// Owner poll: settle from the provider's order query if still pending
    #[instrument(skip(self))]
    pub async fn reconcile_order(
        &self,
        user_id: Uuid,
        order_no: &str,
    ) -> Result<OrderStatusSnapshot> {
        let order = self.orders.find_user_order(user_id, order_no).await?;
        if order.status != OrderStatus::Pending {
            return Ok(OrderStatusSnapshot::from(&order));
        }

        let state = self
            .gateways
            .for_method(order.payment_method)
            .query_order(order_no)
            .await?;

        match state {
            TradeState::Unpaid(provider_state) => {
                debug!(order_no, provider_state = %provider_state, "Order not paid yet");
                Ok(OrderStatusSnapshot::from(&order))
            }
            TradeState::Paid {
                correlation,
                amount,
            } => {
                let outcome = self
                    .settle(
                        order_no,
                        correlation,
                        amount,
                        self.config.revalidate_amount_on_poll,
                    )
                    .await?;
                Ok(match outcome {
                    NotifyOutcome::Settled(order) | NotifyOutcome::AlreadySettled(order) => {
                        OrderStatusSnapshot::from(&order)
                    }
                    NotifyOutcome::Ignored { .. } => OrderStatusSnapshot::from(&order),
                })
            }
        }
    }

    /// Shared tail of both settlement paths
    async fn settle(
        &self,
        order_no: &str,
        correlation: ProviderCorrelation,
        reported: Option<ReportedAmount>,
        check_amount: bool,
    ) -> std::result::Result<NotifyOutcome, SettlementError> {
        let order = self
            .store
            .find_order(order_no)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(order_no.to_string()))?;

        match order.status {
            OrderStatus::Paid => {
                debug!(order_no, "Order already settled");
                return Ok(NotifyOutcome::AlreadySettled(order));
            }
            OrderStatus::Pending => {}
            status => {
                return Err(SettlementError::InvalidState {
                    order_no: order_no.to_string(),
                    status,
                })
            }
        }

        if check_amount {
            self.check_amount(&order, reported.as_ref())?;
        }

        let paid_at = OffsetDateTime::now_utc();
        let order = match self
            .store
            .transition_to_paid(order_no, &correlation, paid_at)
            .await?
        {
            PaidTransition::Transitioned(order) => order,
            PaidTransition::AlreadyPaid(order) => {
                debug!(order_no, "Lost settlement race, order already paid");
                return Ok(NotifyOutcome::AlreadySettled(order));
            }
            PaidTransition::NotPending(order) => {
                return Err(SettlementError::InvalidState {
                    order_no: order_no.to_string(),
                    status: order.status,
                })
            }
            PaidTransition::NotFound => {
                return Err(SettlementError::OrderNotFound(order_no.to_string()))
            }
        };

        if let Err(e) = self
            .membership
            .upgrade(order.user_id, order.plan_type, paid_at)
            .await
        {
            error!(
                target: "reconciliation",
                order_no = %order.order_no,
                user_id = %order.user_id,
                plan = order.plan_type.as_str(),
                error = %e,
                "Order paid but membership upgrade failed, manual reconciliation required"
            );
            return Err(SettlementError::Integrity {
                order_no: order.order_no,
                user_id: order.user_id,
                reason: e.to_string(),
            });
        }

        info!(
            order_no = %order.order_no,
            user_id = %order.user_id,
            plan = order.plan_type.as_str(),
            method = order.payment_method.as_str(),
            "Order settled"
        );
        Ok(NotifyOutcome::Settled(order))
    }

    fn check_amount(
        &self,
        order: &orders::Model,
        reported: Option<&ReportedAmount>,
    ) -> std::result::Result<(), SettlementError> {
        // Re-derived from the plan, never taken from the caller
        let expected = self.catalog.plan(order.plan_type).price;
        match reported {
            Some(amount) if amount_matches(expected, amount) => Ok(()),
            other => {
                let reported = other.map_or_else(|| "nothing".to_string(), ToString::to_string);
                warn!(
                    order_no = %order.order_no,
                    expected = %expected,
                    reported = %reported,
                    "Payment amount mismatch"
                );
                Err(SettlementError::AmountMismatch {
                    order_no: order.order_no.clone(),
                    expected,
                    reported,
                })
            }
        }
    }
}
