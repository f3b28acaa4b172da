use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use tracing::{info, instrument, warn};

use crate::{
    app_state::AppState,
    error::Result,
    middleware::UserIdentity,
    models::{
        common::SuccessResponse,
        payment::{NotifyOutcome, OrderStatusSnapshot},
    },
    services::{codec::wechat_ack, settlement_service::SettlementError},
};

/// Whether the provider should stop redelivering
fn acknowledged(
    provider: &str,
    result: &std::result::Result<NotifyOutcome, SettlementError>,
) -> bool {
    match result {
        Ok(NotifyOutcome::Settled(order)) => {
            info!(provider, order_no = %order.order_no, "Notification settled order");
            true
        }
        Ok(NotifyOutcome::AlreadySettled(order)) => {
            info!(provider, order_no = %order.order_no, "Duplicate notification acknowledged");
            true
        }
        Ok(NotifyOutcome::Ignored { order_no, reason }) => {
            info!(provider, order_no = ?order_no, reason = %reason, "Notification ignored");
            true
        }
        Err(e) if e.acknowledges_receipt() => true,
        Err(e) => {
            warn!(provider, error = %e, "Notification rejected");
            false
        }
    }
}

/// POST /api/payment/wechat/notify
#[instrument(skip(state, body))]
pub async fn wechat_notify(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let body = String::from_utf8_lossy(&body);
    let result = state.settlement_service.handle_wechat_notify(&body).await;

    let ack = if acknowledged("wechat", &result) {
        wechat_ack(true, "OK")
    } else {
        let message = match result {
            Err(SettlementError::InvalidSignature) => "签名验证失败",
            Err(SettlementError::OrderNotFound(_)) => "订单不存在",
            Err(SettlementError::AmountMismatch { .. }) => "金额不匹配",
            _ => "处理失败",
        };
        wechat_ack(false, message)
    };

    ([(header::CONTENT_TYPE, "application/xml")], ack)
}

/// POST /api/payment/alipay/notify
#[instrument(skip(state, body))]
pub async fn alipay_notify(State(state): State<AppState>, body: Bytes) -> &'static str {
    let result = state.settlement_service.handle_alipay_notify(&body).await;

    if acknowledged("alipay", &result) {
        "success"
    } else {
        "fail"
    }
}

/// GET /api/payment/order/{order_no}/query
#[instrument(skip(state, identity))]
pub async fn query_order(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(order_no): Path<String>,
) -> Result<Json<SuccessResponse<OrderStatusSnapshot>>> {
    let snapshot = state
        .settlement_service
        .reconcile_order(identity.user_id, &order_no)
        .await?;

    Ok(Json(SuccessResponse::new(snapshot)))
}
