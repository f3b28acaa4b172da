//! Outbound payment provider clients.

use std::sync::Arc;

use async_trait::async_trait;
use entity::sea_orm_active_enums::PaymentMethod;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::StatusCode;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use time::{macros::offset, OffsetDateTime};
use tracing::warn;

use crate::{
    config::PaymentConfig,
    error::{ApiError, Result},
    models::payment::{CreatedPayment, GatewayOrderRequest, TradeState},
    services::signature::AlipaySigner,
};

mod alipay;
mod wechat;

pub use alipay::AlipayClient;
pub use wechat::WechatPayClient;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register the order with the provider and return client pay parameters
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<CreatedPayment>;

    /// Ask the provider whether the order has been paid
    async fn query_order(&self, order_no: &str) -> Result<TradeState>;
}

/// One client per supported provider
#[derive(Clone)]
pub struct Gateways {
    pub wechat: Arc<dyn PaymentGateway>,
    pub alipay: Arc<dyn PaymentGateway>,
}

impl Gateways {
    pub fn from_config(
        config: &PaymentConfig,
        alipay_signer: AlipaySigner,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            wechat: Arc::new(WechatPayClient::new(&config.wechat, &config.gateway)?),
            alipay: Arc::new(AlipayClient::new(
                &config.alipay,
                &config.gateway,
                alipay_signer,
            )?),
        })
    }

    pub fn for_method(&self, method: PaymentMethod) -> &dyn PaymentGateway {
        match method {
            PaymentMethod::Wechat => self.wechat.as_ref(),
            PaymentMethod::Alipay => self.alipay.as_ref(),
        }
    }
}

/// Yuan to integer fen, rounding half away from zero
pub fn to_cents(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Both providers read wall-clock fields as Beijing time
fn beijing_time(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(offset!(+8))
}

/// 32-character alphanumeric nonce
pub fn nonce_str() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn http_client(timeout_ms: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()?)
}

/// POST `body` and return the response text.
///
/// Transport failures, 5xx and 429 are retried `retry_attempts` more times
/// with a short linear backoff; anything else fails immediately.
async fn post_with_retry(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    content_type: &str,
    body: String,
    retry_attempts: u8,
) -> Result<String> {
    let mut attempts = 0u8;
    loop {
        let response = client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body.clone())
            .send()
            .await;

        let retryable = match response {
            Ok(resp) if resp.status().is_success() => {
                return resp.text().await.map_err(|e| {
                    ApiError::Upstream(format!("{} response unreadable: {}", provider, e))
                });
            }
            Ok(resp) => {
                let status = resp.status();
                let message = format!("{} returned HTTP {}", provider, status.as_u16());
                if !(status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS) {
                    return Err(ApiError::Upstream(message));
                }
                message
            }
            Err(e) => format!("{} request failed: {}", provider, e),
        };

        if attempts >= retry_attempts {
            return Err(ApiError::Upstream(retryable));
        }
        attempts += 1;
        warn!(attempt = attempts, "{}, retrying", retryable);
        tokio::time::sleep(std::time::Duration::from_millis(200 * attempts as u64)).await;
    }
}
