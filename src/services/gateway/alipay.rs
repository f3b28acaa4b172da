use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, instrument};

use super::{beijing_time, http_client, post_with_retry, PaymentGateway};
use crate::{
    config::{AlipayConfig, GatewayConfig},
    error::{ApiError, Result},
    models::payment::{
        CreatedPayment, GatewayOrderRequest, PayParams, ProviderCorrelation, ReportedAmount,
        TradeState,
    },
    services::{codec::Params, signature::AlipaySigner},
};

const PROVIDER: &str = "Alipay";
const TRADE_NOT_EXIST: &str = "ACQ.TRADE_NOT_EXIST";

/// Alipay open platform client (RSA2)
pub struct AlipayClient {
    http: reqwest::Client,
    config: AlipayConfig,
    signer: AlipaySigner,
    retry_attempts: u8,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    alipay_trade_query_response: QueryResponse,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    code: String,
    msg: Option<String>,
    sub_code: Option<String>,
    sub_msg: Option<String>,
    trade_no: Option<String>,
    trade_status: Option<String>,
    total_amount: Option<String>,
    buyer_user_id: Option<String>,
    buyer_logon_id: Option<String>,
}

impl AlipayClient {
    pub fn new(
        config: &AlipayConfig,
        gateway: &GatewayConfig,
        signer: AlipaySigner,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(gateway.request_timeout_ms)?,
            config: config.clone(),
            signer,
            retry_attempts: gateway.retry_attempts,
        })
    }

    /// Public request parameters shared by every API method
    fn signed_request(&self, method: &str, biz_content: serde_json::Value) -> Result<Params> {
        let timestamp = wall_clock(OffsetDateTime::now_utc())?;

        let mut params = Params::new();
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("method".to_string(), method.to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        params.insert("sign_type".to_string(), "RSA2".to_string());
        params.insert("timestamp".to_string(), timestamp);
        params.insert("version".to_string(), "1.0".to_string());
        params.insert("biz_content".to_string(), biz_content.to_string());
        if method == "alipay.trade.app.pay" {
            params.insert("notify_url".to_string(), self.config.notify_url.clone());
        }

        let sign = self.signer.sign(&params)?;
        params.insert("sign".to_string(), sign);
        Ok(params)
    }
}

fn wall_clock(at: OffsetDateTime) -> Result<String> {
    beijing_time(at)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .map_err(|e| ApiError::Internal(e.into()))
}

fn encode(params: &Params) -> Result<String> {
    serde_urlencoded::to_string(params).map_err(|e| ApiError::Internal(e.into()))
}

#[async_trait]
impl PaymentGateway for AlipayClient {
    /// App payments need no server round trip: the signed order string is
    /// handed to the Alipay SDK on the device.
    #[instrument(skip(self, request), fields(order_no = %request.order_no))]
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<CreatedPayment> {
        let biz_content = json!({
            "out_trade_no": request.order_no,
            "total_amount": format!("{:.2}", request.amount),
            "subject": request.subject,
            "product_code": "QUICK_MSECURITY_PAY",
            "time_expire": wall_clock(request.expire_at)?,
        });
        let order_string = encode(&self.signed_request("alipay.trade.app.pay", biz_content)?)?;

        info!("Alipay order string signed");
        Ok(CreatedPayment {
            params: PayParams::Alipay(order_string),
            prepay_id: None,
            nonce_str: None,
        })
    }

    #[instrument(skip(self))]
    async fn query_order(&self, order_no: &str) -> Result<TradeState> {
        let params = self.signed_request(
            "alipay.trade.query",
            json!({ "out_trade_no": order_no }),
        )?;

        let body = post_with_retry(
            &self.http,
            PROVIDER,
            &self.config.gateway_url,
            "application/x-www-form-urlencoded;charset=utf-8",
            encode(&params)?,
            self.retry_attempts,
        )
        .await?;
        let response = serde_json::from_str::<QueryEnvelope>(&body)
            .map_err(|e| ApiError::Upstream(format!("{} response: {}", PROVIDER, e)))?
            .alipay_trade_query_response;

        if response.code != "10000" {
            if response.sub_code.as_deref() == Some(TRADE_NOT_EXIST) {
                return Ok(TradeState::Unpaid(TRADE_NOT_EXIST.to_string()));
            }
            return Err(ApiError::Upstream(format!(
                "{} trade query failed: {}",
                PROVIDER,
                response
                    .sub_msg
                    .or(response.msg)
                    .unwrap_or_else(|| response.code.clone())
            )));
        }

        match response.trade_status.as_deref() {
            Some("TRADE_SUCCESS") | Some("TRADE_FINISHED") => {
                let trade_no = response.trade_no.ok_or_else(|| {
                    ApiError::Upstream(format!("{} paid trade without trade_no", PROVIDER))
                })?;
                Ok(TradeState::Paid {
                    correlation: ProviderCorrelation::Alipay {
                        trade_no,
                        buyer_id: response.buyer_user_id,
                        buyer_logon_id: response.buyer_logon_id,
                    },
                    amount: response
                        .total_amount
                        .and_then(|amount| amount.parse::<Decimal>().ok())
                        .map(ReportedAmount::Decimal),
                })
            }
            state => Ok(TradeState::Unpaid(state.unwrap_or("UNKNOWN").to_string())),
        }
    }
}
