use async_trait::async_trait;
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, instrument};

use super::{beijing_time, http_client, nonce_str, post_with_retry, to_cents, PaymentGateway};
use crate::{
    config::{GatewayConfig, WechatPayConfig},
    error::{ApiError, Result},
    models::payment::{
        CreatedPayment, GatewayOrderRequest, PayParams, ProviderCorrelation, ReportedAmount,
        TradeState, WechatPayParams,
    },
    services::{
        codec::{parse_wechat_xml, to_wechat_xml, Params},
        signature::{wechat_sign, wechat_verify},
    },
};

const PROVIDER: &str = "WeChat Pay";
const ORDER_NOT_EXIST: &str = "ORDERNOTEXIST";

/// WeChat Pay v2 (XML + MD5) client for JSAPI payments
pub struct WechatPayClient {
    http: reqwest::Client,
    config: WechatPayConfig,
    retry_attempts: u8,
}

impl WechatPayClient {
    pub fn new(config: &WechatPayConfig, gateway: &GatewayConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(gateway.request_timeout_ms)?,
            config: config.clone(),
            retry_attempts: gateway.retry_attempts,
        })
    }

    fn base_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("appid".to_string(), self.config.app_id.clone());
        params.insert("mch_id".to_string(), self.config.mch_id.clone());
        params.insert("nonce_str".to_string(), nonce_str());
        params
    }

    /// Sign, send, and check the transport-level `return_code`
    async fn call(&self, url: &str, mut params: Params) -> Result<Params> {
        let sign = wechat_sign(&params, &self.config.api_key);
        params.insert("sign".to_string(), sign);

        let body = post_with_retry(
            &self.http,
            PROVIDER,
            url,
            "text/xml",
            to_wechat_xml(&params),
            self.retry_attempts,
        )
        .await?;
        let response = parse_wechat_xml(&body)
            .map_err(|e| ApiError::Upstream(format!("{} response: {}", PROVIDER, e)))?;

        if field(&response, "return_code") != Some("SUCCESS") {
            return Err(ApiError::Upstream(format!(
                "{}: {}",
                PROVIDER,
                field(&response, "return_msg").unwrap_or("request rejected")
            )));
        }
        if let Some(sign) = field(&response, "sign") {
            if !wechat_verify(&response, &self.config.api_key, sign) {
                return Err(ApiError::Upstream(format!(
                    "{} response signature mismatch",
                    PROVIDER
                )));
            }
        }

        Ok(response)
    }

    /// Parameters for `WeixinJSBridge` `getBrandWCPayRequest`
    pub fn pay_params(&self, prepay_id: &str) -> WechatPayParams {
        let mut params = Params::new();
        params.insert("appId".to_string(), self.config.app_id.clone());
        params.insert(
            "timeStamp".to_string(),
            OffsetDateTime::now_utc().unix_timestamp().to_string(),
        );
        params.insert("nonceStr".to_string(), nonce_str());
        params.insert("package".to_string(), format!("prepay_id={}", prepay_id));
        params.insert("signType".to_string(), "MD5".to_string());
        let pay_sign = wechat_sign(&params, &self.config.api_key);

        let mut take = |key: &str| params.remove(key).unwrap_or_default();
        WechatPayParams {
            app_id: take("appId"),
            time_stamp: take("timeStamp"),
            nonce_str: take("nonceStr"),
            package: take("package"),
            sign_type: take("signType"),
            pay_sign,
        }
    }
}

/// `yyyyMMddHHmmss`, the unified order's expiry format
fn time_expire(at: OffsetDateTime) -> Result<String> {
    beijing_time(at)
        .format(format_description!(
            "[year][month][day][hour][minute][second]"
        ))
        .map_err(|e| ApiError::Internal(e.into()))
}

fn field<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

#[async_trait]
impl PaymentGateway for WechatPayClient {
    #[instrument(skip(self, request), fields(order_no = %request.order_no))]
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<CreatedPayment> {
        let openid = request
            .openid
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("Bind a WeChat account first".to_string()))?;
        let total_fee = to_cents(request.amount)
            .ok_or_else(|| ApiError::BadRequest("Order amount out of range".to_string()))?;

        let mut params = self.base_params();
        params.insert("body".to_string(), request.subject.clone());
        params.insert("out_trade_no".to_string(), request.order_no.clone());
        params.insert("total_fee".to_string(), total_fee.to_string());
        params.insert("spbill_create_ip".to_string(), request.client_ip.clone());
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        params.insert("trade_type".to_string(), "JSAPI".to_string());
        params.insert("openid".to_string(), openid.to_string());
        params.insert("time_expire".to_string(), time_expire(request.expire_at)?);
        let nonce = params.get("nonce_str").cloned().unwrap_or_default();

        let response = self.call(&self.config.unified_order_url, params).await?;

        if field(&response, "result_code") != Some("SUCCESS") {
            return Err(ApiError::Upstream(format!(
                "{} unified order failed: {}",
                PROVIDER,
                field(&response, "err_code_des")
                    .or_else(|| field(&response, "err_code"))
                    .unwrap_or("unknown error")
            )));
        }
        let prepay_id = field(&response, "prepay_id")
            .ok_or_else(|| ApiError::Upstream(format!("{} returned no prepay_id", PROVIDER)))?
            .to_string();

        info!(prepay_id = %prepay_id, "WeChat unified order created");
        Ok(CreatedPayment {
            params: PayParams::Wechat(self.pay_params(&prepay_id)),
            prepay_id: Some(prepay_id),
            nonce_str: Some(nonce),
        })
    }

    #[instrument(skip(self))]
    async fn query_order(&self, order_no: &str) -> Result<TradeState> {
        let mut params = self.base_params();
        params.insert("out_trade_no".to_string(), order_no.to_string());

        let response = self.call(&self.config.order_query_url, params).await?;

        if field(&response, "result_code") != Some("SUCCESS") {
            return match field(&response, "err_code") {
                Some(ORDER_NOT_EXIST) => Ok(TradeState::Unpaid(ORDER_NOT_EXIST.to_string())),
                other => Err(ApiError::Upstream(format!(
                    "{} order query failed: {}",
                    PROVIDER,
                    field(&response, "err_code_des")
                        .or(other)
                        .unwrap_or("unknown error")
                ))),
            };
        }

        match field(&response, "trade_state") {
            Some("SUCCESS") => {
                let transaction_id = field(&response, "transaction_id").ok_or_else(|| {
                    ApiError::Upstream(format!("{} paid trade without transaction_id", PROVIDER))
                })?;
                Ok(TradeState::Paid {
                    correlation: ProviderCorrelation::Wechat {
                        transaction_id: transaction_id.to_string(),
                    },
                    amount: field(&response, "total_fee")
                        .and_then(|fee| fee.parse().ok())
                        .map(ReportedAmount::Cents),
                })
            }
            state => Ok(TradeState::Unpaid(state.unwrap_or("UNKNOWN").to_string())),
        }
    }
}
