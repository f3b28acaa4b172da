use serde::Deserialize;

use crate::models::plan::PlanCatalog;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    #[serde(default)]
    pub membership: PlanCatalog,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Access tokens are minted by the identity service; this process only verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub wechat: WechatPayConfig,
    pub alipay: AlipayConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WechatPayConfig {
    pub app_id: String,
    pub mch_id: String,
    /// Merchant API key, the shared secret for MD5 signatures
    pub api_key: String,
    pub notify_url: String,
    #[serde(default = "default_wechat_unified_order_url")]
    pub unified_order_url: String,
    #[serde(default = "default_wechat_order_query_url")]
    pub order_query_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlipayConfig {
    pub app_id: String,
    /// Merchant RSA private key (PKCS#8 or PKCS#1, PEM or bare base64)
    pub private_key: String,
    /// Alipay platform RSA public key (SPKI or PKCS#1, PEM or bare base64)
    pub public_key: String,
    pub notify_url: String,
    #[serde(default = "default_alipay_gateway_url")]
    pub gateway_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub request_timeout_ms: u64,
    /// Extra attempts after the first one, transport failures only
    pub retry_attempts: u8,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            retry_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    pub order_no_prefix: String,
    pub pending_ttl_minutes: i64,
    pub expiry_sweep_interval_secs: u64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            order_no_prefix: "TN".to_string(),
            pending_ttl_minutes: 30,
            expiry_sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Daily windows roll over at local midnight of this fixed UTC offset
    pub utc_offset_hours: i8,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettlementConfig {
    /// Re-check the provider-reported amount when a poll finds a paid trade.
    /// Webhooks always check it.
    #[serde(default)]
    pub revalidate_amount_on_poll: bool,
}

fn default_wechat_unified_order_url() -> String {
    "https://api.mch.weixin.qq.com/pay/unifiedorder".to_string()
}

fn default_wechat_order_query_url() -> String {
    "https://api.mch.weixin.qq.com/pay/orderquery".to_string()
}

fn default_alipay_gateway_url() -> String {
    "https://openapi.alipay.com/gateway.do".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("TUNEE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
