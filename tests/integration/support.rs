use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use entity::{
    orders,
    sea_orm_active_enums::{MembershipTier, OrderStatus, PaymentMethod, PlanType},
    users,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use rsa::{
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
    RsaPrivateKey,
};
use time::{Duration, OffsetDateTime};
use tunee_backend::{
    config::{
        AlipayConfig, AuthConfig, Config, DatabaseConfig, GatewayConfig, OrdersConfig,
        PaymentConfig, QuotaConfig, ServerConfig, SettlementConfig, WechatPayConfig,
    },
    error::Result,
    models::{
        payment::{CreatedPayment, GatewayOrderRequest, PayParams, TradeState, WechatPayParams},
        plan::PlanCatalog,
    },
    services::{
        codec::{to_wechat_xml, Params},
        gateway::{Gateways, PaymentGateway},
        jwt_service::Claims,
        signature::{wechat_sign, AlipaySigner},
    },
    store::{MemoryStore, SettlementStore},
    AppState,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret-with-at-least-32-characters";
pub const WECHAT_APP_ID: &str = "wx2421b1c4370ec43b";
pub const WECHAT_MCH_ID: &str = "1900000109";
pub const WECHAT_API_KEY: &str = "192006250b4c09247ec02edce69f6a2d";
pub const ALIPAY_APP_ID: &str = "2021000000000001";

struct TestKeys {
    private_pem: String,
    public_pem: String,
}

/// One RSA keypair per test binary; it stands in for both the merchant key
/// and the Alipay platform key.
fn keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        TestKeys {
            private_pem: private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public_pem: private
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .unwrap(),
        }
    })
}

pub fn alipay_signer() -> AlipaySigner {
    AlipaySigner::from_keys(&keys().private_pem, &keys().public_pem).unwrap()
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
        },
        payment: PaymentConfig {
            wechat: WechatPayConfig {
                app_id: WECHAT_APP_ID.to_string(),
                mch_id: WECHAT_MCH_ID.to_string(),
                api_key: WECHAT_API_KEY.to_string(),
                notify_url: "https://api.example.com/api/payment/wechat/notify".to_string(),
                unified_order_url: "http://127.0.0.1:9/pay/unifiedorder".to_string(),
                order_query_url: "http://127.0.0.1:9/pay/orderquery".to_string(),
            },
            alipay: AlipayConfig {
                app_id: ALIPAY_APP_ID.to_string(),
                private_key: keys().private_pem.clone(),
                public_key: keys().public_pem.clone(),
                notify_url: "https://api.example.com/api/payment/alipay/notify".to_string(),
                gateway_url: "http://127.0.0.1:9/gateway.do".to_string(),
            },
            gateway: GatewayConfig {
                request_timeout_ms: 2_000,
                retry_attempts: 1,
            },
        },
        membership: PlanCatalog::default(),
        orders: OrdersConfig::default(),
        quota: QuotaConfig::default(),
        settlement: SettlementConfig::default(),
    }
}

/// Provider double: records checkouts and answers queries with a preset state
pub struct FakeGateway {
    method: PaymentMethod,
    trade: Mutex<TradeState>,
    created: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            trade: Mutex::new(TradeState::Unpaid("NOTPAY".to_string())),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn set_trade(&self, state: TradeState) {
        *self.trade.lock().unwrap() = state;
    }

    pub fn created_orders(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<CreatedPayment> {
        self.created.lock().unwrap().push(request.order_no.clone());

        Ok(match self.method {
            PaymentMethod::Wechat => CreatedPayment {
                params: PayParams::Wechat(WechatPayParams {
                    app_id: WECHAT_APP_ID.to_string(),
                    time_stamp: "1700000000".to_string(),
                    nonce_str: "fakenonce".to_string(),
                    package: format!("prepay_id=wx_prepay_{}", request.order_no),
                    sign_type: "MD5".to_string(),
                    pay_sign: "FAKESIGN".to_string(),
                }),
                prepay_id: Some(format!("wx_prepay_{}", request.order_no)),
                nonce_str: Some("fakenonce".to_string()),
            },
            PaymentMethod::Alipay => CreatedPayment {
                params: PayParams::Alipay(format!("out_trade_no={}", request.order_no)),
                prepay_id: None,
                nonce_str: None,
            },
        })
    }

    async fn query_order(&self, _order_no: &str) -> Result<TradeState> {
        Ok(self.trade.lock().unwrap().clone())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    pub wechat: Arc<FakeGateway>,
    pub alipay: Arc<FakeGateway>,
}

pub fn test_app() -> TestApp {
    test_app_with(test_config())
}

pub fn test_app_with(config: Config) -> TestApp {
    let store = MemoryStore::new();
    let wechat = Arc::new(FakeGateway::new(PaymentMethod::Wechat));
    let alipay = Arc::new(FakeGateway::new(PaymentMethod::Alipay));
    let gateways = Gateways {
        wechat: wechat.clone(),
        alipay: alipay.clone(),
    };
    let shared: Arc<dyn SettlementStore> = Arc::new(store.clone());
    let state = AppState::with_store(config, shared, gateways, alipay_signer()).unwrap();

    TestApp {
        state,
        store,
        wechat,
        alipay,
    }
}

pub fn free_user(openid: Option<&str>) -> users::Model {
    let now = OffsetDateTime::now_utc();
    users::Model {
        id: Uuid::new_v4(),
        phone: None,
        wechat_openid: openid.map(str::to_string),
        membership_tier: MembershipTier::Free,
        membership_started_at: None,
        membership_expires_at: None,
        daily_date: String::new(),
        daily_used: 0,
        daily_total: 3,
        created_at: now,
        updated_at: now,
    }
}

/// Seed a free user and return its id
pub fn seed_user(store: &MemoryStore, openid: Option<&str>) -> Uuid {
    let user = free_user(openid);
    let id = user.id;
    store.upsert_user(user);
    id
}

pub fn pending_order(
    order_no: &str,
    user_id: Uuid,
    plan: PlanType,
    method: PaymentMethod,
) -> orders::Model {
    let now = OffsetDateTime::now_utc();
    orders::Model {
        id: Uuid::new_v4(),
        order_no: order_no.to_string(),
        user_id,
        plan_type: plan,
        amount: PlanCatalog::default().plan(plan).price,
        payment_method: method,
        status: OrderStatus::Pending,
        wechat_prepay_id: None,
        wechat_nonce_str: None,
        wechat_transaction_id: None,
        alipay_trade_no: None,
        alipay_buyer_id: None,
        alipay_buyer_logon_id: None,
        paid_at: None,
        expire_at: now + Duration::minutes(30),
        refund_amount: None,
        refund_reason: None,
        refund_no: None,
        refunded_at: None,
        client_ip: Some("127.0.0.1".to_string()),
        client_user_agent: None,
        client_device: None,
        remark: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn bearer_token(user_id: Uuid) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 900,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Successful WeChat payment notification fields, unsigned
pub fn wechat_paid_params(order_no: &str, transaction_id: &str, total_fee: i64) -> Params {
    let total_fee = total_fee.to_string();
    params(&[
        ("appid", WECHAT_APP_ID),
        ("mch_id", WECHAT_MCH_ID),
        ("nonce_str", "5K8264ILTKCH16CQ2502SI8ZNMTM67VS"),
        ("return_code", "SUCCESS"),
        ("result_code", "SUCCESS"),
        ("openid", "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"),
        ("trade_type", "JSAPI"),
        ("bank_type", "CFT"),
        ("out_trade_no", order_no),
        ("transaction_id", transaction_id),
        ("total_fee", &total_fee),
        ("time_end", "20250101120000"),
    ])
}

pub fn signed_wechat_xml(mut params: Params) -> String {
    let sign = wechat_sign(&params, WECHAT_API_KEY);
    params.insert("sign".to_string(), sign);
    to_wechat_xml(&params)
}

/// Alipay asynchronous notification fields, unsigned
pub fn alipay_paid_params(order_no: &str, trade_no: &str, total_amount: &str) -> Params {
    params(&[
        ("app_id", ALIPAY_APP_ID),
        ("charset", "utf-8"),
        ("notify_id", "ac05099524730693a8b330c5ecf72da9786"),
        ("notify_type", "trade_status_sync"),
        ("notify_time", "2025-01-01 12:00:00"),
        ("out_trade_no", order_no),
        ("trade_no", trade_no),
        ("trade_status", "TRADE_SUCCESS"),
        ("total_amount", total_amount),
        ("buyer_id", "2088102122524333"),
        ("buyer_logon_id", "159****5620"),
        ("version", "1.0"),
    ])
}

pub fn signed_alipay_form(mut params: Params) -> String {
    let sign = alipay_signer().sign(&params).unwrap();
    params.insert("sign".to_string(), sign);
    params.insert("sign_type".to_string(), "RSA2".to_string());
    serde_urlencoded::to_string(&params).unwrap()
}
