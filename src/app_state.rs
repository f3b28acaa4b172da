use crate::{
    config::Config,
    services::{
        gateway::Gateways, signature::AlipaySigner, JWTService, MembershipService, NotifyKeys,
        OrderService, QuotaCalendar, QuotaService, SettlementService,
    },
    store::{SeaOrmStore, SettlementStore},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SettlementStore>,
    pub jwt_service: Arc<JWTService>,
    pub order_service: Arc<OrderService>,
    pub membership_service: Arc<MembershipService>,
    pub quota_service: Arc<QuotaService>,
    pub settlement_service: Arc<SettlementService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;
        let store: Arc<dyn SettlementStore> = Arc::new(SeaOrmStore::new(db));

        let signer = AlipaySigner::from_keys(
            &config.payment.alipay.private_key,
            &config.payment.alipay.public_key,
        )?;
        let gateways = Gateways::from_config(&config.payment, signer.clone())?;

        Self::with_store(config, store, gateways, signer)
    }

    /// Wire services over an existing store and gateway set.
    /// `alipay` verifies notifications and must hold the configured keys.
    pub fn with_store(
        config: Config,
        store: Arc<dyn SettlementStore>,
        gateways: Gateways,
        alipay: AlipaySigner,
    ) -> Result<Self, anyhow::Error> {
        let calendar = QuotaCalendar::from_config(&config.quota)?;
        let catalog = &config.membership;

        let order_service = Arc::new(OrderService::new(
            store.clone(),
            catalog,
            &config.orders,
            calendar.offset(),
        ));
        let membership_service =
            Arc::new(MembershipService::new(store.clone(), catalog, calendar));
        let quota_service = Arc::new(QuotaService::new(store.clone(), catalog, calendar));
        let keys = NotifyKeys {
            wechat_app_id: config.payment.wechat.app_id.clone(),
            wechat_api_key: config.payment.wechat.api_key.clone(),
            alipay_app_id: config.payment.alipay.app_id.clone(),
            alipay,
        };
        let settlement_service = Arc::new(SettlementService::new(
            store.clone(),
            order_service.clone(),
            membership_service.clone(),
            gateways,
            keys,
            catalog,
            &config.settlement,
        ));

        Ok(Self {
            store,
            jwt_service: Arc::new(JWTService::new(&config.auth)),
            order_service,
            membership_service,
            quota_service,
            settlement_service,
            config: Arc::new(config),
        })
    }
}
