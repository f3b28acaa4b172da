use super::sea_orm_active_enums::{OrderStatus, PaymentMethod, PlanType};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_no: String,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,

    // WeChat Pay correlation
    pub wechat_prepay_id: Option<String>,
    pub wechat_nonce_str: Option<String>,
    pub wechat_transaction_id: Option<String>,

    // Alipay correlation
    pub alipay_trade_no: Option<String>,
    pub alipay_buyer_id: Option<String>,
    pub alipay_buyer_logon_id: Option<String>,

    pub paid_at: Option<TimeDateTimeWithTimeZone>,
    pub expire_at: TimeDateTimeWithTimeZone,

    // Refund block, written by back-office tooling only
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub refund_amount: Option<Decimal>,
    pub refund_reason: Option<String>,
    pub refund_no: Option<String>,
    pub refunded_at: Option<TimeDateTimeWithTimeZone>,

    pub client_ip: Option<String>,
    pub client_user_agent: Option<String>,
    pub client_device: Option<String>,
    pub remark: Option<String>,

    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
