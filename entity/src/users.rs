use super::sea_orm_active_enums::MembershipTier;
use sea_orm::entity::prelude::*;

/// User row as seen by the settlement core.
///
/// Identity columns are owned by the auth collaborator; this core only
/// reads `wechat_openid` and mutates the membership and daily quota columns.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub phone: Option<String>,
    #[sea_orm(unique)]
    pub wechat_openid: Option<String>,

    pub membership_tier: MembershipTier,
    pub membership_started_at: Option<TimeDateTimeWithTimeZone>,
    pub membership_expires_at: Option<TimeDateTimeWithTimeZone>,

    /// Quota window key, `YYYY-MM-DD` in the configured quota time zone
    pub daily_date: String,
    pub daily_used: i32,
    pub daily_total: i32,

    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
