use entity::sea_orm_active_enums::MembershipTier;
use serde::Serialize;

use super::plan::PlanOffer;

/// Caller's membership state and the plans on sale
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipInfo {
    pub current_level: MembershipTier,
    pub is_valid: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<time::OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<time::OffsetDateTime>,
    pub daily_limit: i32,
    pub remaining_today: i32,
    pub plans: Vec<PlanOffer>,
}
