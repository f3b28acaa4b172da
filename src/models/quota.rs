use entity::sea_orm_active_enums::MembershipTier;
use serde::Serialize;

/// Daily generation counter as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// Window key, `YYYY-MM-DD` in the quota time zone
    pub date: String,
    pub used: i32,
    pub remaining: i32,
    pub total: i32,
}

impl QuotaSnapshot {
    pub fn new(date: String, used: i32, total: i32) -> Self {
        Self {
            date,
            used,
            remaining: (total - used).max(0),
            total,
        }
    }
}

/// Quota endpoint payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaOverview {
    pub date: String,
    pub daily_limit: i32,
    pub used_today: i32,
    pub remaining_today: i32,
    pub membership: MembershipStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStatus {
    pub level: MembershipTier,
    pub is_valid: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<time::OffsetDateTime>,
}
