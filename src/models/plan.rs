//! Membership plan catalog
//!
//! Prices, durations and daily generation limits for every tier. The catalog is
//! loaded from configuration and handed to the services that need it, so tests
//! and deployments can run with different price tables side by side.

use entity::sea_orm_active_enums::{MembershipTier, PlanType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PlanCatalog {
    pub free: FreeTier,
    pub monthly: PaidPlan,
    pub yearly: PaidPlan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreeTier {
    pub display_name: String,
    pub daily_limit: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaidPlan {
    pub display_name: String,
    /// Price in yuan, two decimal places
    pub price: Decimal,
    pub duration_days: i64,
    pub daily_limit: i32,
    #[serde(default)]
    pub features: Vec<String>,
}

impl PlanCatalog {
    pub fn plan(&self, plan_type: PlanType) -> &PaidPlan {
        match plan_type {
            PlanType::Monthly => &self.monthly,
            PlanType::Yearly => &self.yearly,
        }
    }

    /// Configured daily limit of a tier, ignoring expiry
    pub fn daily_limit(&self, tier: MembershipTier) -> i32 {
        match tier {
            MembershipTier::Free => self.free.daily_limit,
            MembershipTier::Monthly => self.monthly.daily_limit,
            MembershipTier::Yearly => self.yearly.daily_limit,
        }
    }

    /// Order subject shown on the provider's checkout page
    pub fn subject(&self, plan_type: PlanType) -> String {
        format!("Tunee {}", self.plan(plan_type).display_name)
    }

    pub fn offers(&self) -> Vec<PlanOffer> {
        [PlanType::Monthly, PlanType::Yearly]
            .into_iter()
            .map(|plan_type| {
                let plan = self.plan(plan_type);
                PlanOffer {
                    r#type: plan_type,
                    name: plan.display_name.clone(),
                    price: plan.price,
                    duration: plan.duration_days,
                    daily_limit: plan.daily_limit,
                    features: plan.features.clone(),
                }
            })
            .collect()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            free: FreeTier {
                display_name: "免费会员".to_string(),
                daily_limit: 3,
            },
            monthly: PaidPlan {
                display_name: "月卡会员".to_string(),
                price: Decimal::new(1990, 2),
                duration_days: 30,
                daily_limit: 50,
                features: vec![
                    "每日50首音乐生成".to_string(),
                    "优先处理队列".to_string(),
                    "高清音质下载".to_string(),
                ],
            },
            yearly: PaidPlan {
                display_name: "年卡会员".to_string(),
                price: Decimal::new(19900, 2),
                duration_days: 365,
                daily_limit: 50,
                features: vec![
                    "每日50首音乐生成".to_string(),
                    "优先处理队列".to_string(),
                    "高清音质下载".to_string(),
                    "专属客服支持".to_string(),
                ],
            },
        }
    }
}

/// Purchasable plan as presented to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOffer {
    pub r#type: PlanType,
    pub name: String,
    pub price: Decimal,
    pub duration: i64,
    pub daily_limit: i32,
    pub features: Vec<String>,
}
