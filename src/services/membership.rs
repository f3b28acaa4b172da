//! Membership ledger rules.
//!
//! The ledger lives on the user row. Reads apply the rules below; the only
//! write is `upgrade`, driven by a paid order.

use std::sync::Arc;

use entity::{
    sea_orm_active_enums::{MembershipTier, PlanType},
    users,
};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{ApiError, Result},
    models::{membership::MembershipInfo, payment::MembershipGrant, plan::PlanCatalog},
    services::quota_service::QuotaCalendar,
    store::SettlementStore,
};

/// `free` is always valid; paid tiers only until `membership_expires_at`.
pub fn is_valid(user: &users::Model, now: OffsetDateTime) -> bool {
    match user.membership_tier {
        MembershipTier::Free => true,
        _ => user
            .membership_expires_at
            .is_some_and(|expires_at| expires_at > now),
    }
}

/// Daily limit of the tier in effect at `now`; a lapsed paid tier counts as free
pub fn effective_daily_limit(
    user: &users::Model,
    catalog: &PlanCatalog,
    now: OffsetDateTime,
) -> i32 {
    if is_valid(user, now) {
        catalog.daily_limit(user.membership_tier)
    } else {
        catalog.daily_limit(MembershipTier::Free)
    }
}

/// Membership state after buying `plan` at `now`. Renewals restart from `now`.
pub fn grant_for(plan: PlanType, catalog: &PlanCatalog, now: OffsetDateTime) -> MembershipGrant {
    let paid = catalog.plan(plan);
    MembershipGrant {
        tier: plan.into(),
        started_at: now,
        expires_at: now + Duration::days(paid.duration_days),
        daily_total: paid.daily_limit,
    }
}

pub struct MembershipService {
    store: Arc<dyn SettlementStore>,
    catalog: PlanCatalog,
    calendar: QuotaCalendar,
}

impl MembershipService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        catalog: &PlanCatalog,
        calendar: QuotaCalendar,
    ) -> Self {
        Self {
            store,
            catalog: catalog.clone(),
            calendar,
        }
    }

    /// Apply the plan bought by `user_id`, starting at the order's `paid_at`.
    /// Callers must hold a freshly paid order.
    #[instrument(skip(self))]
    pub async fn upgrade(
        &self,
        user_id: Uuid,
        plan: PlanType,
        paid_at: OffsetDateTime,
    ) -> Result<MembershipGrant> {
        let grant = grant_for(plan, &self.catalog, paid_at);

        if !self.store.apply_membership(user_id, &grant).await? {
            return Err(ApiError::NotFound(format!("User {} not found", user_id)));
        }

        info!(
            user_id = %user_id,
            tier = grant.tier.as_str(),
            expires_at = %grant.expires_at,
            "Membership upgraded"
        );
        Ok(grant)
    }

    #[instrument(skip(self))]
    pub async fn get_info(&self, user_id: Uuid) -> Result<MembershipInfo> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let now = OffsetDateTime::now_utc();
        let daily_limit = effective_daily_limit(&user, &self.catalog, now);
        // A stale window has not been touched today
        let used_today = if user.daily_date == self.calendar.today() {
            user.daily_used
        } else {
            0
        };

        Ok(MembershipInfo {
            current_level: user.membership_tier,
            is_valid: is_valid(&user, now),
            expires_at: user.membership_expires_at,
            started_at: user.membership_started_at,
            daily_limit,
            remaining_today: (daily_limit - used_today).max(0),
            plans: self.catalog.offers(),
        })
    }
}
