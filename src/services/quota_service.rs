use std::sync::Arc;

use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    config::QuotaConfig,
    error::{ApiError, Result},
    models::{
        plan::PlanCatalog,
        quota::{MembershipStatus, QuotaOverview, QuotaSnapshot},
    },
    services::membership,
    store::SettlementStore,
};

/// Maps instants onto daily quota windows at a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct QuotaCalendar {
    offset: UtcOffset,
}

impl QuotaCalendar {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn from_config(
        config: &QuotaConfig,
    ) -> std::result::Result<Self, time::error::ComponentRange> {
        Ok(Self::new(UtcOffset::from_hms(config.utc_offset_hours, 0, 0)?))
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Window key for `at`, formatted `YYYY-MM-DD`
    pub fn date_key(&self, at: OffsetDateTime) -> String {
        let local = at.to_offset(self.offset).date();
        format!(
            "{:04}-{:02}-{:02}",
            local.year(),
            u8::from(local.month()),
            local.day()
        )
    }

    pub fn today(&self) -> String {
        self.date_key(OffsetDateTime::now_utc())
    }
}

pub struct QuotaService {
    store: Arc<dyn SettlementStore>,
    catalog: PlanCatalog,
    calendar: QuotaCalendar,
}

impl QuotaService {
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

    /// Current window for a user, rolling it over first if the day changed
    #[instrument(skip(self))]
    pub async fn get_quota(&self, user_id: Uuid) -> Result<QuotaOverview> {
        let now = OffsetDateTime::now_utc();
        let today = self.calendar.date_key(now);
        let user = self.load_user(user_id).await?;
        let limit = membership::effective_daily_limit(&user, &self.catalog, now);

        let used = if user.daily_date == today {
            user.daily_used
        } else {
            self.store.reset_quota_window(user_id, &today, limit).await?;
            debug!(user_id = %user_id, date = %today, "Quota window rolled over");
            0
        };
        let snapshot = QuotaSnapshot::new(today, used, limit);

        Ok(QuotaOverview {
            date: snapshot.date,
            daily_limit: snapshot.total,
            used_today: snapshot.used,
            remaining_today: snapshot.remaining,
            membership: MembershipStatus {
                level: user.membership_tier,
                is_valid: membership::is_valid(&user, now),
                expires_at: user.membership_expires_at,
            },
        })
    }

    /// Whether at least one generation is left today
    #[instrument(skip(self))]
    pub async fn has_remaining(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.get_quota(user_id).await?.remaining_today > 0)
    }

    /// Take one generation slot. Fails with `QuotaExhausted` when the window is full.
    ///
    /// The final step is a single conditional update on `used < limit`, so
    /// concurrent callers can never oversubscribe the window.
    #[instrument(skip(self))]
    pub async fn consume_one(&self, user_id: Uuid) -> Result<QuotaSnapshot> {
        let now = OffsetDateTime::now_utc();
        let today = self.calendar.date_key(now);
        let user = self.load_user(user_id).await?;
        let limit = membership::effective_daily_limit(&user, &self.catalog, now);

        if user.daily_date != today {
            // Losing this race is fine: someone else opened the same window
            self.store.reset_quota_window(user_id, &today, limit).await?;
        }

        match self.store.consume_quota(user_id, &today, limit).await? {
            Some(snapshot) => {
                info!(
                    user_id = %user_id,
                    used = snapshot.used,
                    total = snapshot.total,
                    "Generation quota consumed"
                );
                Ok(snapshot)
            }
            None => Err(ApiError::QuotaExhausted(format!(
                "Daily generation limit of {} reached, upgrade your membership for more",
                limit
            ))),
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<entity::users::Model> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }
}
