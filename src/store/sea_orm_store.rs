use async_trait::async_trait;
use entity::{orders, sea_orm_active_enums::OrderStatus, users};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, TryInsertResult,
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{classify_untouched, CorrelationColumns, SettlementStore};
use crate::error::Result;
use crate::models::payment::{MembershipGrant, PaidTransition, ProviderCorrelation};
use crate::models::quota::QuotaSnapshot;

/// Postgres-backed store
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Insert a user row. Users are owned by the identity service, so this
    /// only serves fixtures.
    pub async fn insert_user(&self, user: users::Model) -> Result<()> {
        users::Entity::insert(user.into_active_model().reset_all())
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for SeaOrmStore {
    async fn insert_order(&self, order: &orders::Model) -> Result<bool> {
        let result = orders::Entity::insert(order.clone().into_active_model().reset_all())
            .on_conflict(
                OnConflict::column(orders::Column::OrderNo)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec_without_returning(&self.db)
            .await?;

        Ok(matches!(result, TryInsertResult::Inserted(rows) if rows > 0))
    }

    async fn find_order(&self, order_no: &str) -> Result<Option<orders::Model>> {
        Ok(orders::Entity::find()
            .filter(orders::Column::OrderNo.eq(order_no))
            .one(&self.db)
            .await?)
    }

    async fn find_user_order(
        &self,
        user_id: Uuid,
        order_no: &str,
    ) -> Result<Option<orders::Model>> {
        Ok(orders::Entity::find()
            .filter(orders::Column::OrderNo.eq(order_no))
            .filter(orders::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    async fn list_user_orders(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<orders::Model>, u64)> {
        let mut query = orders::Entity::find().filter(orders::Column::UserId.eq(user_id));
        if let Some(status) = status {
            query = query.filter(orders::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(orders::Column::CreatedAt)
            .paginate(&self.db, page_size.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((items, total))
    }

    async fn attach_prepay(&self, order_no: &str, prepay_id: &str, nonce_str: &str) -> Result<()> {
        orders::Entity::update_many()
            .col_expr(orders::Column::WechatPrepayId, Expr::value(prepay_id))
            .col_expr(orders::Column::WechatNonceStr, Expr::value(nonce_str))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(orders::Column::OrderNo.eq(order_no))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn transition_to_paid(
        &self,
        order_no: &str,
        correlation: &ProviderCorrelation,
        paid_at: OffsetDateTime,
    ) -> Result<PaidTransition> {
        let columns = CorrelationColumns::from(correlation);

        let mut update = orders::Entity::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(orders::Column::PaidAt, Expr::value(paid_at))
            .col_expr(orders::Column::UpdatedAt, Expr::value(paid_at));
        if let Some(transaction_id) = columns.wechat_transaction_id {
            update = update.col_expr(
                orders::Column::WechatTransactionId,
                Expr::value(transaction_id),
            );
        }
        if let Some(trade_no) = columns.alipay_trade_no {
            update = update.col_expr(orders::Column::AlipayTradeNo, Expr::value(trade_no));
        }
        if let Some(buyer_id) = columns.alipay_buyer_id {
            update = update.col_expr(orders::Column::AlipayBuyerId, Expr::value(buyer_id));
        }
        if let Some(buyer_logon_id) = columns.alipay_buyer_logon_id {
            update = update.col_expr(
                orders::Column::AlipayBuyerLogonId,
                Expr::value(buyer_logon_id),
            );
        }

        let mut updated = update
            .filter(orders::Column::OrderNo.eq(order_no))
            .filter(orders::Column::Status.eq(OrderStatus::Pending))
            .exec_with_returning(&self.db)
            .await?;

        if let Some(order) = updated.pop() {
            return Ok(PaidTransition::Transitioned(order));
        }

        Ok(classify_untouched(self.find_order(order_no).await?))
    }

    async fn purge_expired_orders(&self, now: OffsetDateTime) -> Result<u64> {
        let result = orders::Entity::delete_many()
            .filter(orders::Column::Status.eq(OrderStatus::Pending))
            .filter(orders::Column::ExpireAt.lt(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<users::Model>> {
        Ok(users::Entity::find_by_id(user_id).one(&self.db).await?)
    }

    async fn apply_membership(&self, user_id: Uuid, grant: &MembershipGrant) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::MembershipTier, Expr::value(grant.tier))
            .col_expr(
                users::Column::MembershipStartedAt,
                Expr::value(grant.started_at),
            )
            .col_expr(
                users::Column::MembershipExpiresAt,
                Expr::value(grant.expires_at),
            )
            .col_expr(users::Column::DailyTotal, Expr::value(grant.daily_total))
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn reset_quota_window(&self, user_id: Uuid, today: &str, total: i32) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::DailyDate, Expr::value(today))
            .col_expr(users::Column::DailyUsed, Expr::value(0))
            .col_expr(users::Column::DailyTotal, Expr::value(total))
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(users::Column::Id.eq(user_id))
            .filter(users::Column::DailyDate.ne(today))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn consume_quota(
        &self,
        user_id: Uuid,
        today: &str,
        limit: i32,
    ) -> Result<Option<QuotaSnapshot>> {
        let mut updated = users::Entity::update_many()
            .col_expr(
                users::Column::DailyUsed,
                Expr::col(users::Column::DailyUsed).add(1),
            )
            .col_expr(users::Column::DailyTotal, Expr::value(limit))
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(users::Column::Id.eq(user_id))
            .filter(users::Column::DailyDate.eq(today))
            .filter(users::Column::DailyUsed.lt(limit))
            .exec_with_returning(&self.db)
            .await?;

        Ok(updated
            .pop()
            .map(|user| QuotaSnapshot::new(user.daily_date, user.daily_used, user.daily_total)))
    }
}
