use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250101_000001_create_users_table::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_uuid(Orders::Id))
                    .col(string_len(Orders::OrderNo, 32).not_null().unique_key())
                    .col(uuid(Orders::UserId).not_null())
                    .col(string_len(Orders::PlanType, 16).not_null())
                    .col(decimal_len(Orders::Amount, 10, 2).not_null())
                    .col(string_len(Orders::PaymentMethod, 16).not_null())
                    .col(
                        string_len(Orders::Status, 16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(string_null(Orders::WechatPrepayId))
                    .col(string_null(Orders::WechatNonceStr))
                    .col(string_null(Orders::WechatTransactionId))
                    .col(string_null(Orders::AlipayTradeNo))
                    .col(string_null(Orders::AlipayBuyerId))
                    .col(string_null(Orders::AlipayBuyerLogonId))
                    .col(timestamp_with_time_zone_null(Orders::PaidAt))
                    .col(timestamp_with_time_zone(Orders::ExpireAt).not_null())
                    .col(decimal_len_null(Orders::RefundAmount, 10, 2))
                    .col(string_null(Orders::RefundReason))
                    .col(string_null(Orders::RefundNo))
                    .col(timestamp_with_time_zone_null(Orders::RefundedAt))
                    .col(string_null(Orders::ClientIp))
                    .col(string_null(Orders::ClientUserAgent))
                    .col(string_null(Orders::ClientDevice))
                    .col(string_null(Orders::Remark))
                    .col(
                        timestamp_with_time_zone(Orders::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Orders::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_user_id")
                            .from(Orders::Table, Orders::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_status")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_created_at")
                    .table(Orders::Table)
                    .col(Orders::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Serves the pending-order expiry sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status_expire_at")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .col(Orders::ExpireAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    OrderNo,
    UserId,
    PlanType,
    Amount,
    PaymentMethod,
    Status,
    WechatPrepayId,
    WechatNonceStr,
    WechatTransactionId,
    AlipayTradeNo,
    AlipayBuyerId,
    AlipayBuyerLogonId,
    PaidAt,
    ExpireAt,
    RefundAmount,
    RefundReason,
    RefundNo,
    RefundedAt,
    ClientIp,
    ClientUserAgent,
    ClientDevice,
    Remark,
    CreatedAt,
    UpdatedAt,
}
