use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_uuid(Users::Id))
                    .col(string_null(Users::Phone).unique_key())
                    .col(string_null(Users::WechatOpenid).unique_key())
                    .col(
                        string_len(Users::MembershipTier, 16)
                            .not_null()
                            .default("free"),
                    )
                    .col(timestamp_with_time_zone_null(Users::MembershipStartedAt))
                    .col(timestamp_with_time_zone_null(Users::MembershipExpiresAt))
                    .col(string_len(Users::DailyDate, 10).not_null())
                    .col(integer(Users::DailyUsed).not_null().default(0))
                    .col(integer(Users::DailyTotal).not_null().default(3))
                    .col(
                        timestamp_with_time_zone(Users::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Users::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_membership_tier")
                    .table(Users::Table)
                    .col(Users::MembershipTier)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_membership_expires_at")
                    .table(Users::Table)
                    .col(Users::MembershipExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Users {
    Table,
    Id,
    Phone,
    WechatOpenid,
    MembershipTier,
    MembershipStartedAt,
    MembershipExpiresAt,
    DailyDate,
    DailyUsed,
    DailyTotal,
    CreatedAt,
    UpdatedAt,
}
