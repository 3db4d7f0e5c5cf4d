//! Create user table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(User::Username).string().not_null())
                    .col(ColumnDef::new(User::UsernameLower).string().not_null())
                    .col(ColumnDef::new(User::Host).string().null())
                    .col(ColumnDef::new(User::Name).string().null())
                    .col(
                        ColumnDef::new(User::IsSuspended)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(User::Inbox).string().null())
                    .col(ColumnDef::new(User::SharedInbox).string().null())
                    .col(ColumnDef::new(User::Uri).string().null())
                    .col(ColumnDef::new(User::LastFetchedAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(User::UpdatedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_uri")
                    .table(User::Table)
                    .col(User::Uri)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_username_lower_host")
                    .table(User::Table)
                    .col(User::UsernameLower)
                    .col(User::Host)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    Username,
    UsernameLower,
    Host,
    Name,
    IsSuspended,
    Inbox,
    SharedInbox,
    Uri,
    LastFetchedAt,
    CreatedAt,
    UpdatedAt,
}
