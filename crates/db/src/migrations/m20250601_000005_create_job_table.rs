//! Create job table backing the durable queues.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Job::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Job::Queue).string().not_null())
                    .col(
                        ColumnDef::new(Job::Status)
                            .string()
                            .not_null()
                            .default("queued"),
                    )
                    .col(ColumnDef::new(Job::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(Job::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Job::DelayedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Job::WorkerId).string().null())
                    .col(ColumnDef::new(Job::ExceptionMessage).text().null())
                    .col(ColumnDef::new(Job::ExceptionSource).text().null())
                    .col(ColumnDef::new(Job::ExceptionStack).text().null())
                    .col(
                        ColumnDef::new(Job::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Job::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Supports the claim query: queue + status filter, delayed_until gate,
        // then ordered scan on the ULID primary key.
        manager
            .create_index(
                Index::create()
                    .name("idx_job_queue_status_delayed")
                    .table(Job::Table)
                    .col(Job::Queue)
                    .col(Job::Status)
                    .col(Job::DelayedUntil)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_job_worker")
                    .table(Job::Table)
                    .col(Job::WorkerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Job {
    Table,
    Id,
    Queue,
    Status,
    Payload,
    RetryCount,
    DelayedUntil,
    WorkerId,
    ExceptionMessage,
    ExceptionSource,
    ExceptionStack,
    CreatedAt,
    UpdatedAt,
}
