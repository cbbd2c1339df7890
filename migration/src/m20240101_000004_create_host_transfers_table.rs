use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HostTransfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HostTransfers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HostTransfers::RoomId).uuid().not_null())
                    .col(ColumnDef::new(HostTransfers::FromUserId).uuid().not_null())
                    .col(ColumnDef::new(HostTransfers::ToUserId).uuid().not_null())
                    .col(ColumnDef::new(HostTransfers::Status).string().not_null())
                    .col(
                        ColumnDef::new(HostTransfers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(HostTransfers::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HostTransfers::ResolvedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Pending-transfer lookups are always (room, status)
        manager
            .create_index(
                Index::create()
                    .name("idx_host_transfers_room_status")
                    .table(HostTransfers::Table)
                    .col(HostTransfers::RoomId)
                    .col(HostTransfers::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HostTransfers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum HostTransfers {
    Table,
    Id,
    RoomId,
    FromUserId,
    ToUserId,
    Status,
    CreatedAt,
    ExpiresAt,
    ResolvedAt,
}
