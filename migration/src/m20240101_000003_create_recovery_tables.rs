use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Backups::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Backups::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Backups::RoomId).uuid().not_null())
                    .col(ColumnDef::new(Backups::CreatedBy).uuid().not_null())
                    .col(ColumnDef::new(Backups::Payload).json().not_null())
                    .col(ColumnDef::new(Backups::Checksum).string().not_null())
                    .col(ColumnDef::new(Backups::SizeBytes).big_integer().not_null())
                    .col(
                        ColumnDef::new(Backups::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Backups::IsCorrupted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Backups::IsExpired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Backups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backups_room")
                    .table(Backups::Table)
                    .col(Backups::RoomId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RoomHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoomHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoomHistory::RoomId).uuid().not_null())
                    .col(ColumnDef::new(RoomHistory::ActorId).uuid())
                    .col(ColumnDef::new(RoomHistory::Event).string().not_null())
                    .col(ColumnDef::new(RoomHistory::Detail).json().not_null())
                    .col(
                        ColumnDef::new(RoomHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    // Audit rows reference their room structurally, never by
                    // substring matching on serialized detail
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_room_history_room")
                            .from(RoomHistory::Table, RoomHistory::RoomId)
                            .to(Rooms::Table, Rooms::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_room_history_room_created")
                    .table(RoomHistory::Table)
                    .col(RoomHistory::RoomId)
                    .col(RoomHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RecoveryLocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecoveryLocks::RoomId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RecoveryLocks::OwnerId).uuid().not_null())
                    .col(
                        ColumnDef::new(RecoveryLocks::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecoveryLocks::AcquiredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RecoveryLocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RoomHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Backups::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Backups {
    Table,
    Id,
    RoomId,
    CreatedBy,
    Payload,
    Checksum,
    SizeBytes,
    ExpiresAt,
    IsCorrupted,
    IsExpired,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RoomHistory {
    Table,
    Id,
    RoomId,
    ActorId,
    Event,
    Detail,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RecoveryLocks {
    Table,
    RoomId,
    OwnerId,
    ExpiresAt,
    AcquiredAt,
}

#[derive(DeriveIden)]
enum Rooms {
    Table,
    Id,
}
