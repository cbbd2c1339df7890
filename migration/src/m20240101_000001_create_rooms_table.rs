use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rooms::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rooms::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Rooms::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(Rooms::Status).string().not_null())
                    .col(
                        ColumnDef::new(Rooms::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Rooms::State).json().not_null())
                    .col(ColumnDef::new(Rooms::HostUserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Rooms::MaxPlayers)
                            .integer()
                            .not_null()
                            .default(8),
                    )
                    .col(
                        ColumnDef::new(Rooms::IsPrivate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Rooms::PasswordHash).string())
                    .col(
                        ColumnDef::new(Rooms::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Rooms::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Rooms::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Rooms::LastActivityAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Rooms::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Sweeps filter on status plus one of the two timestamps
        manager
            .create_index(
                Index::create()
                    .name("idx_rooms_status")
                    .table(Rooms::Table)
                    .col(Rooms::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rooms_last_activity")
                    .table(Rooms::Table)
                    .col(Rooms::LastActivityAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Participants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Participants::RoomId).uuid().not_null())
                    .col(ColumnDef::new(Participants::UserId).uuid().not_null())
                    .col(ColumnDef::new(Participants::Role).string().not_null())
                    .col(ColumnDef::new(Participants::Connection).string().not_null())
                    .col(
                        ColumnDef::new(Participants::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Participants::LastActiveAt)
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
                    .name("idx_participants_room_user")
                    .table(Participants::Table)
                    .col(Participants::RoomId)
                    .col(Participants::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Participants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rooms::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Rooms {
    Table,
    Id,
    Code,
    Status,
    Version,
    State,
    HostUserId,
    MaxPlayers,
    IsPrivate,
    PasswordHash,
    CreatedAt,
    StartedAt,
    CompletedAt,
    LastActivityAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Participants {
    Table,
    Id,
    RoomId,
    UserId,
    Role,
    Connection,
    JoinedAt,
    LastActiveAt,
}
