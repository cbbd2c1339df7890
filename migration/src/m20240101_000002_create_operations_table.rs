use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Operations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Operations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Operations::RoomId).uuid().not_null())
                    .col(ColumnDef::new(Operations::AuthorId).uuid().not_null())
                    .col(ColumnDef::new(Operations::Cell).string().not_null())
                    .col(ColumnDef::new(Operations::Payload).json().not_null())
                    .col(
                        ColumnDef::new(Operations::BaseVersion)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Operations::CommittedVersion)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Operations::ClientTs)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Operations::Conflicted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Operations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Catch-up reads scan (room, committed_version); the pair is unique
        // because no two accepted operations share a resulting version
        manager
            .create_index(
                Index::create()
                    .name("idx_operations_room_version")
                    .table(Operations::Table)
                    .col(Operations::RoomId)
                    .col(Operations::CommittedVersion)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operations_room_cell")
                    .table(Operations::Table)
                    .col(Operations::RoomId)
                    .col(Operations::Cell)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PuzzleCells::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PuzzleCells::RoomId).uuid().not_null())
                    .col(ColumnDef::new(PuzzleCells::Cell).string().not_null())
                    .col(ColumnDef::new(PuzzleCells::Value).string())
                    .col(ColumnDef::new(PuzzleCells::UpdatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(PuzzleCells::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(PuzzleCells::RoomId)
                            .col(PuzzleCells::Cell),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StateVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StateVersions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StateVersions::RoomId).uuid().not_null())
                    .col(
                        ColumnDef::new(StateVersions::Version)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StateVersions::Snapshot).json().not_null())
                    .col(ColumnDef::new(StateVersions::Checksum).string().not_null())
                    .col(
                        ColumnDef::new(StateVersions::CreatedAt)
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
                    .name("idx_state_versions_room_version")
                    .table(StateVersions::Table)
                    .col(StateVersions::RoomId)
                    .col(StateVersions::Version)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StateVersions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PuzzleCells::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Operations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Operations {
    Table,
    Id,
    RoomId,
    AuthorId,
    Cell,
    Payload,
    BaseVersion,
    CommittedVersion,
    ClientTs,
    Conflicted,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PuzzleCells {
    Table,
    RoomId,
    Cell,
    Value,
    UpdatedBy,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum StateVersions {
    Table,
    Id,
    RoomId,
    Version,
    Snapshot,
    Checksum,
    CreatedAt,
}
