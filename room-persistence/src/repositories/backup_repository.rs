use anyhow::Result;
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{
    backups, operations, prelude::*, puzzle_cells, recovery_locks, room_history, rooms,
    state_versions,
};
use crate::repositories::{history_events, now_fixed};
use room_types::BackupInfo;

/// A puzzle cell as carried inside a backup payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackupCell {
    pub cell: String,
    pub value: Option<String>,
    pub updated_by: Uuid,
}

pub struct BackupRepository {
    db: DatabaseConnection,
}

impl BackupRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn model_to_info(model: &backups::Model) -> BackupInfo {
        BackupInfo {
            id: model.id,
            created_by: model.created_by,
            size_bytes: model.size_bytes,
            checksum: model.checksum.clone(),
            created_at: model.created_at.with_timezone(&Utc),
            expires_at: model.expires_at.with_timezone(&Utc),
            is_corrupted: model.is_corrupted,
            is_expired: model.is_expired,
        }
    }

    pub async fn insert_backup(
        &self,
        room_id: Uuid,
        created_by: Uuid,
        payload: serde_json::Value,
        checksum: String,
        size_bytes: i64,
        ttl: Duration,
    ) -> Result<backups::Model> {
        let id = Uuid::new_v4();
        let now = now_fixed();
        let expires_at: sea_orm::prelude::DateTimeWithTimeZone = (Utc::now() + ttl).into();

        let txn = self.db.begin().await?;

        let model = backups::ActiveModel {
            id: Set(id),
            room_id: Set(room_id),
            created_by: Set(created_by),
            payload: Set(payload),
            checksum: Set(checksum),
            size_bytes: Set(size_bytes),
            expires_at: Set(expires_at),
            is_corrupted: Set(false),
            is_expired: Set(false),
            created_at: Set(now),
        };
        Backups::insert(model).exec(&txn).await?;

        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            actor_id: Set(Some(created_by)),
            event: Set(history_events::BACKUP_CREATED.to_string()),
            detail: Set(serde_json::json!({ "backupId": id, "sizeBytes": size_bytes })),
            created_at: Set(now),
        };
        RoomHistory::insert(history).exec(&txn).await?;

        txn.commit().await?;

        let created = Backups::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to retrieve created backup"))?;
        Ok(created)
    }

    pub async fn find(&self, backup_id: Uuid) -> Result<Option<backups::Model>> {
        Ok(Backups::find_by_id(backup_id).one(&self.db).await?)
    }

    pub async fn list_for_room(&self, room_id: Uuid) -> Result<Vec<backups::Model>> {
        Ok(Backups::find()
            .filter(backups::Column::RoomId.eq(room_id))
            .order_by_desc(backups::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn mark_expired(&self, backup_id: Uuid) -> Result<()> {
        Backups::update_many()
            .col_expr(backups::Column::IsExpired, Expr::value(true))
            .filter(backups::Column::Id.eq(backup_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_corrupted(&self, backup_id: Uuid) -> Result<()> {
        Backups::update_many()
            .col_expr(backups::Column::IsCorrupted, Expr::value(true))
            .filter(backups::Column::Id.eq(backup_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Overwrite room state/version, wholesale replace the puzzle grid,
    /// reset the operation log, and record a state_versions snapshot, all
    /// in one transaction. The version stamp and the cell rows are never
    /// observable out of step.
    pub async fn restore(
        &self,
        room_id: Uuid,
        version: i64,
        state: serde_json::Value,
        cells: &[BackupCell],
        actor: Uuid,
        backup_id: Uuid,
        snapshot: serde_json::Value,
        snapshot_checksum: String,
    ) -> Result<()> {
        let now = now_fixed();
        let txn = self.db.begin().await?;

        Rooms::update_many()
            .col_expr(rooms::Column::State, Expr::value(state))
            .col_expr(rooms::Column::Version, Expr::value(version))
            .col_expr(rooms::Column::UpdatedAt, Expr::value(now))
            .col_expr(rooms::Column::LastActivityAt, Expr::value(now))
            .filter(rooms::Column::Id.eq(room_id))
            .exec(&txn)
            .await?;

        // The restored grid is authoritative; operations committed after
        // the backup no longer describe it, so the log starts over.
        Operations::delete_many()
            .filter(operations::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;

        PuzzleCells::delete_many()
            .filter(puzzle_cells::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        for cell in cells {
            let model = puzzle_cells::ActiveModel {
                room_id: Set(room_id),
                cell: Set(cell.cell.clone()),
                value: Set(cell.value.clone()),
                updated_by: Set(cell.updated_by),
                updated_at: Set(now),
            };
            PuzzleCells::insert(model).exec(&txn).await?;
        }

        let snapshot_row = state_versions::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            version: Set(version),
            snapshot: Set(snapshot),
            checksum: Set(snapshot_checksum),
            created_at: Set(now),
        };
        StateVersions::insert(snapshot_row).exec(&txn).await?;

        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            actor_id: Set(Some(actor)),
            event: Set(history_events::BACKUP_RESTORED.to_string()),
            detail: Set(serde_json::json!({ "backupId": backup_id, "version": version })),
            created_at: Set(now),
        };
        RoomHistory::insert(history).exec(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    /// Take the per-room advisory recovery lock. An unexpired lock held by
    /// anyone makes this return false; an expired one is swept and retaken.
    pub async fn acquire_lock(&self, room_id: Uuid, owner: Uuid, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        if let Some(existing) = RecoveryLocks::find_by_id(room_id).one(&txn).await? {
            if existing.expires_at.with_timezone(&Utc) > now {
                txn.rollback().await?;
                return Ok(false);
            }
            tracing::warn!(
                room = %room_id,
                owner = %existing.owner_id,
                "sweeping expired recovery lock"
            );
            RecoveryLocks::delete_many()
                .filter(recovery_locks::Column::RoomId.eq(room_id))
                .exec(&txn)
                .await?;
        }

        let model = recovery_locks::ActiveModel {
            room_id: Set(room_id),
            owner_id: Set(owner),
            expires_at: Set((now + ttl).into()),
            acquired_at: Set(now.into()),
        };
        RecoveryLocks::insert(model).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn release_lock(&self, room_id: Uuid, owner: Uuid) -> Result<()> {
        RecoveryLocks::delete_many()
            .filter(recovery_locks::Column::RoomId.eq(room_id))
            .filter(recovery_locks::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn lock_active(&self, room_id: Uuid) -> Result<bool> {
        let lock = RecoveryLocks::find_by_id(room_id).one(&self.db).await?;
        Ok(lock
            .map(|l| l.expires_at.with_timezone(&Utc) > Utc::now())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use crate::repositories::{OperationRepository, RoomRepository};
    use migration::{Migrator, MigratorTrait};

    async fn setup() -> (BackupRepository, RoomRepository, OperationRepository, Uuid) {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let rooms = RoomRepository::new(db.clone());
        let room_id = Uuid::new_v4();
        rooms
            .create_room(room_id, "BAK001".to_string(), Uuid::new_v4(), 8, false, None)
            .await
            .unwrap();
        (
            BackupRepository::new(db.clone()),
            rooms,
            OperationRepository::new(db),
            room_id,
        )
    }

    #[tokio::test]
    async fn test_insert_and_list_backups() {
        let (repo, _, _, room_id) = setup().await;
        let actor = Uuid::new_v4();

        let backup = repo
            .insert_backup(
                room_id,
                actor,
                serde_json::json!({"version": 0}),
                "abc".to_string(),
                42,
                Duration::days(30),
            )
            .await
            .unwrap();
        assert!(!backup.is_corrupted);
        assert!(!backup.is_expired);

        let listed = repo.list_for_room(room_id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_replaces_grid_and_version() {
        let (repo, rooms, ops, room_id) = setup().await;
        let actor = Uuid::new_v4();

        let cells = vec![
            BackupCell {
                cell: "A1".to_string(),
                value: Some("X".to_string()),
                updated_by: actor,
            },
            BackupCell {
                cell: "B2".to_string(),
                value: None,
                updated_by: actor,
            },
        ];
        repo.restore(
            room_id,
            7,
            serde_json::json!({"title": "restored"}),
            &cells,
            actor,
            Uuid::new_v4(),
            serde_json::json!({"version": 7}),
            "snapshot-checksum".to_string(),
        )
        .await
        .unwrap();

        let room = rooms.find_by_id(room_id).await.unwrap().unwrap();
        assert_eq!(room.version, 7);
        let grid = ops.list_cells(room_id).await.unwrap();
        assert_eq!(grid.len(), 2);
        let versions = ops.list_versions(room_id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert!(ops.list_for_room(room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_expiry() {
        let (repo, _, _, room_id) = setup().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(repo
            .acquire_lock(room_id, first, Duration::minutes(10))
            .await
            .unwrap());
        assert!(repo.lock_active(room_id).await.unwrap());
        assert!(!repo
            .acquire_lock(room_id, second, Duration::minutes(10))
            .await
            .unwrap());

        repo.release_lock(room_id, first).await.unwrap();
        assert!(!repo.lock_active(room_id).await.unwrap());
        assert!(repo
            .acquire_lock(room_id, second, Duration::minutes(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_retaken() {
        let (repo, _, _, room_id) = setup().await;

        assert!(repo
            .acquire_lock(room_id, Uuid::new_v4(), Duration::minutes(-1))
            .await
            .unwrap());
        assert!(!repo.lock_active(room_id).await.unwrap());
        assert!(repo
            .acquire_lock(room_id, Uuid::new_v4(), Duration::minutes(10))
            .await
            .unwrap());
    }
}
