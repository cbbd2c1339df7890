use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{operations, prelude::*, puzzle_cells, room_history, rooms, state_versions};
use crate::repositories::{history_events, now_fixed};
use room_types::{CellRef, ConflictStrategy, Operation, OperationKind};

pub struct OperationRepository {
    db: DatabaseConnection,
}

impl OperationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn model_to_operation(model: &operations::Model) -> Result<Operation> {
        let kind: OperationKind = serde_json::from_value(model.payload.clone())?;
        Ok(Operation {
            id: model.id,
            room_id: model.room_id,
            author_id: model.author_id,
            kind,
            base_version: model.base_version,
            committed_version: model.committed_version,
            client_ts: model.client_ts.with_timezone(&Utc),
            conflicted: model.conflicted,
        })
    }

    fn operation_to_model(op: &Operation) -> Result<operations::ActiveModel> {
        Ok(operations::ActiveModel {
            id: Set(op.id),
            room_id: Set(op.room_id),
            author_id: Set(op.author_id),
            cell: Set(op.kind.cell().as_str().to_string()),
            payload: Set(serde_json::to_value(&op.kind)?),
            base_version: Set(op.base_version),
            committed_version: Set(op.committed_version),
            client_ts: Set(op.client_ts.into()),
            conflicted: Set(op.conflicted),
            created_at: Set(now_fixed()),
        })
    }

    pub async fn list_for_room(&self, room_id: Uuid) -> Result<Vec<Operation>> {
        let models = Operations::find()
            .filter(operations::Column::RoomId.eq(room_id))
            .order_by_asc(operations::Column::CommittedVersion)
            .all(&self.db)
            .await?;
        models.iter().map(Self::model_to_operation).collect()
    }

    pub async fn list_since(&self, room_id: Uuid, version: i64) -> Result<Vec<Operation>> {
        let models = Operations::find()
            .filter(operations::Column::RoomId.eq(room_id))
            .filter(operations::Column::CommittedVersion.gt(version))
            .order_by_asc(operations::Column::CommittedVersion)
            .all(&self.db)
            .await?;
        models.iter().map(Self::model_to_operation).collect()
    }

    /// Persist a batch of freshly accepted operations: append to the log,
    /// fold non-conflicted ones into the materialized grid, and stamp the
    /// room's version, in one transaction. The stamp is conditional on
    /// `expected_version`; returns false and writes nothing when the
    /// stored version moved underneath the caller (a concurrent restore).
    pub async fn persist_accepted(
        &self,
        room_id: Uuid,
        accepted: &[Operation],
        expected_version: i64,
        new_version: i64,
    ) -> Result<bool> {
        if accepted.is_empty() {
            return Ok(true);
        }

        let txn = self.db.begin().await?;

        let models: Vec<operations::ActiveModel> = accepted
            .iter()
            .map(Self::operation_to_model)
            .collect::<Result<_>>()?;
        Operations::insert_many(models).exec(&txn).await?;

        for op in accepted.iter().filter(|op| !op.conflicted) {
            let cell = puzzle_cells::ActiveModel {
                room_id: Set(room_id),
                cell: Set(op.kind.cell().as_str().to_string()),
                value: Set(op.kind.resulting_value().map(str::to_owned)),
                updated_by: Set(op.author_id),
                updated_at: Set(op.client_ts.into()),
            };
            PuzzleCells::insert(cell)
                .on_conflict(
                    OnConflict::columns([puzzle_cells::Column::RoomId, puzzle_cells::Column::Cell])
                        .update_columns([
                            puzzle_cells::Column::Value,
                            puzzle_cells::Column::UpdatedBy,
                            puzzle_cells::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec(&txn)
                .await?;
        }

        let now = now_fixed();
        let stamped = Rooms::update_many()
            .col_expr(rooms::Column::Version, Expr::value(new_version))
            .col_expr(rooms::Column::LastActivityAt, Expr::value(now))
            .col_expr(rooms::Column::UpdatedAt, Expr::value(now))
            .filter(rooms::Column::Id.eq(room_id))
            .filter(rooms::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;
        if stamped.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        txn.commit().await?;
        Ok(true)
    }

    /// Replace the room's log with a resolution's survivors, rewrite the
    /// grid to match, snapshot the result, and audit the pass. The version
    /// stamp is conditional like `persist_accepted`; false means the room
    /// moved underneath the resolution and nothing was written.
    pub async fn apply_resolution(
        &self,
        room_id: Uuid,
        expected_version: i64,
        new_version: i64,
        resolved: &[Operation],
        strategy: ConflictStrategy,
        actor: Uuid,
        snapshot: serde_json::Value,
        checksum: String,
    ) -> Result<bool> {
        let txn = self.db.begin().await?;

        Operations::delete_many()
            .filter(operations::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        if !resolved.is_empty() {
            let models: Vec<operations::ActiveModel> = resolved
                .iter()
                .map(Self::operation_to_model)
                .collect::<Result<_>>()?;
            Operations::insert_many(models).exec(&txn).await?;
        }

        PuzzleCells::delete_many()
            .filter(puzzle_cells::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        // Replay survivors in commit order so the later write holds each cell
        let mut final_cells: HashMap<&CellRef, &Operation> = HashMap::new();
        let mut ordered: Vec<&Operation> = resolved.iter().collect();
        ordered.sort_by_key(|op| op.committed_version);
        for op in ordered {
            final_cells.insert(op.kind.cell(), op);
        }
        for (cell, op) in final_cells {
            let model = puzzle_cells::ActiveModel {
                room_id: Set(room_id),
                cell: Set(cell.as_str().to_string()),
                value: Set(op.kind.resulting_value().map(str::to_owned)),
                updated_by: Set(op.author_id),
                updated_at: Set(op.client_ts.into()),
            };
            PuzzleCells::insert(model).exec(&txn).await?;
        }

        let now = now_fixed();
        let stamped = Rooms::update_many()
            .col_expr(rooms::Column::Version, Expr::value(new_version))
            .col_expr(rooms::Column::UpdatedAt, Expr::value(now))
            .filter(rooms::Column::Id.eq(room_id))
            .filter(rooms::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;
        if stamped.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        let snapshot_row = state_versions::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            version: Set(new_version),
            snapshot: Set(snapshot),
            checksum: Set(checksum),
            created_at: Set(now),
        };
        StateVersions::insert(snapshot_row).exec(&txn).await?;

        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            actor_id: Set(Some(actor)),
            event: Set(history_events::CONFLICT_RESOLVED.to_string()),
            detail: Set(serde_json::json!({
                "strategy": strategy,
                "retained": resolved.len(),
                "version": new_version,
            })),
            created_at: Set(now),
        };
        RoomHistory::insert(history).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn count_authored_since(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = cutoff.into();
        Ok(Operations::find()
            .filter(operations::Column::RoomId.eq(room_id))
            .filter(operations::Column::AuthorId.eq(author_id))
            .filter(operations::Column::CreatedAt.gte(cutoff))
            .count(&self.db)
            .await?)
    }

    pub async fn list_cells(&self, room_id: Uuid) -> Result<Vec<puzzle_cells::Model>> {
        Ok(PuzzleCells::find()
            .filter(puzzle_cells::Column::RoomId.eq(room_id))
            .all(&self.db)
            .await?)
    }

    pub async fn list_versions(&self, room_id: Uuid) -> Result<Vec<state_versions::Model>> {
        Ok(StateVersions::find()
            .filter(state_versions::Column::RoomId.eq(room_id))
            .order_by_desc(state_versions::Column::Version)
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use crate::repositories::RoomRepository;
    use migration::{Migrator, MigratorTrait};

    async fn setup() -> (OperationRepository, RoomRepository, Uuid) {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let rooms = RoomRepository::new(db.clone());
        let room_id = Uuid::new_v4();
        rooms
            .create_room(room_id, "OPS001".to_string(), Uuid::new_v4(), 8, false, None)
            .await
            .unwrap();
        (OperationRepository::new(db), rooms, room_id)
    }

    fn make_op(room_id: Uuid, cell: &str, value: &str, version: i64) -> Operation {
        Operation {
            id: Uuid::new_v4(),
            room_id,
            author_id: Uuid::new_v4(),
            kind: OperationKind::CellEdit {
                cell: CellRef::new(cell),
                value: value.to_string(),
            },
            base_version: version - 1,
            committed_version: version,
            client_ts: Utc::now(),
            conflicted: false,
        }
    }

    #[tokio::test]
    async fn test_persist_and_list_round_trip() {
        let (repo, rooms, room_id) = setup().await;

        let ops = vec![make_op(room_id, "A1", "X", 1), make_op(room_id, "B2", "Y", 2)];
        assert!(repo.persist_accepted(room_id, &ops, 0, 2).await.unwrap());

        let listed = repo.list_for_room(room_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, ops[0].kind);

        let room = rooms.find_by_id(room_id).await.unwrap().unwrap();
        assert_eq!(room.version, 2);

        let cells = repo.list_cells(room_id).await.unwrap();
        assert_eq!(cells.len(), 2);
    }

    #[tokio::test]
    async fn test_list_since_is_a_strict_tail() {
        let (repo, _, room_id) = setup().await;
        let ops: Vec<Operation> = (1..=4)
            .map(|v| make_op(room_id, &format!("A{}", v), "x", v))
            .collect();
        repo.persist_accepted(room_id, &ops, 0, 4).await.unwrap();

        let tail = repo.list_since(room_id, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|op| op.committed_version > 2));
    }

    #[tokio::test]
    async fn test_conflicted_operation_does_not_touch_the_grid() {
        let (repo, _, room_id) = setup().await;
        let winner = make_op(room_id, "A1", "X", 1);
        let mut loser = make_op(room_id, "A1", "Y", 2);
        loser.conflicted = true;
        repo.persist_accepted(room_id, &[winner, loser], 0, 2)
            .await
            .unwrap();

        let cells = repo.list_cells(room_id).await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].value.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_persist_refuses_a_stale_version_stamp() {
        let (repo, rooms, room_id) = setup().await;
        repo.persist_accepted(room_id, &[make_op(room_id, "A1", "X", 1)], 0, 1)
            .await
            .unwrap();

        // A writer that hydrated before the room moved to version 1.
        let stale = make_op(room_id, "B2", "Y", 1);
        assert!(!repo
            .persist_accepted(room_id, &[stale], 0, 1)
            .await
            .unwrap());

        // The refused batch left nothing behind.
        assert_eq!(repo.list_for_room(room_id).await.unwrap().len(), 1);
        assert_eq!(repo.list_cells(room_id).await.unwrap().len(), 1);
        let room = rooms.find_by_id(room_id).await.unwrap().unwrap();
        assert_eq!(room.version, 1);
    }

    #[tokio::test]
    async fn test_apply_resolution_replaces_log_and_grid() {
        let (repo, rooms, room_id) = setup().await;
        let winner = make_op(room_id, "A1", "X", 1);
        let mut loser = make_op(room_id, "A1", "Y", 2);
        loser.conflicted = true;
        repo.persist_accepted(room_id, &[winner, loser.clone()], 0, 2)
            .await
            .unwrap();

        // Resolution kept the later write
        loser.conflicted = false;
        assert!(repo
            .apply_resolution(
                room_id,
                2,
                3,
                &[loser],
                ConflictStrategy::LastWriteWins,
                Uuid::new_v4(),
                serde_json::json!({"cells": {"A1": "Y"}}),
                "checksum".to_string(),
            )
            .await
            .unwrap());

        let listed = repo.list_for_room(room_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        let cells = repo.list_cells(room_id).await.unwrap();
        assert_eq!(cells[0].value.as_deref(), Some("Y"));
        let room = rooms.find_by_id(room_id).await.unwrap().unwrap();
        assert_eq!(room.version, 3);
        let versions = repo.list_versions(room_id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 3);
    }
}
