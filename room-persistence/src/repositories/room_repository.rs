use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{prelude::*, room_history, rooms};
use crate::repositories::{history_events, now_fixed};
use room_types::{RoomStatistics, RoomStatus};

pub struct RoomRepository {
    db: DatabaseConnection,
}

impl RoomRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_room(
        &self,
        id: Uuid,
        code: String,
        host_user_id: Uuid,
        max_players: i32,
        is_private: bool,
        password_hash: Option<String>,
    ) -> Result<rooms::Model> {
        let now = now_fixed();
        let txn = self.db.begin().await?;

        let room = rooms::ActiveModel {
            id: Set(id),
            code: Set(code),
            status: Set(RoomStatus::Waiting.as_str().to_string()),
            version: Set(0),
            state: Set(serde_json::json!({})),
            host_user_id: Set(host_user_id),
            max_players: Set(max_players),
            is_private: Set(is_private),
            password_hash: Set(password_hash),
            created_at: Set(now),
            started_at: Set(None),
            completed_at: Set(None),
            last_activity_at: Set(now),
            updated_at: Set(now),
        };
        Rooms::insert(room).exec(&txn).await?;

        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(id),
            actor_id: Set(Some(host_user_id)),
            event: Set(history_events::ROOM_CREATED.to_string()),
            detail: Set(serde_json::json!({ "maxPlayers": max_players })),
            created_at: Set(now),
        };
        RoomHistory::insert(history).exec(&txn).await?;

        txn.commit().await?;

        let created = Rooms::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to retrieve created room"))?;
        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<rooms::Model>> {
        Ok(Rooms::find_by_id(id).one(&self.db).await?)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<rooms::Model>> {
        Ok(Rooms::find()
            .filter(rooms::Column::Code.eq(code))
            .one(&self.db)
            .await?)
    }

    pub async fn code_exists(&self, code: &str) -> Result<bool> {
        let count = Rooms::find()
            .filter(rooms::Column::Code.eq(code))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Atomically move a room from `from` to `to` and write the audit row,
    /// or do nothing at all. The update is keyed on the expected current
    /// status, so a concurrent transition (or a sweep re-run) makes this a
    /// no-op and returns false.
    pub async fn transition_status(
        &self,
        room_id: Uuid,
        from: RoomStatus,
        to: RoomStatus,
        reason: &str,
        actor: Option<Uuid>,
    ) -> Result<bool> {
        let now = now_fixed();
        let txn = self.db.begin().await?;

        let mut update = Rooms::update_many()
            .col_expr(rooms::Column::Status, Expr::value(to.as_str()))
            .col_expr(rooms::Column::UpdatedAt, Expr::value(now));
        if to == RoomStatus::Active {
            update = update.col_expr(rooms::Column::StartedAt, Expr::value(Some(now)));
        }
        if to == RoomStatus::Completed {
            update = update.col_expr(rooms::Column::CompletedAt, Expr::value(Some(now)));
        }
        let result = update
            .filter(rooms::Column::Id.eq(room_id))
            .filter(rooms::Column::Status.eq(from.as_str()))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            actor_id: Set(actor),
            event: Set(history_events::STATUS_CHANGED.to_string()),
            detail: Set(serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "reason": reason,
            })),
            created_at: Set(now),
        };
        RoomHistory::insert(history).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn touch_activity(&self, room_id: Uuid) -> Result<()> {
        let now = now_fixed();
        Rooms::update_many()
            .col_expr(rooms::Column::LastActivityAt, Expr::value(now))
            .col_expr(rooms::Column::UpdatedAt, Expr::value(now))
            .filter(rooms::Column::Id.eq(room_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Rooms not yet EXPIRED that were created before the cutoff.
    /// COMPLETED rooms are included so they eventually reach the
    /// retention delete instead of lingering forever.
    pub async fn find_aged_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<rooms::Model>> {
        self.find_expirable_where(rooms::Column::CreatedAt, cutoff)
            .await
    }

    /// Rooms not yet EXPIRED whose last activity predates the cutoff.
    pub async fn find_inactive_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<rooms::Model>> {
        self.find_expirable_where(rooms::Column::LastActivityAt, cutoff)
            .await
    }

    async fn find_expirable_where(
        &self,
        column: rooms::Column,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<rooms::Model>> {
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = cutoff.into();
        Ok(Rooms::find()
            .filter(
                rooms::Column::Status.is_in([
                    RoomStatus::Waiting.as_str(),
                    RoomStatus::Active.as_str(),
                    RoomStatus::Completed.as_str(),
                ]),
            )
            .filter(column.lt(cutoff))
            .all(&self.db)
            .await?)
    }

    pub async fn find_live_rooms(&self) -> Result<Vec<rooms::Model>> {
        Ok(Rooms::find()
            .filter(
                rooms::Column::Status.is_in([
                    RoomStatus::Waiting.as_str(),
                    RoomStatus::Active.as_str(),
                ]),
            )
            .all(&self.db)
            .await?)
    }

    /// EXPIRED rooms whose last status change predates the cutoff.
    pub async fn find_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<rooms::Model>> {
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = cutoff.into();
        Ok(Rooms::find()
            .filter(rooms::Column::Status.eq(RoomStatus::Expired.as_str()))
            .filter(rooms::Column::UpdatedAt.lt(cutoff))
            .all(&self.db)
            .await?)
    }

    /// Hard-delete a room and everything scoped to it, in one transaction.
    pub async fn hard_delete(&self, room_id: Uuid) -> Result<()> {
        use crate::entities::{
            backups, host_transfers, operations, participants, puzzle_cells, recovery_locks,
            state_versions,
        };

        let txn = self.db.begin().await?;

        RecoveryLocks::delete_many()
            .filter(recovery_locks::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        HostTransfers::delete_many()
            .filter(host_transfers::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        Backups::delete_many()
            .filter(backups::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        StateVersions::delete_many()
            .filter(state_versions::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        PuzzleCells::delete_many()
            .filter(puzzle_cells::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        Operations::delete_many()
            .filter(operations::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        Participants::delete_many()
            .filter(participants::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        RoomHistory::delete_many()
            .filter(room_history::Column::RoomId.eq(room_id))
            .exec(&txn)
            .await?;
        Rooms::delete_many()
            .filter(rooms::Column::Id.eq(room_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn insert_history(
        &self,
        room_id: Uuid,
        actor: Option<Uuid>,
        event: &str,
        detail: serde_json::Value,
    ) -> Result<()> {
        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            actor_id: Set(actor),
            event: Set(event.to_string()),
            detail: Set(detail),
            created_at: Set(now_fixed()),
        };
        RoomHistory::insert(history).exec(&self.db).await?;
        Ok(())
    }

    pub async fn list_history(&self, room_id: Uuid) -> Result<Vec<room_history::Model>> {
        Ok(RoomHistory::find()
            .filter(room_history::Column::RoomId.eq(room_id))
            .order_by_desc(room_history::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn statistics(&self) -> Result<RoomStatistics> {
        let rooms = Rooms::find().all(&self.db).await?;
        let now = Utc::now();

        let mut stats = RoomStatistics::default();
        let mut age_total = 0f64;
        let mut session_total = 0f64;
        let mut session_count = 0u64;

        for room in &rooms {
            match RoomStatus::parse(&room.status) {
                Some(RoomStatus::Waiting) => stats.waiting += 1,
                Some(RoomStatus::Active) => stats.active += 1,
                Some(RoomStatus::Completed) => stats.completed += 1,
                Some(RoomStatus::Expired) => stats.expired += 1,
                None => {}
            }
            age_total += (now - room.created_at.with_timezone(&Utc)).num_seconds() as f64;
            if let (Some(started), Some(completed)) = (room.started_at, room.completed_at) {
                session_total += (completed.with_timezone(&Utc) - started.with_timezone(&Utc))
                    .num_seconds() as f64;
                session_count += 1;
            }
        }

        if !rooms.is_empty() {
            stats.average_age_seconds = age_total / rooms.len() as f64;
        }
        if session_count > 0 {
            stats.average_session_seconds = session_total / session_count as f64;
        }
        Ok(stats)
    }
}
