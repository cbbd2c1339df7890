use anyhow::Result;
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{host_transfers, participants, prelude::*, room_history, rooms};
use crate::repositories::{history_events, now_fixed};
use room_types::{HostTransferInfo, ParticipantRole, TransferStatus};

pub struct TransferRepository {
    db: DatabaseConnection,
}

impl TransferRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn model_to_info(model: &host_transfers::Model) -> HostTransferInfo {
        HostTransferInfo {
            id: model.id,
            room_id: model.room_id,
            from_user_id: model.from_user_id,
            to_user_id: model.to_user_id,
            status: TransferStatus::parse(&model.status).unwrap_or(TransferStatus::Cancelled),
            created_at: model.created_at.with_timezone(&Utc),
            expires_at: model.expires_at.with_timezone(&Utc),
            resolved_at: model.resolved_at.map(|t| t.with_timezone(&Utc)),
        }
    }

    pub async fn insert_pending(
        &self,
        room_id: Uuid,
        from_user_id: Uuid,
        to_user_id: Uuid,
        ttl: Duration,
    ) -> Result<host_transfers::Model> {
        let id = Uuid::new_v4();
        let model = host_transfers::ActiveModel {
            id: Set(id),
            room_id: Set(room_id),
            from_user_id: Set(from_user_id),
            to_user_id: Set(to_user_id),
            status: Set(TransferStatus::Pending.as_str().to_string()),
            created_at: Set(now_fixed()),
            expires_at: Set((Utc::now() + ttl).into()),
            resolved_at: Set(None),
        };
        HostTransfers::insert(model).exec(&self.db).await?;
        let created = HostTransfers::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to retrieve created transfer"))?;
        Ok(created)
    }

    pub async fn find(&self, transfer_id: Uuid) -> Result<Option<host_transfers::Model>> {
        Ok(HostTransfers::find_by_id(transfer_id).one(&self.db).await?)
    }

    pub async fn find_pending(&self, room_id: Uuid) -> Result<Option<host_transfers::Model>> {
        Ok(HostTransfers::find()
            .filter(host_transfers::Column::RoomId.eq(room_id))
            .filter(host_transfers::Column::Status.eq(TransferStatus::Pending.as_str()))
            .one(&self.db)
            .await?)
    }

    pub async fn history(&self, room_id: Uuid) -> Result<Vec<host_transfers::Model>> {
        Ok(HostTransfers::find()
            .filter(host_transfers::Column::RoomId.eq(room_id))
            .order_by_desc(host_transfers::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Flip a pending transfer to cancelled. Returns false when the transfer
    /// was already resolved by a racing request.
    pub async fn cancel(&self, transfer_id: Uuid) -> Result<bool> {
        let result = HostTransfers::update_many()
            .col_expr(
                host_transfers::Column::Status,
                Expr::value(TransferStatus::Cancelled.as_str()),
            )
            .col_expr(
                host_transfers::Column::ResolvedAt,
                Expr::value(Some(now_fixed())),
            )
            .filter(host_transfers::Column::Id.eq(transfer_id))
            .filter(host_transfers::Column::Status.eq(TransferStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Complete a pending transfer: mark it completed, move the room's
    /// host pointer, and swap the participant roles, all in one transaction.
    /// The conditional status update makes racing resolutions lose cleanly.
    pub async fn complete(&self, transfer: &host_transfers::Model) -> Result<bool> {
        let now = now_fixed();
        let txn = self.db.begin().await?;

        let result = HostTransfers::update_many()
            .col_expr(
                host_transfers::Column::Status,
                Expr::value(TransferStatus::Completed.as_str()),
            )
            .col_expr(host_transfers::Column::ResolvedAt, Expr::value(Some(now)))
            .filter(host_transfers::Column::Id.eq(transfer.id))
            .filter(host_transfers::Column::Status.eq(TransferStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        Rooms::update_many()
            .col_expr(
                rooms::Column::HostUserId,
                Expr::value(transfer.to_user_id),
            )
            .col_expr(rooms::Column::UpdatedAt, Expr::value(now))
            .filter(rooms::Column::Id.eq(transfer.room_id))
            .exec(&txn)
            .await?;

        Participants::update_many()
            .col_expr(
                participants::Column::Role,
                Expr::value(ParticipantRole::Host.as_str()),
            )
            .filter(participants::Column::RoomId.eq(transfer.room_id))
            .filter(participants::Column::UserId.eq(transfer.to_user_id))
            .exec(&txn)
            .await?;
        Participants::update_many()
            .col_expr(
                participants::Column::Role,
                Expr::value(ParticipantRole::Player.as_str()),
            )
            .filter(participants::Column::RoomId.eq(transfer.room_id))
            .filter(participants::Column::UserId.eq(transfer.from_user_id))
            .exec(&txn)
            .await?;

        let history = room_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(transfer.room_id),
            actor_id: Set(Some(transfer.to_user_id)),
            event: Set(history_events::HOST_TRANSFERRED.to_string()),
            detail: Set(serde_json::json!({
                "transferId": transfer.id,
                "fromUserId": transfer.from_user_id,
                "toUserId": transfer.to_user_id,
            })),
            created_at: Set(now),
        };
        RoomHistory::insert(history).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }
}
