use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use room_core::permissions::{RoomAction, is_allowed};
use room_persistence::entities::{host_transfers, participants, rooms};
use room_persistence::repositories::{
    ParticipantRepository, RoomRepository, TransferRepository,
};
use room_types::{
    ConnectionStatus, HostTransferInfo, SyncError, SyncResult, TransferState,
};

use crate::auth::AuthUser;
use crate::lifecycle::parse_status;
use crate::notify::NotificationSink;
use crate::sync::participant_context;

const TRANSFER_TTL_MINUTES: i64 = 5;

pub struct HostTransferManager {
    rooms: Arc<RoomRepository>,
    participants: Arc<ParticipantRepository>,
    transfers: Arc<TransferRepository>,
    notifier: Arc<dyn NotificationSink>,
}

impl HostTransferManager {
    pub fn new(
        rooms: Arc<RoomRepository>,
        participants: Arc<ParticipantRepository>,
        transfers: Arc<TransferRepository>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            rooms,
            participants,
            transfers,
            notifier,
        }
    }

    pub async fn initiate(
        &self,
        room_id: Uuid,
        actor: &AuthUser,
        target_user_id: Uuid,
    ) -> SyncResult<HostTransferInfo> {
        let room = self.require_room(room_id).await?;
        let participant = self.require_participant(room_id, actor.id).await?;
        let ctx = participant_context(&room, &participant, parse_status(&room)?);
        if !is_allowed(&ctx, RoomAction::TransferHost) {
            return Err(SyncError::authorization(
                "only the host can transfer host rights",
            ));
        }
        if target_user_id == actor.id {
            return Err(SyncError::validation("cannot transfer host to yourself"));
        }

        // An unexpired PENDING blocks a second one; a stale one is swept
        // here rather than by a timer.
        if let Some(pending) = self.transfers.find_pending(room_id).await? {
            if pending.expires_at.with_timezone(&Utc) > Utc::now() {
                return Err(SyncError::conflict(
                    "a host transfer is already pending for this room",
                ));
            }
            self.transfers.cancel(pending.id).await?;
        }

        let target = self
            .participants
            .find(room_id, target_user_id)
            .await?
            .ok_or_else(|| SyncError::validation("target is not a participant of this room"))?;
        let target_connection = ConnectionStatus::parse(&target.connection)
            .unwrap_or(ConnectionStatus::Disconnected);
        if target_connection != ConnectionStatus::Connected {
            return Err(SyncError::validation("target participant is not connected"));
        }

        let transfer = self
            .transfers
            .insert_pending(
                room_id,
                actor.id,
                target_user_id,
                Duration::minutes(TRANSFER_TTL_MINUTES),
            )
            .await?;

        self.notifier
            .notify(
                target_user_id,
                "Host Transfer Offered",
                &format!("You have been offered host of room {}", room.code),
            )
            .await;

        tracing::info!(
            room = %room_id,
            from = %actor.id,
            to = %target_user_id,
            transfer = %transfer.id,
            "host transfer initiated"
        );
        Ok(TransferRepository::model_to_info(&transfer))
    }

    /// Target accepts or declines the pending transfer. Acceptance swaps
    /// the host pointer and both roles in one transaction; a racing
    /// resolution loses and observes NotFound.
    pub async fn confirm(
        &self,
        room_id: Uuid,
        actor: &AuthUser,
        accept: bool,
    ) -> SyncResult<HostTransferInfo> {
        self.require_room(room_id).await?;
        let pending = self.require_pending(room_id).await?;

        if pending.to_user_id != actor.id {
            return Err(SyncError::authorization(
                "only the transfer target can confirm",
            ));
        }

        if pending.expires_at.with_timezone(&Utc) < Utc::now() {
            self.transfers.cancel(pending.id).await?;
            return Err(SyncError::expired("host transfer offer has expired"));
        }

        let resolved = if accept {
            self.transfers.complete(&pending).await?
        } else {
            self.transfers.cancel(pending.id).await?
        };
        if !resolved {
            return Err(SyncError::not_found("no pending transfer found"));
        }

        if accept {
            self.notifier
                .notify(
                    pending.from_user_id,
                    "Host Transfer Completed",
                    "Your host rights were handed over",
                )
                .await;
            tracing::info!(room = %room_id, transfer = %pending.id, "host transfer completed");
        } else {
            self.notifier
                .notify(
                    pending.from_user_id,
                    "Host Transfer Declined",
                    "The target declined the host transfer",
                )
                .await;
            tracing::info!(room = %room_id, transfer = %pending.id, "host transfer declined");
        }

        let resolved_model = self
            .transfers
            .find(pending.id)
            .await?
            .ok_or_else(|| SyncError::internal("transfer vanished after resolution"))?;
        Ok(TransferRepository::model_to_info(&resolved_model))
    }

    /// Initiator (or target) withdraws the offer.
    pub async fn cancel(&self, room_id: Uuid, actor: &AuthUser) -> SyncResult<HostTransferInfo> {
        self.require_room(room_id).await?;
        let pending = self.require_pending(room_id).await?;

        if pending.from_user_id != actor.id && pending.to_user_id != actor.id {
            return Err(SyncError::authorization(
                "only the transfer parties can cancel",
            ));
        }

        if !self.transfers.cancel(pending.id).await? {
            return Err(SyncError::not_found("no pending transfer found"));
        }

        tracing::info!(room = %room_id, transfer = %pending.id, "host transfer cancelled");
        let resolved_model = self
            .transfers
            .find(pending.id)
            .await?
            .ok_or_else(|| SyncError::internal("transfer vanished after resolution"))?;
        Ok(TransferRepository::model_to_info(&resolved_model))
    }

    pub async fn get_state(&self, room_id: Uuid) -> SyncResult<TransferState> {
        self.require_room(room_id).await?;
        let now = Utc::now();
        let pending = self
            .transfers
            .find_pending(room_id)
            .await?
            .filter(|t| t.expires_at.with_timezone(&Utc) > now)
            .map(|t| TransferRepository::model_to_info(&t));
        let history = self
            .transfers
            .history(room_id)
            .await?
            .iter()
            .map(TransferRepository::model_to_info)
            .collect();
        Ok(TransferState { pending, history })
    }

    async fn require_room(&self, room_id: Uuid) -> SyncResult<rooms::Model> {
        self.rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| SyncError::not_found("room not found"))
    }

    async fn require_participant(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> SyncResult<participants::Model> {
        self.participants
            .find(room_id, user_id)
            .await?
            .ok_or_else(|| SyncError::authorization("not a participant of this room"))
    }

    async fn require_pending(&self, room_id: Uuid) -> SyncResult<host_transfers::Model> {
        self.transfers
            .find_pending(room_id)
            .await?
            .ok_or_else(|| SyncError::not_found("no pending transfer found"))
    }
}
