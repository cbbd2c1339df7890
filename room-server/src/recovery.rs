use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use room_core::permissions::{RoomAction, is_allowed};
use room_persistence::entities::{participants, rooms};
use room_persistence::repositories::backup_repository::BackupCell;
use room_persistence::repositories::{
    BackupRepository, OperationRepository, ParticipantRepository, RoomRepository, history_events,
};
use room_types::{BackupInfo, ConnectionStatus, RecoveryState, SyncError, SyncResult};

use crate::auth::AuthUser;
use crate::lifecycle::parse_status;
use crate::sync::{SyncCoordinator, participant_context};

const BACKUP_TTL_DAYS: i64 = 30;
const RESTORE_LOCK_MINUTES: i64 = 5;
const UNSAVED_WINDOW_MINUTES: i64 = 5;

/// Immutable backup payload: the full room state a restore reinstates.
#[derive(Debug, Serialize, Deserialize)]
struct BackupPayload {
    state: serde_json::Value,
    version: i64,
    roster: Vec<RosterEntry>,
    cells: Vec<BackupCell>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RosterEntry {
    user_id: Uuid,
    role: String,
}

/// One row of the version history exposed for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

pub struct RecoveryManager {
    rooms: Arc<RoomRepository>,
    participants: Arc<ParticipantRepository>,
    operations: Arc<OperationRepository>,
    backups: Arc<BackupRepository>,
    sync: Arc<SyncCoordinator>,
}

impl RecoveryManager {
    pub fn new(
        rooms: Arc<RoomRepository>,
        participants: Arc<ParticipantRepository>,
        operations: Arc<OperationRepository>,
        backups: Arc<BackupRepository>,
        sync: Arc<SyncCoordinator>,
    ) -> Self {
        Self {
            rooms,
            participants,
            operations,
            backups,
            sync,
        }
    }

    pub async fn create_backup(&self, room_id: Uuid, user: &AuthUser) -> SyncResult<BackupInfo> {
        let room = self.require_room(room_id).await?;
        let participant = self.require_participant(room_id, user.id).await?;
        let ctx = participant_context(&room, &participant, parse_status(&room)?);
        if !is_allowed(&ctx, RoomAction::CreateBackup) {
            return Err(SyncError::authorization("only the host can create backups"));
        }

        let roster = self
            .participants
            .list(room_id)
            .await?
            .into_iter()
            .map(|p| RosterEntry {
                user_id: p.user_id,
                role: p.role,
            })
            .collect();
        let cells = self
            .operations
            .list_cells(room_id)
            .await?
            .into_iter()
            .map(|c| BackupCell {
                cell: c.cell,
                value: c.value,
                updated_by: c.updated_by,
            })
            .collect();

        let payload = BackupPayload {
            state: room.state.clone(),
            version: room.version,
            roster,
            cells,
        };
        let payload_json = serde_json::to_value(&payload)
            .map_err(|e| SyncError::internal(format!("failed to encode backup: {}", e)))?;
        let bytes = payload_json.to_string().into_bytes();
        let checksum = crate::sha256_hex(&bytes);

        let model = self
            .backups
            .insert_backup(
                room_id,
                user.id,
                payload_json,
                checksum,
                bytes.len() as i64,
                Duration::days(BACKUP_TTL_DAYS),
            )
            .await?;

        tracing::info!(room = %room_id, backup = %model.id, size = model.size_bytes, "backup created");
        Ok(BackupRepository::model_to_info(&model))
    }

    pub async fn restore_from_backup(
        &self,
        room_id: Uuid,
        user: &AuthUser,
        backup_id: Uuid,
    ) -> SyncResult<()> {
        let room = self.require_room(room_id).await?;
        let participant = self.require_participant(room_id, user.id).await?;
        let ctx = participant_context(&room, &participant, parse_status(&room)?);
        if !is_allowed(&ctx, RoomAction::RestoreBackup) {
            return Err(SyncError::authorization("only the host can restore backups"));
        }

        let backup = self
            .backups
            .find(backup_id)
            .await?
            .filter(|b| b.room_id == room_id)
            .ok_or_else(|| SyncError::not_found("backup not found"))?;

        // Expiry is a timestamp enforced here, not a timer; the flag is
        // set lazily on first rejection.
        if backup.is_expired || backup.expires_at.with_timezone(&Utc) < Utc::now() {
            if !backup.is_expired {
                self.backups.mark_expired(backup.id).await?;
            }
            return Err(SyncError::expired("backup has expired"));
        }
        if backup.is_corrupted {
            return Err(SyncError::validation("backup is corrupted"));
        }

        let bytes = backup.payload.to_string().into_bytes();
        if crate::sha256_hex(&bytes) != backup.checksum {
            self.backups.mark_corrupted(backup.id).await?;
            return Err(SyncError::validation("backup checksum mismatch"));
        }

        let payload: BackupPayload = serde_json::from_value(backup.payload.clone())
            .map_err(|e| SyncError::internal(format!("failed to decode backup: {}", e)))?;

        if !self
            .backups
            .acquire_lock(room_id, user.id, Duration::minutes(RESTORE_LOCK_MINUTES))
            .await?
        {
            return Err(SyncError::conflict("recovery already in progress"));
        }

        let snapshot = restore_snapshot(&payload);
        let snapshot_checksum = crate::sha256_hex(snapshot.to_string().as_bytes());

        let result = self
            .backups
            .restore(
                room_id,
                payload.version,
                payload.state,
                &payload.cells,
                user.id,
                backup.id,
                snapshot,
                snapshot_checksum,
            )
            .await;
        self.backups.release_lock(room_id, user.id).await?;
        result?;

        // The store changed underneath the coordinator; force rehydration.
        self.sync.invalidate(room_id);

        tracing::info!(room = %room_id, backup = %backup.id, version = payload.version, "backup restored");
        Ok(())
    }

    /// Presence update on reconnect.
    pub async fn recover_session(&self, room_id: Uuid, user: &AuthUser) -> SyncResult<()> {
        self.require_room(room_id).await?;
        self.require_participant(room_id, user.id).await?;
        self.participants
            .set_connection(room_id, user.id, ConnectionStatus::Connected)
            .await?;
        self.rooms.touch_activity(room_id).await?;
        self.rooms
            .insert_history(
                room_id,
                Some(user.id),
                history_events::RECOVERY_STARTED,
                serde_json::json!({}),
            )
            .await?;
        tracing::info!(room = %room_id, user = %user.id, "session recovered");
        Ok(())
    }

    pub async fn has_unsaved_changes(&self, room_id: Uuid, user_id: Uuid) -> SyncResult<bool> {
        let cutoff = Utc::now() - Duration::minutes(UNSAVED_WINDOW_MINUTES);
        let count = self
            .operations
            .count_authored_since(room_id, user_id, cutoff)
            .await?;
        Ok(count > 0)
    }

    pub async fn is_recovery_in_progress(&self, room_id: Uuid) -> SyncResult<bool> {
        Ok(self.backups.lock_active(room_id).await?)
    }

    pub async fn get_recovery_state(
        &self,
        room_id: Uuid,
        user: &AuthUser,
    ) -> SyncResult<RecoveryState> {
        self.require_room(room_id).await?;
        let connection = match self.participants.find(room_id, user.id).await? {
            Some(p) => {
                ConnectionStatus::parse(&p.connection).unwrap_or(ConnectionStatus::Disconnected)
            }
            None => ConnectionStatus::Disconnected,
        };

        let now = Utc::now();
        let backups = self
            .backups
            .list_for_room(room_id)
            .await?
            .iter()
            .map(|model| {
                let mut info = BackupRepository::model_to_info(model);
                info.is_expired = info.is_expired || info.expires_at < now;
                info
            })
            .collect();

        Ok(RecoveryState {
            connection,
            backups,
            recovery_in_progress: self.is_recovery_in_progress(room_id).await?,
            has_unsaved_changes: self.has_unsaved_changes(room_id, user.id).await?,
        })
    }

    pub async fn version_history(&self, room_id: Uuid) -> SyncResult<Vec<VersionInfo>> {
        self.require_room(room_id).await?;
        Ok(self
            .operations
            .list_versions(room_id)
            .await?
            .into_iter()
            .map(|v| VersionInfo {
                version: v.version,
                checksum: v.checksum,
                created_at: v.created_at.with_timezone(&Utc),
            })
            .collect())
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
}

/// Deterministic snapshot of the grid a restore reinstates.
fn restore_snapshot(payload: &BackupPayload) -> serde_json::Value {
    let cells: std::collections::BTreeMap<String, Option<String>> = payload
        .cells
        .iter()
        .map(|c| (c.cell.clone(), c.value.clone()))
        .collect();
    serde_json::json!({
        "version": payload.version,
        "cells": cells,
    })
}
