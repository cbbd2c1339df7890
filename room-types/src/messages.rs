use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    BackupId, ConflictEntry, ConflictStrategy, ConnectionStatus, HostTransferInfo, Operation,
    OperationId, SubmittedOperation, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncRequest {
    pub operations: Vec<SubmittedOperation>,
    pub last_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncResponse {
    /// Everything committed after the client's `last_version`, including
    /// its own just-accepted operations.
    pub operations: Vec<Operation>,
    pub conflicts: Vec<ConflictEntry>,
    pub version: i64,
    pub requires_resolution: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolveRequest {
    pub strategy: ConflictStrategy,
    /// Operation ids to retain; required for MANUAL_RESOLUTION.
    pub selected_operation_ids: Option<Vec<OperationId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolveResponse {
    pub version: i64,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateRoomRequest {
    pub max_players: Option<i32>,
    #[serde(default)]
    pub is_private: bool,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JoinRoomRequest {
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusChangeRequest {
    pub status: crate::RoomStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RecoveryAction {
    CreateBackup,
    RestoreBackup,
    RecoverSession,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecoveryRequest {
    pub action: RecoveryAction,
    pub backup_id: Option<BackupId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BackupInfo {
    pub id: BackupId,
    pub created_by: UserId,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_corrupted: bool,
    pub is_expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecoveryState {
    pub connection: ConnectionStatus,
    pub backups: Vec<BackupInfo>,
    pub recovery_in_progress: bool,
    pub has_unsaved_changes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TransferAction {
    Initiate,
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferRequest {
    pub action: TransferAction,
    pub target_user_id: Option<UserId>,
    /// Only meaningful for `confirm`; false declines the transfer.
    pub accept: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferState {
    pub pending: Option<HostTransferInfo>,
    pub history: Vec<HostTransferInfo>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CleanupReport {
    pub expired_rooms: u64,
    pub empty_rooms_expired: u64,
    pub deleted_rooms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoomStatistics {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub expired: u64,
    pub average_age_seconds: f64,
    pub average_session_seconds: f64,
}
