use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{RoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RoomStatus {
    Waiting,   // Created, participants gathering
    Active,    // Session in progress
    Completed, // Session finished normally
    Expired,   // Aged out, emptied out, or force-expired by a sweep
}

/// Roles ordered by authority: declaration order gives
/// Spectator < Player < Moderator < Host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ParticipantRole {
    Spectator,
    Player,
    Moderator,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::Completed => "completed",
            RoomStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RoomStatus::Waiting),
            "active" => Some(RoomStatus::Active),
            "completed" => Some(RoomStatus::Completed),
            "expired" => Some(RoomStatus::Expired),
            _ => None,
        }
    }
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Spectator => "spectator",
            ParticipantRole::Player => "player",
            ParticipantRole::Moderator => "moderator",
            ParticipantRole::Host => "host",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spectator" => Some(ParticipantRole::Spectator),
            "player" => Some(ParticipantRole::Player),
            "moderator" => Some(ParticipantRole::Moderator),
            "host" => Some(ParticipantRole::Host),
            _ => None,
        }
    }
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(ConnectionStatus::Connected),
            "disconnected" => Some(ConnectionStatus::Disconnected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoomSummary {
    pub id: RoomId,
    pub code: String,
    pub status: RoomStatus,
    pub version: i64,
    pub host_user_id: UserId,
    pub max_players: i32,
    pub participant_count: i64,
    pub is_private: bool,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub connection: ConnectionStatus,
    pub joined_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferStatus::Pending),
            "completed" => Some(TransferStatus::Completed),
            "cancelled" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HostTransferInfo {
    pub id: crate::TransferId,
    pub room_id: RoomId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_authority() {
        assert!(ParticipantRole::Host > ParticipantRole::Moderator);
        assert!(ParticipantRole::Moderator > ParticipantRole::Player);
        assert!(ParticipantRole::Player > ParticipantRole::Spectator);
    }
}
