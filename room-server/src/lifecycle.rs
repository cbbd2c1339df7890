use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use room_core::lifecycle::{CleanupPolicy, is_valid_transition};
use room_core::permissions::{PermissionContext, RoomAction, is_allowed};
use room_persistence::entities::rooms;
use room_persistence::repositories::{ParticipantRepository, RoomRepository};
use room_types::{
    CleanupReport, ConnectionStatus, CreateRoomRequest, JoinRoomRequest, ParticipantRole,
    RoomStatistics, RoomStatus, RoomSummary, SyncError, SyncResult,
};

use crate::auth::AuthUser;
use crate::notify::NotificationSink;

const CODE_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_ATTEMPTS: usize = 8;

pub struct RoomLifecycleManager {
    rooms: Arc<RoomRepository>,
    participants: Arc<ParticipantRepository>,
    notifier: Arc<dyn NotificationSink>,
    policy: CleanupPolicy,
}

impl RoomLifecycleManager {
    pub fn new(
        rooms: Arc<RoomRepository>,
        participants: Arc<ParticipantRepository>,
        notifier: Arc<dyn NotificationSink>,
        policy: CleanupPolicy,
    ) -> Self {
        Self {
            rooms,
            participants,
            notifier,
            policy,
        }
    }

    pub async fn create_room(
        &self,
        actor: &AuthUser,
        request: &CreateRoomRequest,
    ) -> SyncResult<RoomSummary> {
        let ctx = PermissionContext {
            role: ParticipantRole::Player,
            is_host: false,
            is_online: true,
            room_status: RoomStatus::Waiting,
            is_private: request.is_private,
            has_password: request.password.is_some(),
            is_premium: actor.is_premium,
        };
        if !is_allowed(&ctx, RoomAction::CreateRoom) {
            return Err(SyncError::authorization(
                "room creation requires a premium subscription",
            ));
        }

        let max_players = request.max_players.unwrap_or(8);
        if !(2..=64).contains(&max_players) {
            return Err(SyncError::validation("max_players must be between 2 and 64"));
        }

        let code = self.unique_code().await?;
        let password_hash = request.password.as_deref().map(hash_password);

        let room_id = Uuid::new_v4();
        let room = self
            .rooms
            .create_room(
                room_id,
                code,
                actor.id,
                max_players,
                request.is_private,
                password_hash,
            )
            .await?;
        self.participants
            .add(room_id, actor.id, ParticipantRole::Host)
            .await?;

        tracing::info!(room = %room_id, host = %actor.id, code = %room.code, "room created");
        self.summarize(&room).await
    }

    pub async fn get_room(&self, room_id: Uuid) -> SyncResult<RoomSummary> {
        let room = self.require_room(room_id).await?;
        self.summarize(&room).await
    }

    pub async fn join_room(
        &self,
        room_id: Uuid,
        user: &AuthUser,
        request: &JoinRoomRequest,
    ) -> SyncResult<RoomSummary> {
        let room = self.require_room(room_id).await?;
        let status = parse_status(&room)?;

        if status == RoomStatus::Expired {
            return Err(SyncError::expired("room has expired"));
        }
        if !matches!(status, RoomStatus::Waiting | RoomStatus::Active) {
            return Err(SyncError::validation("room is not joinable"));
        }

        // Rejoining is a presence update, not a second seat.
        if self.participants.find(room_id, user.id).await?.is_some() {
            self.participants
                .set_connection(room_id, user.id, ConnectionStatus::Connected)
                .await?;
            return self.summarize(&room).await;
        }

        if let Some(hash) = &room.password_hash {
            let supplied = request
                .password
                .as_deref()
                .ok_or_else(|| SyncError::authorization("room requires a password"))?;
            if hash_password(supplied) != *hash {
                return Err(SyncError::authorization("incorrect room password"));
            }
        }

        // Capacity is compared in application code against a live count.
        let seated = self.participants.count(room_id).await?;
        if seated >= room.max_players as u64 {
            return Err(SyncError::validation("room is full"));
        }

        self.participants
            .add(room_id, user.id, ParticipantRole::Player)
            .await?;
        self.rooms.touch_activity(room_id).await?;

        tracing::info!(room = %room_id, user = %user.id, "participant joined");
        self.summarize(&room).await
    }

    pub async fn leave_room(&self, room_id: Uuid, user: &AuthUser) -> SyncResult<()> {
        let room = self.require_room(room_id).await?;
        if self.participants.find(room_id, user.id).await?.is_none() {
            return Err(SyncError::not_found("not a participant of this room"));
        }
        // Every permission check assumes exactly one host, so the host
        // cannot walk out on a populated room; the seat moves first.
        if room.host_user_id == user.id && self.participants.count(room_id).await? > 1 {
            return Err(SyncError::validation(
                "host must transfer host rights before leaving",
            ));
        }
        self.participants.remove(room_id, user.id).await?;
        self.rooms.touch_activity(room_id).await?;
        tracing::info!(room = %room_id, user = %user.id, "participant left");
        Ok(())
    }

    /// Caller-driven status change (start, pause, complete, expire).
    /// Sweeps call `transition_room_status` directly; this wraps it with
    /// the permission gate for the HTTP edge.
    pub async fn request_transition(
        &self,
        room_id: Uuid,
        user: &AuthUser,
        to: RoomStatus,
        reason: Option<&str>,
    ) -> SyncResult<RoomSummary> {
        let room = self.require_room(room_id).await?;
        let from = parse_status(&room)?;

        // An impossible edge is a validation error no matter who asks;
        // checking it first keeps the gate from masking it as 403.
        if !is_valid_transition(from, to) {
            return Err(SyncError::validation(format!(
                "invalid transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let participant = self
            .participants
            .find(room_id, user.id)
            .await?
            .ok_or_else(|| SyncError::authorization("not a participant of this room"))?;
        let ctx = crate::sync::participant_context(&room, &participant, from);

        let permitted = match to {
            RoomStatus::Active => is_allowed(&ctx, RoomAction::StartSession),
            RoomStatus::Completed => is_allowed(&ctx, RoomAction::CompleteSession),
            // Pausing back to the lobby or force-expiring is host-only.
            RoomStatus::Waiting | RoomStatus::Expired => ctx.is_host && ctx.is_online,
        };
        if !permitted {
            return Err(SyncError::authorization(format!(
                "not permitted to move room to {}",
                to.as_str()
            )));
        }

        if !self
            .transition_room_status(room_id, from, to, reason, Some(user.id))
            .await?
        {
            return Err(SyncError::conflict("room status changed concurrently"));
        }

        let room = self.require_room(room_id).await?;
        self.summarize(&room).await
    }

    /// Move a room along one lifecycle edge. Returns false when the room
    /// was no longer in `from` (a concurrent caller got there first); the
    /// row and the audit log are untouched in that case.
    pub async fn transition_room_status(
        &self,
        room_id: Uuid,
        from: RoomStatus,
        to: RoomStatus,
        reason: Option<&str>,
        actor: Option<Uuid>,
    ) -> SyncResult<bool> {
        if !is_valid_transition(from, to) {
            return Err(SyncError::validation(format!(
                "invalid transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let applied = self
            .rooms
            .transition_status(room_id, from, to, reason.unwrap_or(""), actor)
            .await?;
        if !applied {
            return Ok(false);
        }

        tracing::info!(
            room = %room_id,
            from = from.as_str(),
            to = to.as_str(),
            reason = reason.unwrap_or(""),
            "room status changed"
        );

        let (title, body) = match to {
            RoomStatus::Active => ("Session Started".to_string(), "The session is live".into()),
            RoomStatus::Completed => (
                "Session Completed".to_string(),
                "The session has finished".into(),
            ),
            RoomStatus::Expired => (
                format!("Room Expired: {}", reason.unwrap_or("expired")),
                "The room is no longer available".into(),
            ),
            RoomStatus::Waiting => (
                "Session Paused".to_string(),
                String::from("The session returned to the lobby"),
            ),
        };

        // Best-effort fanout after commit; failures never undo the change.
        for participant in self.participants.list(room_id).await? {
            if Some(participant.user_id) == actor {
                continue;
            }
            self.notifier
                .notify(participant.user_id, &title, &body)
                .await;
        }

        Ok(true)
    }

    /// WAITING/ACTIVE rooms older than the policy's max age are expired.
    pub async fn expire_old_rooms(&self) -> SyncResult<u64> {
        let cutoff = Utc::now() - self.policy.max_age;
        let mut expired = 0;
        for room in self.rooms.find_aged_candidates(cutoff).await? {
            let status = parse_status(&room)?;
            if self
                .transition_room_status(room.id, status, RoomStatus::Expired, Some("max age exceeded"), None)
                .await?
            {
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Rooms with no activity inside the inactivity window are expired.
    pub async fn expire_inactive_rooms(&self) -> SyncResult<u64> {
        let cutoff = Utc::now() - self.policy.max_inactivity;
        let mut expired = 0;
        for room in self.rooms.find_inactive_candidates(cutoff).await? {
            let status = parse_status(&room)?;
            if self
                .transition_room_status(room.id, status, RoomStatus::Expired, Some("inactive"), None)
                .await?
            {
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Live rooms whose roster emptied out are expired immediately.
    pub async fn cleanup_empty_rooms(&self) -> SyncResult<u64> {
        let mut expired = 0;
        for room in self.rooms.find_live_rooms().await? {
            if self.participants.count(room.id).await? > 0 {
                continue;
            }
            let status = parse_status(&room)?;
            if self
                .transition_room_status(room.id, status, RoomStatus::Expired, Some("empty"), None)
                .await?
            {
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// EXPIRED rooms past the retention window are hard-deleted together
    /// with everything hanging off them.
    pub async fn cleanup_expired_rooms(&self) -> SyncResult<u64> {
        let cutoff = Utc::now() - self.policy.retention;
        let mut deleted = 0;
        for room in self.rooms.find_expired_before(cutoff).await? {
            self.rooms.hard_delete(room.id).await?;
            tracing::info!(room = %room.id, "expired room deleted");
            deleted += 1;
        }
        Ok(deleted)
    }

    /// One full sweep pass. Every stage is idempotent, so overlapping or
    /// repeated runs converge on the same state.
    pub async fn run_cleanup(&self) -> SyncResult<CleanupReport> {
        let aged = self.expire_old_rooms().await?;
        let inactive = self.expire_inactive_rooms().await?;
        let empty = self.cleanup_empty_rooms().await?;
        let deleted = self.cleanup_expired_rooms().await?;
        Ok(CleanupReport {
            expired_rooms: aged + inactive,
            empty_rooms_expired: empty,
            deleted_rooms: deleted,
        })
    }

    pub async fn get_statistics(&self) -> SyncResult<RoomStatistics> {
        Ok(self.rooms.statistics().await?)
    }

    async fn require_room(&self, room_id: Uuid) -> SyncResult<rooms::Model> {
        self.rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| SyncError::not_found("room not found"))
    }

    async fn summarize(&self, room: &rooms::Model) -> SyncResult<RoomSummary> {
        let count = self.participants.count(room.id).await?;
        Ok(RoomSummary {
            id: room.id,
            code: room.code.clone(),
            status: parse_status(room)?,
            version: room.version,
            host_user_id: room.host_user_id,
            max_players: room.max_players,
            participant_count: count as i64,
            is_private: room.is_private,
            has_password: room.password_hash.is_some(),
            created_at: room.created_at.with_timezone(&Utc),
            started_at: room.started_at.map(|t| t.with_timezone(&Utc)),
            completed_at: room.completed_at.map(|t| t.with_timezone(&Utc)),
            last_activity_at: room.last_activity_at.with_timezone(&Utc),
        })
    }

    async fn unique_code(&self) -> SyncResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code();
            if !self.rooms.code_exists(&code).await? {
                return Ok(code);
            }
        }
        Err(SyncError::internal("could not allocate a unique room code"))
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn parse_status(room: &rooms::Model) -> SyncResult<RoomStatus> {
    RoomStatus::parse(&room.status)
        .ok_or_else(|| SyncError::internal(format!("corrupt room status '{}'", room.status)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_use_charset() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn test_password_hash_is_stable() {
        assert_eq!(hash_password("hunter2"), hash_password("hunter2"));
        assert_ne!(hash_password("hunter2"), hash_password("hunter3"));
    }
}
