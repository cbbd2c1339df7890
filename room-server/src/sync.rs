use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use room_core::permissions::{PermissionContext, RoomAction, is_allowed};
use room_core::transform::OperationalTransformer;
use room_persistence::entities::{participants, rooms};
use room_persistence::repositories::{
    OperationRepository, ParticipantRepository, RoomRepository,
};
use room_types::{
    ConflictEntry, ConnectionStatus, Operation, OperationKind, ParticipantRole, ResolveRequest,
    ResolveResponse, RoomStatus, SyncError, SyncRequest, SyncResponse, SyncResult,
};

use crate::auth::AuthUser;
use crate::lifecycle::parse_status;

/// Per-room in-memory sync state, guarded by its own mutex so distinct
/// rooms never contend.
struct RoomSyncState {
    transformer: OperationalTransformer,
}

/// Serializes all log/version/cell mutations per room. State is hydrated
/// from the store on first touch and dropped whenever a path rewrites the
/// store underneath it (restore, failed persist).
pub struct SyncCoordinator {
    rooms: Arc<RoomRepository>,
    participants: Arc<ParticipantRepository>,
    operations: Arc<OperationRepository>,
    states: DashMap<Uuid, Arc<Mutex<RoomSyncState>>>,
}

impl SyncCoordinator {
    pub fn new(
        rooms: Arc<RoomRepository>,
        participants: Arc<ParticipantRepository>,
        operations: Arc<OperationRepository>,
    ) -> Self {
        Self {
            rooms,
            participants,
            operations,
            states: DashMap::new(),
        }
    }

    pub async fn submit_operations(
        &self,
        room_id: Uuid,
        user: &AuthUser,
        request: SyncRequest,
    ) -> SyncResult<SyncResponse> {
        let room = self.require_room(room_id).await?;
        let status = parse_status(&room)?;
        if status == RoomStatus::Expired {
            return Err(SyncError::expired("room has expired"));
        }

        let participant = self.require_participant(room_id, user.id).await?;
        let ctx = participant_context(&room, &participant, status);
        for op in &request.operations {
            let action = match op.kind {
                OperationKind::HintReveal { .. } => RoomAction::RevealHint,
                _ => RoomAction::EditCell,
            };
            if !is_allowed(&ctx, action) {
                return Err(SyncError::authorization(
                    "not permitted to edit cells in this room",
                ));
            }
        }

        let state = self.entry(room_id, &room).await?;
        let mut guard = state.lock().await;

        // Validate the whole batch before mutating anything; validation
        // only compares against the current version, which apply can only
        // grow, so a batch that passes here passes during apply too.
        for op in &request.operations {
            guard.transformer.validate_operation(op)?;
        }

        let prior_version = guard.transformer.version();
        let mut accepted: Vec<Operation> = Vec::new();
        let mut conflicts: Vec<ConflictEntry> = Vec::new();
        for op in request.operations {
            let outcome = guard.transformer.apply_operation(user.id, op)?;
            if !outcome.duplicate {
                accepted.push(outcome.operation);
            }
            conflicts.extend(outcome.conflicts);
        }

        // The stamp is conditional on the version this state hydrated
        // from; if a concurrent restore rewrote the store, the cached
        // state is thrown away rather than clobbering the restored room.
        let version = guard.transformer.version();
        match self
            .operations
            .persist_accepted(room_id, &accepted, prior_version, version)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                drop(guard);
                self.invalidate(room_id);
                return Err(SyncError::conflict(
                    "room state changed concurrently, resync and retry",
                ));
            }
            Err(err) => {
                // In-memory state ran ahead of the store; drop it and
                // rebuild from the store on the next touch.
                drop(guard);
                self.invalidate(room_id);
                return Err(SyncError::internal(format!(
                    "failed to persist operations: {}",
                    err
                )));
            }
        }

        let operations = guard.transformer.operations_since(request.last_version);
        let requires_resolution = !conflicts.is_empty();

        tracing::debug!(
            room = %room_id,
            user = %user.id,
            accepted = accepted.len(),
            conflicts = conflicts.len(),
            version,
            "sync applied"
        );

        Ok(SyncResponse {
            operations,
            conflicts,
            version,
            requires_resolution,
        })
    }

    /// Read-only catch-up: everything committed strictly after `since`.
    pub async fn operations_since(
        &self,
        room_id: Uuid,
        since: i64,
    ) -> SyncResult<Vec<Operation>> {
        self.require_room(room_id).await?;
        Ok(self.operations.list_since(room_id, since).await?)
    }

    pub async fn resolve_conflicts(
        &self,
        room_id: Uuid,
        user: &AuthUser,
        request: ResolveRequest,
    ) -> SyncResult<ResolveResponse> {
        let room = self.require_room(room_id).await?;
        let status = parse_status(&room)?;
        if status == RoomStatus::Expired {
            return Err(SyncError::expired("room has expired"));
        }

        let participant = self.require_participant(room_id, user.id).await?;
        let ctx = participant_context(&room, &participant, status);
        if !is_allowed(&ctx, RoomAction::ResolveConflicts) {
            return Err(SyncError::authorization(
                "conflict resolution requires host or moderator",
            ));
        }

        let roles = self.participants.roles_map(room_id).await?;

        let state = self.entry(room_id, &room).await?;
        let mut guard = state.lock().await;

        let resolution = guard.transformer.resolve_conflicts(
            request.strategy,
            request.selected_operation_ids.as_deref(),
            &roles,
        )?;

        let snapshot = grid_snapshot(&guard.transformer, resolution.version);
        let checksum = crate::sha256_hex(snapshot.to_string().as_bytes());

        match self
            .operations
            .apply_resolution(
                room_id,
                resolution.version - 1,
                resolution.version,
                &resolution.operations,
                request.strategy,
                user.id,
                snapshot,
                checksum,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                drop(guard);
                self.invalidate(room_id);
                return Err(SyncError::conflict(
                    "room state changed concurrently, resync and retry",
                ));
            }
            Err(err) => {
                drop(guard);
                self.invalidate(room_id);
                return Err(SyncError::internal(format!(
                    "failed to persist resolution: {}",
                    err
                )));
            }
        }

        tracing::info!(
            room = %room_id,
            user = %user.id,
            strategy = ?request.strategy,
            version = resolution.version,
            survivors = resolution.operations.len(),
            "conflicts resolved"
        );

        Ok(ResolveResponse {
            version: resolution.version,
            operations: resolution.operations,
        })
    }

    /// Drop the cached state for a room; the next touch rehydrates from
    /// the store. Called after restores and persist failures.
    pub fn invalidate(&self, room_id: Uuid) {
        self.states.remove(&room_id);
    }

    async fn entry(
        &self,
        room_id: Uuid,
        room: &rooms::Model,
    ) -> SyncResult<Arc<Mutex<RoomSyncState>>> {
        if let Some(existing) = self.states.get(&room_id) {
            return Ok(existing.clone());
        }

        let log = self.operations.list_for_room(room_id).await?;
        let transformer = OperationalTransformer::hydrate(room_id, room.version, log);

        // A racing hydration may have won; keep whichever got in first.
        let entry = self
            .states
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomSyncState { transformer })));
        Ok(entry.clone())
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

/// Build the permission context for one participant in one room.
pub(crate) fn participant_context(
    room: &rooms::Model,
    participant: &participants::Model,
    status: RoomStatus,
) -> PermissionContext {
    let role = ParticipantRole::parse(&participant.role).unwrap_or(ParticipantRole::Spectator);
    let connection =
        ConnectionStatus::parse(&participant.connection).unwrap_or(ConnectionStatus::Disconnected);
    PermissionContext {
        role,
        is_host: room.host_user_id == participant.user_id,
        is_online: connection == ConnectionStatus::Connected,
        room_status: status,
        is_private: room.is_private,
        has_password: room.password_hash.is_some(),
        is_premium: false,
    }
}

fn grid_snapshot(transformer: &OperationalTransformer, version: i64) -> serde_json::Value {
    // BTreeMap keeps the snapshot byte-stable for checksumming.
    let cells: BTreeMap<String, Option<String>> = transformer
        .cells()
        .iter()
        .map(|(cell, state)| (cell.as_str().to_string(), state.value.clone()))
        .collect();
    serde_json::json!({
        "version": version,
        "cells": cells,
    })
}
