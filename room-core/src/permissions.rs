use std::collections::HashSet;

use room_types::{ParticipantRole, RoomStatus};

/// Everything a caller might be allowed to do inside a room. The gate is
/// consulted before every mutating path; handlers never re-derive role
/// logic themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomAction {
    CreateRoom,
    InviteParticipant,
    EditCell,
    RevealHint,
    StartSession,
    CompleteSession,
    KickParticipant,
    MuteParticipant,
    BanParticipant,
    PromoteToModerator,
    DemoteModerator,
    TransferHost,
    CreateBackup,
    RestoreBackup,
    ResolveConflicts,
}

#[derive(Debug, Clone, Copy)]
pub struct PermissionContext {
    pub role: ParticipantRole,
    pub is_host: bool,
    pub is_online: bool,
    pub room_status: RoomStatus,
    pub is_private: bool,
    pub has_password: bool,
    pub is_premium: bool,
}

/// Pure authorization function: no clock, no store, no side effects.
pub fn allowed_actions(ctx: &PermissionContext) -> HashSet<RoomAction> {
    let mut actions = HashSet::new();

    // Room creation is subscription-gated and independent of room state.
    if ctx.is_premium {
        actions.insert(RoomAction::CreateRoom);
    }

    // A disconnected participant cannot mutate anything in the room.
    if !ctx.is_online {
        return actions;
    }

    let is_player = ctx.role >= ParticipantRole::Player;
    let is_moderator = ctx.role >= ParticipantRole::Moderator;

    if is_player && ctx.room_status == RoomStatus::Active {
        actions.insert(RoomAction::EditCell);
        actions.insert(RoomAction::RevealHint);
    }

    if is_player {
        // Private rooms only let moderators hand out invites.
        if !ctx.is_private || is_moderator {
            actions.insert(RoomAction::InviteParticipant);
        }
    }

    if is_moderator {
        actions.insert(RoomAction::KickParticipant);
        actions.insert(RoomAction::MuteParticipant);
        actions.insert(RoomAction::BanParticipant);
        actions.insert(RoomAction::ResolveConflicts);
    }

    if ctx.is_host {
        actions.insert(RoomAction::PromoteToModerator);
        actions.insert(RoomAction::DemoteModerator);
        actions.insert(RoomAction::TransferHost);
        actions.insert(RoomAction::CreateBackup);
        actions.insert(RoomAction::RestoreBackup);
        if ctx.room_status == RoomStatus::Waiting {
            actions.insert(RoomAction::StartSession);
        }
        if ctx.room_status == RoomStatus::Active {
            actions.insert(RoomAction::CompleteSession);
        }
    }

    actions
}

pub fn is_allowed(ctx: &PermissionContext, action: RoomAction) -> bool {
    allowed_actions(ctx).contains(&action)
}

/// Moderation hierarchy: the actor must strictly outrank the target, so
/// a host can act on a moderator but never the reverse, and nobody acts
/// on a peer.
pub fn can_moderate(actor: ParticipantRole, target: ParticipantRole) -> bool {
    actor >= ParticipantRole::Moderator && actor > target
}
