pub mod backup_repository;
pub mod operation_repository;
pub mod participant_repository;
pub mod room_repository;
pub mod transfer_repository;

pub use backup_repository::BackupRepository;
pub use operation_repository::OperationRepository;
pub use participant_repository::ParticipantRepository;
pub use room_repository::RoomRepository;
pub use transfer_repository::TransferRepository;

/// Audit event kinds written to `room_history`.
pub mod history_events {
    pub const ROOM_CREATED: &str = "ROOM_CREATED";
    pub const STATUS_CHANGED: &str = "STATUS_CHANGED";
    pub const CONFLICT_RESOLVED: &str = "CONFLICT_RESOLVED";
    pub const BACKUP_CREATED: &str = "BACKUP_CREATED";
    pub const BACKUP_RESTORED: &str = "BACKUP_RESTORED";
    pub const RECOVERY_STARTED: &str = "RECOVERY_STARTED";
    pub const HOST_TRANSFERRED: &str = "HOST_TRANSFERRED";
}

pub(crate) fn now_fixed() -> sea_orm::prelude::DateTimeWithTimeZone {
    chrono::Utc::now().into()
}
