pub use super::backups::Entity as Backups;
pub use super::host_transfers::Entity as HostTransfers;
pub use super::operations::Entity as Operations;
pub use super::participants::Entity as Participants;
pub use super::puzzle_cells::Entity as PuzzleCells;
pub use super::recovery_locks::Entity as RecoveryLocks;
pub use super::room_history::Entity as RoomHistory;
pub use super::rooms::Entity as Rooms;
pub use super::state_versions::Entity as StateVersions;
