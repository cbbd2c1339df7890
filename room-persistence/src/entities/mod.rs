pub mod backups;
pub mod host_transfers;
pub mod operations;
pub mod participants;
pub mod prelude;
pub mod puzzle_cells;
pub mod recovery_locks;
pub mod room_history;
pub mod rooms;
pub mod state_versions;
