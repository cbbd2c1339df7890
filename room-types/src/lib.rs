pub mod errors;
pub mod messages;
pub mod operation;
pub mod room;

pub use errors::*;
pub use messages::*;
pub use operation::*;
pub use room::*;

pub type RoomId = uuid::Uuid;
pub type UserId = uuid::Uuid;
pub type OperationId = uuid::Uuid;
pub type BackupId = uuid::Uuid;
pub type TransferId = uuid::Uuid;
