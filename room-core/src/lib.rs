pub mod lifecycle;
pub mod permissions;
pub mod transform;

pub use lifecycle::{CleanupPolicy, is_valid_transition};
pub use permissions::{PermissionContext, RoomAction, allowed_actions, can_moderate, is_allowed};
pub use transform::{ApplyOutcome, CellState, OperationalTransformer, Resolution};
