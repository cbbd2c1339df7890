use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{OperationId, RoomId, UserId};

/// A single grid cell, addressed the way the client renders it ("A1", "C7").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct CellRef(pub String);

impl CellRef {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every edit a client can submit, one variant per kind so transform and
/// merge logic stay exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum OperationKind {
    CellEdit { cell: CellRef, value: String },
    CellClear { cell: CellRef },
    HintReveal { cell: CellRef, value: String },
}

impl OperationKind {
    pub fn cell(&self) -> &CellRef {
        match self {
            OperationKind::CellEdit { cell, .. } => cell,
            OperationKind::CellClear { cell } => cell,
            OperationKind::HintReveal { cell, .. } => cell,
        }
    }

    /// The value this operation leaves in its cell, None for a clear.
    pub fn resulting_value(&self) -> Option<&str> {
        match self {
            OperationKind::CellEdit { value, .. } => Some(value),
            OperationKind::CellClear { .. } => None,
            OperationKind::HintReveal { value, .. } => Some(value),
        }
    }
}

/// An accepted operation in a room's log. Immutable once committed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Operation {
    pub id: OperationId,
    pub room_id: RoomId,
    pub author_id: UserId,
    #[serde(flatten)]
    #[ts(flatten)]
    pub kind: OperationKind,
    /// Room version the client had observed when it produced this edit.
    pub base_version: i64,
    /// Version this operation produced when it was committed.
    pub committed_version: i64,
    pub client_ts: DateTime<Utc>,
    pub conflicted: bool,
}

/// As submitted by a client; the server supplies room and author.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SubmittedOperation {
    pub id: OperationId,
    #[serde(flatten)]
    #[ts(flatten)]
    pub kind: OperationKind,
    pub base_version: i64,
    pub client_ts: DateTime<Utc>,
}

/// Two operations that targeted the same cell; the first committed one
/// holds the cell until someone resolves.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConflictEntry {
    pub cell: CellRef,
    pub winning_operation_id: OperationId,
    pub losing_operation_id: OperationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ConflictStrategy {
    LastWriteWins,
    FirstWriteWins,
    ManualResolution,
    AutomaticMerge,
}
