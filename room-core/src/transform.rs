use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use room_types::{
    CellRef, ConflictEntry, ConflictStrategy, Operation, OperationId, ParticipantRole, RoomId,
    SubmittedOperation, SyncError, SyncResult, UserId,
};

const MAX_CELL_LABEL_LEN: usize = 16;
const MAX_VALUE_LEN: usize = 256;

/// Authoritative value of one grid cell, with the operation that wrote it.
#[derive(Debug, Clone)]
pub struct CellState {
    pub value: Option<String>,
    pub operation_id: OperationId,
    pub updated_by: UserId,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying one submitted operation.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub operation: Operation,
    pub conflicts: Vec<ConflictEntry>,
    /// True when the id was seen before; nothing changed.
    pub duplicate: bool,
}

/// Result of a conflict resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub version: i64,
    pub operations: Vec<Operation>,
}

/// Per-room operation log and version counter. All conflict detection is
/// at single-cell granularity: disjoint cells never conflict, same-cell
/// concurrent edits are resolved by commit order until someone runs an
/// explicit resolution.
#[derive(Debug)]
pub struct OperationalTransformer {
    room_id: RoomId,
    version: i64,
    log: Vec<Operation>,
    seen: HashSet<OperationId>,
    cells: HashMap<CellRef, CellState>,
}

impl OperationalTransformer {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            version: 0,
            log: Vec::new(),
            seen: HashSet::new(),
            cells: HashMap::new(),
        }
    }

    /// Rebuild from a persisted log. `version` is the room's stored version
    /// and must be at least the highest committed version in the log.
    pub fn hydrate(room_id: RoomId, version: i64, log: Vec<Operation>) -> Self {
        let mut transformer = Self::new(room_id);
        transformer.version = version;
        for op in &log {
            transformer.seen.insert(op.id);
            if !op.conflicted {
                transformer.write_cell(op);
            }
        }
        transformer.log = log;
        transformer
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn log(&self) -> &[Operation] {
        &self.log
    }

    pub fn cell_value(&self, cell: &CellRef) -> Option<&str> {
        self.cells.get(cell).and_then(|c| c.value.as_deref())
    }

    pub fn cells(&self) -> &HashMap<CellRef, CellState> {
        &self.cells
    }

    pub fn validate_operation(&self, op: &SubmittedOperation) -> SyncResult<()> {
        let cell = op.kind.cell();
        if cell.as_str().is_empty() || cell.as_str().len() > MAX_CELL_LABEL_LEN {
            return Err(SyncError::validation(format!(
                "invalid cell label '{}'",
                cell
            )));
        }
        if let Some(value) = op.kind.resulting_value() {
            if value.len() > MAX_VALUE_LEN {
                return Err(SyncError::validation(format!(
                    "value for cell {} exceeds {} bytes",
                    cell, MAX_VALUE_LEN
                )));
            }
        }
        if op.base_version < 0 {
            return Err(SyncError::validation("negative base version"));
        }
        if op.base_version > self.version {
            // A client cannot have observed a version we never issued.
            return Err(SyncError::validation(format!(
                "base version {} is ahead of room version {}",
                op.base_version, self.version
            )));
        }
        Ok(())
    }

    /// Transform `op` against everything committed after its base version
    /// and accept it into the log. A same-cell overlap keeps the earlier
    /// commit as the cell's value and flags the newcomer, pairing both ids
    /// in a conflict entry rather than dropping it.
    pub fn apply_operation(
        &mut self,
        author_id: UserId,
        op: SubmittedOperation,
    ) -> SyncResult<ApplyOutcome> {
        if self.seen.contains(&op.id) {
            let operation = self
                .log
                .iter()
                .find(|logged| logged.id == op.id)
                .cloned()
                // The id was dropped by a past resolution; echo the replay
                // without assigning it a version.
                .unwrap_or_else(|| Operation {
                    id: op.id,
                    room_id: self.room_id,
                    author_id,
                    kind: op.kind.clone(),
                    base_version: op.base_version,
                    committed_version: 0,
                    client_ts: op.client_ts,
                    conflicted: false,
                });
            return Ok(ApplyOutcome {
                operation,
                conflicts: Vec::new(),
                duplicate: true,
            });
        }

        self.validate_operation(&op)?;

        let cell = op.kind.cell().clone();
        let mut conflicts = Vec::new();
        if let Some(current) = self.cells.get(&cell) {
            // Only an overlap the client could not have seen is a conflict;
            // an edit based on the current version is a plain overwrite.
            if let Some(owner) = self.log.iter().find(|logged| logged.id == current.operation_id) {
                if owner.committed_version > op.base_version {
                    conflicts.push(ConflictEntry {
                        cell: cell.clone(),
                        winning_operation_id: owner.id,
                        losing_operation_id: op.id,
                    });
                }
            }
        }

        self.version += 1;
        let operation = Operation {
            id: op.id,
            room_id: self.room_id,
            author_id,
            kind: op.kind,
            base_version: op.base_version,
            committed_version: self.version,
            client_ts: op.client_ts,
            conflicted: !conflicts.is_empty(),
        };

        if !operation.conflicted {
            self.write_cell(&operation);
        }
        self.seen.insert(operation.id);
        self.log.push(operation.clone());

        Ok(ApplyOutcome {
            operation,
            conflicts,
            duplicate: false,
        })
    }

    /// All operations committed strictly after `version`, for catch-up
    /// reads that submit nothing.
    pub fn operations_since(&self, version: i64) -> Vec<Operation> {
        self.log
            .iter()
            .filter(|op| op.committed_version > version)
            .cloned()
            .collect()
    }

    /// Replace the log with the strategy's survivors and issue one new
    /// version covering the whole pass.
    pub fn resolve_conflicts(
        &mut self,
        strategy: ConflictStrategy,
        selected: Option<&[OperationId]>,
        roles: &HashMap<UserId, ParticipantRole>,
    ) -> SyncResult<Resolution> {
        if self.log.is_empty() {
            return Err(SyncError::validation("no operations to resolve"));
        }

        let mut by_cell: HashMap<CellRef, Vec<&Operation>> = HashMap::new();
        for op in &self.log {
            by_cell.entry(op.kind.cell().clone()).or_default().push(op);
        }

        let retained_ids: HashSet<OperationId> = match strategy {
            ConflictStrategy::LastWriteWins => by_cell
                .values()
                .filter_map(|ops| {
                    ops.iter()
                        .max_by_key(|op| (op.client_ts, op.id))
                        .map(|op| op.id)
                })
                .collect(),
            ConflictStrategy::FirstWriteWins => by_cell
                .values()
                .filter_map(|ops| {
                    ops.iter()
                        .min_by_key(|op| (op.client_ts, op.id))
                        .map(|op| op.id)
                })
                .collect(),
            ConflictStrategy::ManualResolution => {
                let selected = selected.ok_or_else(|| {
                    SyncError::validation("manual resolution requires selected operation ids")
                })?;
                if selected.is_empty() {
                    return Err(SyncError::validation(
                        "manual resolution requires at least one operation id",
                    ));
                }
                let mut selected_cells: HashSet<&CellRef> = HashSet::new();
                for id in selected {
                    let op = self
                        .log
                        .iter()
                        .find(|op| op.id == *id)
                        .ok_or_else(|| {
                            SyncError::validation(format!("unknown operation id {}", id))
                        })?;
                    if !selected_cells.insert(op.kind.cell()) {
                        return Err(SyncError::validation(format!(
                            "multiple selected operations for cell {}",
                            op.kind.cell()
                        )));
                    }
                }
                // Selected ops win their cells; cells the selection does not
                // touch keep their full history.
                self.log
                    .iter()
                    .filter(|op| {
                        selected.contains(&op.id) || !selected_cells.contains(op.kind.cell())
                    })
                    .map(|op| op.id)
                    .collect()
            }
            ConflictStrategy::AutomaticMerge => by_cell
                .values()
                .filter_map(|ops| {
                    ops.iter()
                        .max_by(|a, b| {
                            let rank = |op: &Operation| {
                                roles
                                    .get(&op.author_id)
                                    .copied()
                                    .unwrap_or(ParticipantRole::Spectator)
                            };
                            // Highest role wins; equal roles prefer the
                            // earliest timestamp, then the lower id.
                            rank(a)
                                .cmp(&rank(b))
                                .then_with(|| b.client_ts.cmp(&a.client_ts))
                                .then_with(|| b.id.cmp(&a.id))
                        })
                        .map(|op| op.id)
                })
                .collect(),
        };

        let mut resolved: Vec<Operation> = self
            .log
            .iter()
            .filter(|op| retained_ids.contains(&op.id))
            .map(|op| Operation {
                conflicted: false,
                ..op.clone()
            })
            .collect();
        resolved.sort_by_key(|op| op.committed_version);

        // The pass is one new version, and survivors are restamped onto it
        // so a catch-up from any pre-resolution version sees the resolved
        // log rather than an empty tail.
        self.version += 1;
        for op in &mut resolved {
            op.committed_version = self.version;
        }

        self.cells.clear();
        for op in &resolved {
            self.write_cell(op);
        }
        self.log = resolved.clone();

        Ok(Resolution {
            version: self.version,
            operations: resolved,
        })
    }

    fn write_cell(&mut self, op: &Operation) {
        self.cells.insert(
            op.kind.cell().clone(),
            CellState {
                value: op.kind.resulting_value().map(str::to_owned),
                operation_id: op.id,
                updated_by: op.author_id,
                updated_at: op.client_ts,
            },
        );
    }
}
