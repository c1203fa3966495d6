//! Tube Position Store
//!
//! Sparse logical-position -> stitch map for one (learner, tube) pair.
//!
//! Terminology:
//! - Logical position: sparse key in `1..=max_position`, gaps allowed
//! - Physical position: 1-based rank among occupied logical positions
//! - Active unit: the stitch at physical position 1
//!
//! Invariants:
//! - Keys are unique and inside the configured bound
//! - Ascending logical position implies ascending physical position
//! - Every mutation validates first and either fully applies or leaves the map untouched
//!
//! Not safe for concurrent mutation of the same (learner, tube); callers serialize.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::template::DefaultLayout;
use crate::types::{
    ErrorCategory, LogicalPosition, PhysicalPosition, PositionMap, SkipNumber, StitchId, TubeId,
    MIN_LOGICAL_POSITION,
};

// ==================== Errors ====================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("logical position {position} outside 1..={max}")]
    InvalidPositionRange {
        position: LogicalPosition,
        max: LogicalPosition,
    },
    #[error("no stitch at logical position {position}")]
    PositionNotFound { position: LogicalPosition },
    #[error("logical position {position} already holds {occupant}")]
    PositionOccupied {
        position: LogicalPosition,
        occupant: StitchId,
    },
    #[error("expected {expected} at logical position {position}, found {found}")]
    UnitMismatch {
        position: LogicalPosition,
        expected: StitchId,
        found: StitchId,
    },
    #[error("compression would break ordering: {detail}")]
    CompressionWouldBreakOrdering { detail: String },
    #[error("{tube} already initialized for learner {learner_id}")]
    AlreadyInitialized { learner_id: String, tube: TubeId },
    #[error("invalid default layout: {0}")]
    InvalidLayout(String),
}

impl PositionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PositionError::InvalidPositionRange { .. }
            | PositionError::PositionNotFound { .. } => ErrorCategory::Lookup,
            PositionError::PositionOccupied { .. } | PositionError::UnitMismatch { .. } => {
                ErrorCategory::Conflict
            }
            PositionError::CompressionWouldBreakOrdering { .. } => ErrorCategory::Invariant,
            PositionError::AlreadyInitialized { .. } | PositionError::InvalidLayout(_) => {
                ErrorCategory::DomainState
            }
        }
    }
}

// ==================== Operation Types ====================

/// Request to move one stitch between logical positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOp {
    pub unit_id: StitchId,
    pub from: LogicalPosition,
    pub to: LogicalPosition,
    /// Shift occupants of the range between `from` (exclusive) and `to`
    /// (inclusive) one slot toward `from` instead of rejecting an occupied `to`
    pub shift_others: bool,
}

/// A stitch displaced by a move or compression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftedUnit {
    pub unit_id: StitchId,
    pub from: LogicalPosition,
    pub to: LogicalPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub unit_id: StitchId,
    pub from: LogicalPosition,
    pub to: LogicalPosition,
    pub shifted: Vec<ShiftedUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    /// The compressed map (a preview when `dry_run` is set)
    pub map: PositionMap,
    pub positions_changed: usize,
    pub moves: Vec<ShiftedUnit>,
    pub gaps_removed: usize,
    pub order_preserved: bool,
    pub dry_run: bool,
}

// ==================== Position Store ====================

/// Deserialization runs `verify_consistency`, so a stored row with keys out
/// of range or a stitch listed twice is rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PositionStoreRepr", into = "PositionStoreRepr")]
pub struct PositionStore {
    learner_id: String,
    tube: TubeId,
    max_position: LogicalPosition,
    initialized: bool,
    positions: PositionMap,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionStoreRepr {
    learner_id: String,
    tube: TubeId,
    max_position: LogicalPosition,
    #[serde(default)]
    initialized: bool,
    #[serde(default)]
    positions: PositionMap,
}

impl TryFrom<PositionStoreRepr> for PositionStore {
    type Error = PositionError;

    fn try_from(repr: PositionStoreRepr) -> Result<Self, Self::Error> {
        let store = Self {
            learner_id: repr.learner_id,
            tube: repr.tube,
            max_position: repr.max_position,
            initialized: repr.initialized,
            positions: repr.positions,
        };
        store.verify_consistency()?;
        Ok(store)
    }
}

impl From<PositionStore> for PositionStoreRepr {
    fn from(store: PositionStore) -> Self {
        Self {
            learner_id: store.learner_id,
            tube: store.tube,
            max_position: store.max_position,
            initialized: store.initialized,
            positions: store.positions,
        }
    }
}

impl PositionStore {
    /// Empty, uninitialized store
    pub fn new(learner_id: impl Into<String>, tube: TubeId, max_position: LogicalPosition) -> Self {
        Self {
            learner_id: learner_id.into(),
            tube,
            max_position,
            initialized: false,
            positions: PositionMap::new(),
        }
    }

    /// Store seeded directly from an existing map
    pub fn from_map(
        learner_id: impl Into<String>,
        tube: TubeId,
        max_position: LogicalPosition,
        positions: PositionMap,
    ) -> Result<Self, PositionError> {
        let store = Self {
            learner_id: learner_id.into(),
            tube,
            max_position,
            initialized: true,
            positions,
        };
        store.verify_consistency()?;
        Ok(store)
    }

    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn tube(&self) -> TubeId {
        self.tube
    }

    pub fn max_position(&self) -> LogicalPosition {
        self.max_position
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn get_map(&self) -> &PositionMap {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Largest occupied logical position
    pub fn high_water_mark(&self) -> Option<LogicalPosition> {
        self.positions.keys().next_back().copied()
    }

    /// Unoccupied positions below the high-water mark
    pub fn gap_count(&self) -> usize {
        self.high_water_mark()
            .map(|hwm| (hwm as usize).saturating_sub(self.positions.len()))
            .unwrap_or(0)
    }

    pub fn units_in_order(&self) -> impl Iterator<Item = &StitchId> {
        self.positions.values()
    }

    pub fn position_of(&self, unit_id: &StitchId) -> Option<LogicalPosition> {
        self.positions
            .iter()
            .find(|(_, unit)| *unit == unit_id)
            .map(|(&position, _)| position)
    }

    fn check_range(&self, position: LogicalPosition) -> Result<(), PositionError> {
        if position < MIN_LOGICAL_POSITION || position > self.max_position {
            return Err(PositionError::InvalidPositionRange {
                position,
                max: self.max_position,
            });
        }
        Ok(())
    }

    pub fn get_unit_at(&self, position: LogicalPosition) -> Result<Option<&StitchId>, PositionError> {
        self.check_range(position)?;
        Ok(self.positions.get(&position))
    }

    pub fn physical_of(&self, logical: LogicalPosition) -> Result<PhysicalPosition, PositionError> {
        if !self.positions.contains_key(&logical) {
            return Err(PositionError::PositionNotFound { position: logical });
        }
        Ok(self.positions.range(..logical).count() + 1)
    }

    pub fn active_unit(&self) -> Option<(StitchId, LogicalPosition)> {
        self.positions
            .first_key_value()
            .map(|(&position, unit)| (unit.clone(), position))
    }

    /// Where a unit at `from` lands when pushed back by `skip`.
    ///
    /// `from + skip - 1`, so a unit at logical 1 lands exactly on `skip`.
    /// `None` when the result leaves the configured bound.
    pub fn placement_target(&self, from: LogicalPosition, skip: SkipNumber) -> Option<LogicalPosition> {
        from.checked_add(skip.value() - 1)
            .filter(|&target| target <= self.max_position)
    }

    /// Every key inside `1..=max_position` and no stitch held twice
    pub fn verify_consistency(&self) -> Result<(), PositionError> {
        let mut seen = HashSet::with_capacity(self.positions.len());
        for (&position, unit) in &self.positions {
            self.check_range(position)?;
            if !seen.insert(unit) {
                return Err(PositionError::InvalidLayout(format!(
                    "stitch {unit} appears more than once in {}",
                    self.tube
                )));
            }
        }
        Ok(())
    }

    pub fn move_unit(&mut self, op: &MoveOp) -> Result<MoveOutcome, PositionError> {
        self.check_range(op.from)?;
        self.check_range(op.to)?;

        match self.positions.get(&op.from) {
            None => return Err(PositionError::PositionNotFound { position: op.from }),
            Some(found) if *found != op.unit_id => {
                return Err(PositionError::UnitMismatch {
                    position: op.from,
                    expected: op.unit_id.clone(),
                    found: found.clone(),
                })
            }
            Some(_) => {}
        }

        if op.from == op.to {
            return Ok(MoveOutcome {
                unit_id: op.unit_id.clone(),
                from: op.from,
                to: op.to,
                shifted: Vec::new(),
            });
        }

        if !op.shift_others {
            if let Some(occupant) = self.positions.get(&op.to) {
                return Err(PositionError::PositionOccupied {
                    position: op.to,
                    occupant: occupant.clone(),
                });
            }
        }

        // Validation done; nothing below can fail.
        let Some(unit) = self.positions.remove(&op.from) else {
            return Err(PositionError::PositionNotFound { position: op.from });
        };

        let mut shifted = Vec::new();
        if op.shift_others {
            if op.to > op.from {
                // Ascending so each target slot was already vacated.
                let occupied: Vec<LogicalPosition> = self
                    .positions
                    .range(op.from + 1..=op.to)
                    .map(|(&p, _)| p)
                    .collect();
                for p in occupied {
                    self.shift_one(p, p - 1, &mut shifted);
                }
            } else {
                let occupied: Vec<LogicalPosition> = self
                    .positions
                    .range(op.to..op.from)
                    .rev()
                    .map(|(&p, _)| p)
                    .collect();
                for p in occupied {
                    self.shift_one(p, p + 1, &mut shifted);
                }
            }
        }

        self.positions.insert(op.to, unit);

        debug!(
            learner_id = %self.learner_id,
            tube = %self.tube,
            unit_id = %op.unit_id,
            from = op.from,
            to = op.to,
            shifted = shifted.len(),
            "stitch moved"
        );

        Ok(MoveOutcome {
            unit_id: op.unit_id.clone(),
            from: op.from,
            to: op.to,
            shifted,
        })
    }

    fn shift_one(&mut self, from: LogicalPosition, to: LogicalPosition, log: &mut Vec<ShiftedUnit>) {
        if let Some(occupant) = self.positions.remove(&from) {
            log.push(ShiftedUnit {
                unit_id: occupant.clone(),
                from,
                to,
            });
            self.positions.insert(to, occupant);
        }
    }

    /// Renumber occupied positions to `1..=n`, keeping relative order
    pub fn compress(&mut self, dry_run: bool) -> Result<CompressionResult, PositionError> {
        if let Err(err) = self.verify_consistency() {
            return Err(self.ordering_violation(format!("input map inconsistent: {err}")));
        }

        let mut compressed = PositionMap::new();
        let mut moves = Vec::new();

        for ((&old, unit), new) in self.positions.iter().zip(MIN_LOGICAL_POSITION..) {
            if old != new {
                moves.push(ShiftedUnit {
                    unit_id: unit.clone(),
                    from: old,
                    to: new,
                });
            }
            compressed.insert(new, unit.clone());
        }

        let dense = compressed
            .keys()
            .copied()
            .eq(MIN_LOGICAL_POSITION..MIN_LOGICAL_POSITION + compressed.len() as LogicalPosition);
        if !dense {
            return Err(self.ordering_violation(format!(
                "renumbered keys are not 1..={}",
                compressed.len()
            )));
        }

        let order_preserved = compressed.len() == self.positions.len()
            && compressed.values().eq(self.positions.values());
        if !order_preserved {
            return Err(self.ordering_violation(format!(
                "{} entries before, {} after",
                self.positions.len(),
                compressed.len()
            )));
        }

        let gaps_removed = self.gap_count();
        let result = CompressionResult {
            map: compressed,
            positions_changed: moves.len(),
            moves,
            gaps_removed,
            order_preserved,
            dry_run,
        };

        if !dry_run {
            self.positions = result.map.clone();
        }

        debug!(
            learner_id = %self.learner_id,
            tube = %self.tube,
            positions_changed = result.positions_changed,
            gaps_removed = result.gaps_removed,
            dry_run,
            "tube compressed"
        );

        Ok(result)
    }

    fn ordering_violation(&self, detail: String) -> PositionError {
        error!(
            learner_id = %self.learner_id,
            tube = %self.tube,
            detail = %detail,
            "compression ordering check failed"
        );
        PositionError::CompressionWouldBreakOrdering { detail }
    }

    /// Seed from a content template. Returns the number of stitches placed.
    pub fn initialize_defaults(&mut self, layout: &DefaultLayout) -> Result<usize, PositionError> {
        if self.initialized {
            return Err(PositionError::AlreadyInitialized {
                learner_id: self.learner_id.clone(),
                tube: self.tube,
            });
        }

        let mut positions = PositionMap::new();
        let mut seen = HashSet::with_capacity(layout.len());
        for entry in layout.iter() {
            self.check_range(entry.position)
                .map_err(|err| PositionError::InvalidLayout(err.to_string()))?;
            if !seen.insert(&entry.stitch_id) {
                return Err(PositionError::InvalidLayout(format!(
                    "stitch {} listed twice",
                    entry.stitch_id
                )));
            }
            if positions
                .insert(entry.position, entry.stitch_id.clone())
                .is_some()
            {
                return Err(PositionError::InvalidLayout(format!(
                    "logical position {} listed twice",
                    entry.position
                )));
            }
        }

        self.positions = positions;
        self.initialized = true;

        info!(
            learner_id = %self.learner_id,
            tube = %self.tube,
            stitches = self.positions.len(),
            "tube initialized from template"
        );

        Ok(self.positions.len())
    }
}
