//! Skip-Number Spaced Repetition
//!
//! Core theory:
//! - Every stitch carries a skip number from `[4, 8, 15, 30, 100, 1000]`
//! - A perfect session pushes the stitch back by its current skip number and
//!   advances the skip number for the next cycle
//! - Anything less than perfect leaves the stitch active for a retry and resets
//!   the skip number to 4
//! - 1000 is terminal: retired stitches are reviewed outside normal placement
//!
//! Placement (stitch at logical `old`, skip `s`):
//! - vacate `old`
//! - every occupied `p` in `(old, old + s - 1]` moves to `p - 1`
//! - the stitch lands on `old + s - 1` (exactly `s` when `old` is 1)

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::position::{MoveOp, PositionError, PositionStore, ShiftedUnit};
use crate::progress::ProgressRecord;
use crate::types::{ErrorCategory, LogicalPosition, SkipNumber, StitchId, MIN_LOGICAL_POSITION};

// ==================== Constants ====================

/// Tolerance when treating a fraction-correct score as perfect
const PERFECT_EPSILON: f64 = 1e-9;

/// Resolution used when converting a fraction into a question count
const FRACTION_SCALE: u32 = 100;

// ==================== Errors ====================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepetitionError {
    #[error("{value} is not a valid skip number")]
    InvalidSkipNumber { value: u32 },
    #[error("stitch {unit_id} is retired and cannot be placed")]
    StitchAlreadyRetired { unit_id: StitchId },
    #[error("stitch {unit_id} is not the active unit (active: {active:?})")]
    NotActiveUnit {
        unit_id: StitchId,
        active: Option<StitchId>,
    },
    #[error(transparent)]
    Position(#[from] PositionError),
}

impl RepetitionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RepetitionError::InvalidSkipNumber { .. }
            | RepetitionError::StitchAlreadyRetired { .. } => ErrorCategory::DomainState,
            RepetitionError::NotActiveUnit { .. } => ErrorCategory::Conflict,
            RepetitionError::Position(err) => err.category(),
        }
    }
}

// ==================== Data Structures ====================

/// Outcome of one practice session on a stitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScore {
    pub correct: u32,
    pub total: u32,
}

impl SessionScore {
    pub fn new(correct: u32, total: u32) -> Self {
        Self {
            correct: correct.min(total),
            total,
        }
    }

    pub fn perfect(total: u32) -> Self {
        Self::new(total, total)
    }

    /// Accepts the orchestrator's fraction-correct form.
    ///
    /// Only a fraction within epsilon of 1.0 counts as perfect; anything
    /// else is floored so that 0.999 is never rounded up to a perfect score.
    pub fn from_fraction(fraction: f64) -> Self {
        if !fraction.is_finite() || fraction <= 0.0 {
            return Self::new(0, FRACTION_SCALE);
        }
        if fraction >= 1.0 - PERFECT_EPSILON {
            return Self::perfect(FRACTION_SCALE);
        }
        let correct = ((fraction * FRACTION_SCALE as f64).floor() as u32).min(FRACTION_SCALE - 1);
        Self::new(correct, FRACTION_SCALE)
    }

    pub fn is_perfect(&self) -> bool {
        self.total > 0 && self.correct == self.total
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipResult {
    pub next: SkipNumber,
    pub consecutive_perfect: u32,
    pub perfect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositionResult {
    pub unit_id: StitchId,
    pub moved: bool,
    pub previous_position: LogicalPosition,
    pub new_position: LogicalPosition,
    /// Skip number used as the shift distance
    pub placed_with: SkipNumber,
    pub shifted: Vec<ShiftedUnit>,
    /// The stored skip number must go back to 4
    pub reset_skip: bool,
    /// The tube was compressed to make room before placing
    pub compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub placement: RepositionResult,
    pub skip: SkipResult,
    /// Record to hand back to the progress collaborator
    pub record: ProgressRecord,
}

// ==================== Pure Skip Calculation ====================

/// Next skip number and consecutive-perfect count for one session
pub fn calculate_skip_number(
    current: u32,
    consecutive_perfect: u32,
    score: &SessionScore,
) -> Result<SkipResult, RepetitionError> {
    let current =
        SkipNumber::from_value(current).ok_or(RepetitionError::InvalidSkipNumber { value: current })?;

    if score.is_perfect() {
        Ok(SkipResult {
            next: current.next(),
            consecutive_perfect: consecutive_perfect.saturating_add(1),
            perfect: true,
        })
    } else {
        Ok(SkipResult {
            next: SkipNumber::INITIAL,
            consecutive_perfect: 0,
            perfect: false,
        })
    }
}

// ==================== Scheduler ====================

#[derive(Debug, Clone, Default)]
pub struct RepetitionScheduler {
    auto_compress_gap_threshold: usize,
}

impl RepetitionScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            auto_compress_gap_threshold: config.auto_compress_gap_threshold,
        }
    }

    pub fn calculate_skip_number(
        &self,
        current: u32,
        consecutive_perfect: u32,
        score: &SessionScore,
    ) -> Result<SkipResult, RepetitionError> {
        calculate_skip_number(current, consecutive_perfect, score)
    }

    /// Places a just-completed active stitch.
    ///
    /// Moves only on a perfect score, using `current_skip` (the value stored
    /// before this completion) as the distance. The tube is left untouched on
    /// any error.
    pub fn reposition(
        &self,
        store: &mut PositionStore,
        unit_id: &StitchId,
        current_skip: SkipNumber,
        score: &SessionScore,
    ) -> Result<RepositionResult, RepetitionError> {
        let active = store.active_unit();
        let old = match &active {
            Some((active_id, position)) if active_id == unit_id => *position,
            _ => {
                return Err(RepetitionError::NotActiveUnit {
                    unit_id: unit_id.clone(),
                    active: active.map(|(id, _)| id),
                })
            }
        };

        if !score.is_perfect() {
            debug!(
                learner_id = %store.learner_id(),
                tube = %store.tube(),
                unit_id = %unit_id,
                correct = score.correct,
                total = score.total,
                "imperfect score, stitch stays active"
            );
            return Ok(RepositionResult {
                unit_id: unit_id.clone(),
                moved: false,
                previous_position: old,
                new_position: old,
                placed_with: current_skip,
                shifted: Vec::new(),
                reset_skip: true,
                compressed: false,
            });
        }

        if current_skip.is_retired() {
            warn!(
                learner_id = %store.learner_id(),
                tube = %store.tube(),
                unit_id = %unit_id,
                "refusing to place retired stitch"
            );
            return Err(RepetitionError::StitchAlreadyRetired {
                unit_id: unit_id.clone(),
            });
        }

        // Work on a copy so a failure halfway leaves the caller's tube as it was.
        let mut staged = store.clone();
        let mut compressed = false;

        let (from, target) = match staged.placement_target(old, current_skip) {
            Some(target) => (old, target),
            None => {
                staged.compress(false)?;
                compressed = true;
                let target = staged
                    .placement_target(MIN_LOGICAL_POSITION, current_skip)
                    .ok_or(PositionError::InvalidPositionRange {
                        position: current_skip.value(),
                        max: staged.max_position(),
                    })?;
                (MIN_LOGICAL_POSITION, target)
            }
        };

        let outcome = staged.move_unit(&MoveOp {
            unit_id: unit_id.clone(),
            from,
            to: target,
            shift_others: true,
        })?;

        if self.auto_compress_gap_threshold > 0 && staged.gap_count() > self.auto_compress_gap_threshold {
            staged.compress(false)?;
            compressed = true;
        }

        let new_position = staged
            .position_of(unit_id)
            .ok_or(PositionError::PositionNotFound { position: target })?;

        *store = staged;

        debug!(
            learner_id = %store.learner_id(),
            tube = %store.tube(),
            unit_id = %unit_id,
            skip = current_skip.value(),
            from = old,
            to = new_position,
            "stitch repositioned"
        );

        Ok(RepositionResult {
            unit_id: unit_id.clone(),
            moved: true,
            previous_position: old,
            new_position,
            placed_with: current_skip,
            shifted: outcome.shifted,
            reset_skip: false,
            compressed,
        })
    }

    /// Skip calculation plus placement; returns the updated progress record.
    ///
    /// The mastery tier is carried through unchanged.
    pub fn complete_unit(
        &self,
        store: &mut PositionStore,
        record: &ProgressRecord,
        score: &SessionScore,
    ) -> Result<CompletionOutcome, RepetitionError> {
        let skip = self.calculate_skip_number(
            record.skip_number.value(),
            record.consecutive_perfect,
            score,
        )?;
        let placement = self.reposition(store, &record.stitch_id, record.skip_number, score)?;

        let record = ProgressRecord {
            skip_number: skip.next,
            consecutive_perfect: skip.consecutive_perfect,
            completions: record.completions.saturating_add(1),
            ..record.clone()
        };

        Ok(CompletionOutcome {
            placement,
            skip,
            record,
        })
    }
}
