//! Common Types and Constants
//!
//! Shared value types used across the position, repetition and rotation modules.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// Smallest valid logical position
pub const MIN_LOGICAL_POSITION: LogicalPosition = 1;

/// Default upper bound for logical positions
pub const DEFAULT_MAX_LOGICAL_POSITION: LogicalPosition = 10_000;

/// Number of tubes per learner
pub const TUBE_COUNT: usize = 3;

/// Fixed skip-number sequence, ascending. The last value is terminal.
pub const SKIP_SEQUENCE: [u32; 6] = [4, 8, 15, 30, 100, 1000];

// ==================== Positions ====================

/// Sparse key locating a stitch inside a tube
pub type LogicalPosition = u32;

/// 1-based rank of a logical position among occupied positions
pub type PhysicalPosition = usize;

/// Sparse logical position -> stitch mapping for one (learner, tube)
pub type PositionMap = BTreeMap<LogicalPosition, StitchId>;

// ==================== Stitch ====================

/// Opaque content-unit identifier. Never inspected by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StitchId(String);

impl StitchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StitchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StitchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ==================== Tube ====================

/// One of the three parallel learning channels of a learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TubeId {
    Tube1,
    Tube2,
    Tube3,
}

impl TubeId {
    pub const ALL: [TubeId; TUBE_COUNT] = [TubeId::Tube1, TubeId::Tube2, TubeId::Tube3];

    pub const fn index(self) -> usize {
        match self {
            TubeId::Tube1 => 0,
            TubeId::Tube2 => 1,
            TubeId::Tube3 => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TubeId::Tube1 => "tube1",
            TubeId::Tube2 => "tube2",
            TubeId::Tube3 => "tube3",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tube1" | "1" => Some(TubeId::Tube1),
            "tube2" | "2" => Some(TubeId::Tube2),
            "tube3" | "3" => Some(TubeId::Tube3),
            _ => None,
        }
    }
}

impl fmt::Display for TubeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== Skip Number ====================

/// Spacing value attached to a stitch's progress record.
///
/// Closed over `[4, 8, 15, 30, 100, 1000]`; `Retired` (1000) is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SkipNumber {
    Four,
    Eight,
    Fifteen,
    Thirty,
    Hundred,
    Retired,
}

impl SkipNumber {
    pub const ALL: [SkipNumber; 6] = [
        SkipNumber::Four,
        SkipNumber::Eight,
        SkipNumber::Fifteen,
        SkipNumber::Thirty,
        SkipNumber::Hundred,
        SkipNumber::Retired,
    ];

    pub const INITIAL: SkipNumber = SkipNumber::Four;

    pub const fn value(self) -> u32 {
        SKIP_SEQUENCE[self.index()]
    }

    const fn index(self) -> usize {
        match self {
            SkipNumber::Four => 0,
            SkipNumber::Eight => 1,
            SkipNumber::Fifteen => 2,
            SkipNumber::Thirty => 3,
            SkipNumber::Hundred => 4,
            SkipNumber::Retired => 5,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        SKIP_SEQUENCE
            .iter()
            .position(|&v| v == value)
            .map(|i| Self::ALL[i])
    }

    /// Next value in the sequence, saturating at `Retired`
    pub fn next(self) -> Self {
        Self::ALL
            .get(self.index() + 1)
            .copied()
            .unwrap_or(SkipNumber::Retired)
    }

    pub const fn is_retired(self) -> bool {
        matches!(self, SkipNumber::Retired)
    }
}

impl Default for SkipNumber {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl TryFrom<u32> for SkipNumber {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or_else(|| format!("{value} is not a valid skip number"))
    }
}

impl From<SkipNumber> for u32 {
    fn from(value: SkipNumber) -> Self {
        value.value()
    }
}

impl fmt::Display for SkipNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

// ==================== Error Category ====================

/// Recovery class of an error, shared by every module's error enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller supplied a key that does not exist; re-query and retry
    Lookup,
    /// Stale or concurrent state; reload and retry
    Conflict,
    /// Internal invariant broken; fatal bug signal
    Invariant,
    /// Caller logic error the caller should branch on
    DomainState,
    /// Failure below the persistence boundary
    Storage,
}
