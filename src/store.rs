//! Persistence boundary.
//!
//! Learner state is loaded with its version and committed back with
//! compare-and-swap semantics. A version mismatch is reported, never
//! overwritten; the caller reloads and retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::warn;

use crate::rotation::LearnerState;
use crate::types::ErrorCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict for learner {learner_id}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        learner_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::VersionConflict { .. } => ErrorCategory::Conflict,
            StoreError::Serialization(_) | StoreError::Unavailable(_) => ErrorCategory::Storage,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self, learner_id: &str) -> Result<Option<Versioned<LearnerState>>, StoreError>;

    /// Writes `state` if the stored version equals `expected_version`
    /// (`None` = no row yet). Returns the new version.
    fn commit(
        &self,
        learner_id: &str,
        expected_version: Option<u64>,
        state: &LearnerState,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug)]
struct StoredRow {
    version: u64,
    payload: String,
}

/// Keeps each learner as a JSON document plus a version counter
#[derive(Debug)]
pub struct InMemoryStateStore {
    rows: RwLock<HashMap<String, StoredRow>>,
    available: AtomicBool,
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails with `Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn version_of(&self, learner_id: &str) -> Option<u64> {
        self.rows.read().get(learner_id).map(|row| row.version)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        }
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, learner_id: &str) -> Result<Option<Versioned<LearnerState>>, StoreError> {
        self.ensure_available()?;
        let rows = self.rows.read();
        let Some(row) = rows.get(learner_id) else {
            return Ok(None);
        };
        let value: LearnerState = serde_json::from_str(&row.payload)?;
        Ok(Some(Versioned {
            version: row.version,
            value,
        }))
    }

    fn commit(
        &self,
        learner_id: &str,
        expected_version: Option<u64>,
        state: &LearnerState,
    ) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let payload = serde_json::to_string(state)?;

        let mut rows = self.rows.write();
        let actual = rows.get(learner_id).map(|row| row.version);
        if actual != expected_version {
            warn!(
                learner_id = %learner_id,
                expected = ?expected_version,
                actual = ?actual,
                "state commit rejected on version mismatch"
            );
            return Err(StoreError::VersionConflict {
                learner_id: learner_id.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let version = actual.map(|v| v + 1).unwrap_or(1);
        rows.insert(learner_id.to_string(), StoredRow { version, payload });
        Ok(version)
    }
}
