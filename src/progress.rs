//! Per-learner stitch progress records.
//!
//! The scheduler reads a record as input and hands back the updated value;
//! persisting it is the progress collaborator's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{SkipNumber, StitchId};

/// Highest mastery tier carried on a record. The tier itself is computed elsewhere.
pub const MAX_MASTERY_TIER: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub stitch_id: StitchId,
    pub skip_number: SkipNumber,
    pub consecutive_perfect: u32,
    pub mastery_tier: u8,
    pub completions: u32,
}

impl ProgressRecord {
    pub fn new(stitch_id: impl Into<StitchId>) -> Self {
        Self {
            stitch_id: stitch_id.into(),
            skip_number: SkipNumber::INITIAL,
            consecutive_perfect: 0,
            mastery_tier: 1,
            completions: 0,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.skip_number.is_retired()
    }

    pub fn validate(&self) -> Result<(), ProgressError> {
        if self.mastery_tier > MAX_MASTERY_TIER {
            return Err(ProgressError::MasteryTierOutOfRange {
                stitch_id: self.stitch_id.clone(),
                tier: self.mastery_tier,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("mastery tier {tier} of stitch {stitch_id} exceeds {}", MAX_MASTERY_TIER)]
    MasteryTierOutOfRange { stitch_id: StitchId, tier: u8 },
    #[error("progress store unavailable: {0}")]
    Unavailable(String),
}

pub trait ProgressStore: Send + Sync {
    fn get(&self, learner_id: &str, stitch_id: &StitchId) -> Result<Option<ProgressRecord>, ProgressError>;

    /// Rejects records whose mastery tier is out of range
    fn put(&self, learner_id: &str, record: ProgressRecord) -> Result<(), ProgressError>;

    /// Stored record, or a fresh one at skip number 4
    fn get_or_default(&self, learner_id: &str, stitch_id: &StitchId) -> Result<ProgressRecord, ProgressError> {
        Ok(self
            .get(learner_id, stitch_id)?
            .unwrap_or_else(|| ProgressRecord::new(stitch_id.clone())))
    }
}

#[derive(Debug)]
pub struct InMemoryProgressStore {
    records: RwLock<HashMap<(String, StitchId), ProgressRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: `get` and `put` fail with `Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn ensure_available(&self) -> Result<(), ProgressError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ProgressError::Unavailable("in-memory progress store offline".to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Records of one learner currently at the terminal skip number
    pub fn retired(&self, learner_id: &str) -> Vec<ProgressRecord> {
        let mut retired: Vec<ProgressRecord> = self
            .records
            .read()
            .iter()
            .filter(|((learner, _), record)| learner == learner_id && record.is_retired())
            .map(|(_, record)| record.clone())
            .collect();
        retired.sort_by(|a, b| a.stitch_id.cmp(&b.stitch_id));
        retired
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn get(&self, learner_id: &str, stitch_id: &StitchId) -> Result<Option<ProgressRecord>, ProgressError> {
        self.ensure_available()?;
        Ok(self
            .records
            .read()
            .get(&(learner_id.to_string(), stitch_id.clone()))
            .cloned())
    }

    fn put(&self, learner_id: &str, record: ProgressRecord) -> Result<(), ProgressError> {
        self.ensure_available()?;
        record.validate()?;
        self.records
            .write()
            .insert((learner_id.to_string(), record.stitch_id.clone()), record);
        Ok(())
    }
}
