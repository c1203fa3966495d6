//! Three-Tube Rotation
//!
//! Each learner owns three tubes. At any time one is LIVE (being practised),
//! one is READY (warmed, next in line) and one is PREPARING (being warmed by
//! the cache collaborator). Ending a session on the LIVE tube rotates:
//! LIVE -> PREPARING, READY -> LIVE, PREPARING -> READY.
//!
//! Every mutating call runs load -> mutate -> commit under the learner's
//! lease, and commits with the version it loaded.

mod lease;
mod state;

use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::position::{CompressionResult, PositionError, PositionStore};
use crate::progress::ProgressRecord;
use crate::repetition::{CompletionOutcome, RepetitionError, RepetitionScheduler, SessionScore};
use crate::store::{StateStore, StoreError, Versioned};
use crate::template::{TemplateError, TemplateProvider};
use crate::types::{ErrorCategory, PositionMap, StitchId, TubeId};

pub use lease::LeaseTable;
pub use state::{DuplicateTube, LearnerState, RoleAssignment, RoleState, TubeRole};

// ==================== Errors ====================

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no scheduling state for learner {learner_id}")]
    NoState { learner_id: String },
    #[error("learner {learner_id} already initialized")]
    AlreadyInitialized { learner_id: String },
    #[error("{tube} missing from state of learner {learner_id}")]
    TubeNotFound { learner_id: String, tube: TubeId },
    #[error("version conflict for learner {learner_id}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        learner_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("rotation failed for learner {learner_id}: {source}")]
    RotationFailed {
        learner_id: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Repetition(#[from] RepetitionError),
    #[error("state storage failed: {0}")]
    Storage(StoreError),
}

impl ChannelError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChannelError::NoState { .. } | ChannelError::TubeNotFound { .. } => {
                ErrorCategory::Lookup
            }
            ChannelError::AlreadyInitialized { .. } => ErrorCategory::DomainState,
            ChannelError::VersionConflict { .. } => ErrorCategory::Conflict,
            ChannelError::RotationFailed { .. }
            | ChannelError::Template(_)
            | ChannelError::Storage(_) => ErrorCategory::Storage,
            ChannelError::Position(err) => err.category(),
            ChannelError::Repetition(err) => err.category(),
        }
    }

    fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                learner_id,
                expected,
                actual,
            } => ChannelError::VersionConflict {
                learner_id,
                expected,
                actual,
            },
            other => ChannelError::Storage(other),
        }
    }
}

// ==================== Results ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResult {
    pub learner_id: String,
    pub before: RoleAssignment,
    pub after: RoleAssignment,
    pub rotation_count: u64,
    pub version: u64,
}

// ==================== Rotator ====================

pub struct ChannelRotator {
    store: Arc<dyn StateStore>,
    templates: Arc<dyn TemplateProvider>,
    scheduler: RepetitionScheduler,
    config: SchedulerConfig,
    leases: LeaseTable,
}

impl ChannelRotator {
    pub fn new(
        store: Arc<dyn StateStore>,
        templates: Arc<dyn TemplateProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            templates,
            scheduler: RepetitionScheduler::new(&config),
            config,
            leases: LeaseTable::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn load(&self, learner_id: &str) -> Result<Versioned<LearnerState>, ChannelError> {
        self.store
            .load(learner_id)
            .map_err(ChannelError::from_store)?
            .ok_or_else(|| ChannelError::NoState {
                learner_id: learner_id.to_string(),
            })
    }

    fn commit(&self, loaded: &Versioned<LearnerState>) -> Result<u64, ChannelError> {
        self.store
            .commit(&loaded.value.learner_id, Some(loaded.version), &loaded.value)
            .map_err(ChannelError::from_store)
    }

    /// Seeds all three tubes from the template provider and assigns
    /// tube1 = LIVE, tube2 = READY, tube3 = PREPARING.
    pub fn initialize(&self, learner_id: &str) -> Result<RoleState, ChannelError> {
        self.leases
            .with_lease(learner_id, || self.initialize_locked(learner_id))
    }

    fn initialize_locked(&self, learner_id: &str) -> Result<RoleState, ChannelError> {
        if self
            .store
            .load(learner_id)
            .map_err(ChannelError::from_store)?
            .is_some()
        {
            return Err(ChannelError::AlreadyInitialized {
                learner_id: learner_id.to_string(),
            });
        }

        let mut tubes = Vec::with_capacity(TubeId::ALL.len());
        for tube in TubeId::ALL {
            let layout = self.templates.default_layout(learner_id, tube)?;
            let mut store = PositionStore::new(learner_id, tube, self.config.max_logical_position);
            store.initialize_defaults(&layout)?;
            tubes.push(store);
        }

        let roles = RoleState::initial();
        let state = LearnerState::new(learner_id, roles.clone(), tubes);

        match self.store.commit(learner_id, None, &state) {
            Ok(_) => {}
            Err(StoreError::VersionConflict { .. }) => {
                return Err(ChannelError::AlreadyInitialized {
                    learner_id: learner_id.to_string(),
                })
            }
            Err(err) => return Err(ChannelError::Storage(err)),
        }

        info!(learner_id = %learner_id, "learner tubes initialized");
        Ok(roles)
    }

    pub fn get_role_state(&self, learner_id: &str) -> Result<RoleState, ChannelError> {
        Ok(self.load(learner_id)?.value.roles)
    }

    /// Active stitch of the LIVE tube, if that tube is not empty
    pub fn get_active_unit(&self, learner_id: &str) -> Result<Option<(StitchId, TubeId)>, ChannelError> {
        let loaded = self.load(learner_id)?;
        let live = loaded.value.roles.live();
        let store = tube_of(&loaded.value, live)?;
        Ok(store.active_unit().map(|(unit, _)| (unit, live)))
    }

    /// Snapshot of one tube's map, e.g. for warming the PREPARING tube
    pub fn tube_map(&self, learner_id: &str, tube: TubeId) -> Result<PositionMap, ChannelError> {
        let loaded = self.load(learner_id)?;
        Ok(tube_of(&loaded.value, tube)?.get_map().clone())
    }

    pub fn rotate(&self, learner_id: &str) -> Result<RotationResult, ChannelError> {
        self.leases
            .with_lease(learner_id, || self.rotate_locked(learner_id))
    }

    fn rotate_locked(&self, learner_id: &str) -> Result<RotationResult, ChannelError> {
        let rotation_failed = |source: StoreError| ChannelError::RotationFailed {
            learner_id: learner_id.to_string(),
            source,
        };

        let mut loaded = match self.store.load(learner_id) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                return Err(ChannelError::NoState {
                    learner_id: learner_id.to_string(),
                })
            }
            Err(err) => return Err(rotation_failed(err)),
        };

        let before = loaded.value.roles.assignment();
        loaded.value.roles = loaded.value.roles.rotated(Utc::now());

        let version = match self
            .store
            .commit(learner_id, Some(loaded.version), &loaded.value)
        {
            Ok(version) => version,
            Err(err) if err.is_conflict() => return Err(ChannelError::from_store(err)),
            Err(err) => {
                warn!(learner_id = %learner_id, error = %err, "rotation commit failed");
                return Err(rotation_failed(err));
            }
        };

        let after = loaded.value.roles.assignment();
        info!(
            learner_id = %learner_id,
            live = %after.live,
            ready = %after.ready,
            preparing = %after.preparing,
            rotation_count = loaded.value.roles.rotation_count(),
            "tubes rotated"
        );

        Ok(RotationResult {
            learner_id: learner_id.to_string(),
            before,
            after,
            rotation_count: loaded.value.roles.rotation_count(),
            version,
        })
    }

    /// Rotates many learners in parallel. Learners share no state, so each
    /// result is independent of the others.
    pub fn rotate_many(&self, learner_ids: &[String]) -> Vec<(String, Result<RotationResult, ChannelError>)> {
        learner_ids
            .par_iter()
            .map(|learner_id| (learner_id.clone(), self.rotate(learner_id)))
            .collect()
    }

    /// Records a completed session on the LIVE tube's active stitch.
    ///
    /// The returned record carries the next skip number; persisting it is left
    /// to the progress collaborator.
    pub fn complete_active_unit(
        &self,
        learner_id: &str,
        record: &ProgressRecord,
        score: &SessionScore,
    ) -> Result<CompletionOutcome, ChannelError> {
        self.leases.with_lease(learner_id, || {
            self.complete_active_unit_locked(learner_id, record, score)
        })
    }

    fn complete_active_unit_locked(
        &self,
        learner_id: &str,
        record: &ProgressRecord,
        score: &SessionScore,
    ) -> Result<CompletionOutcome, ChannelError> {
        let mut loaded = self.load(learner_id)?;
        let live = loaded.value.roles.live();
        let store = loaded
            .value
            .tube_mut(live)
            .ok_or_else(|| ChannelError::TubeNotFound {
                learner_id: learner_id.to_string(),
                tube: live,
            })?;

        let outcome = self.scheduler.complete_unit(store, record, score)?;
        if outcome.placement.moved {
            self.commit(&loaded)?;
        }
        Ok(outcome)
    }

    pub fn compress_tube(
        &self,
        learner_id: &str,
        tube: TubeId,
        dry_run: bool,
    ) -> Result<CompressionResult, ChannelError> {
        self.leases.with_lease(learner_id, || {
            self.compress_tube_locked(learner_id, tube, dry_run)
        })
    }

    fn compress_tube_locked(
        &self,
        learner_id: &str,
        tube: TubeId,
        dry_run: bool,
    ) -> Result<CompressionResult, ChannelError> {
        let mut loaded = self.load(learner_id)?;
        let store = loaded
            .value
            .tube_mut(tube)
            .ok_or_else(|| ChannelError::TubeNotFound {
                learner_id: learner_id.to_string(),
                tube,
            })?;

        let result = store.compress(dry_run)?;
        if !dry_run && result.positions_changed > 0 {
            self.commit(&loaded)?;
        }
        Ok(result)
    }
}

fn tube_of(state: &LearnerState, tube: TubeId) -> Result<&PositionStore, ChannelError> {
    state.tube(tube).ok_or_else(|| ChannelError::TubeNotFound {
        learner_id: state.learner_id.clone(),
        tube,
    })
}
