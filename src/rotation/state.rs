//! Role assignment and the persisted per-learner state

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::position::PositionStore;
use crate::types::{TubeId, TUBE_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TubeRole {
    Live,
    Ready,
    Preparing,
}

impl TubeRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            TubeRole::Live => "LIVE",
            TubeRole::Ready => "READY",
            TubeRole::Preparing => "PREPARING",
        }
    }
}

impl fmt::Display for TubeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain snapshot of which tube holds which role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub live: TubeId,
    pub ready: TubeId,
    pub preparing: TubeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} assigned to more than one role")]
pub struct DuplicateTube(pub TubeId);

/// Bijection of the three tubes onto LIVE / READY / PREPARING.
///
/// Only constructible through `initial`, `try_new` and `rotated`, and
/// deserialization goes through the same check, so two tubes can never
/// share a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RoleStateRepr", into = "RoleStateRepr")]
pub struct RoleState {
    assignment: RoleAssignment,
    rotation_count: u64,
    last_rotated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleStateRepr {
    live: TubeId,
    ready: TubeId,
    preparing: TubeId,
    rotation_count: u64,
    #[serde(default)]
    last_rotated_at: Option<DateTime<Utc>>,
}

impl TryFrom<RoleStateRepr> for RoleState {
    type Error = DuplicateTube;

    fn try_from(repr: RoleStateRepr) -> Result<Self, Self::Error> {
        let mut state = RoleState::try_new(repr.live, repr.ready, repr.preparing)?;
        state.rotation_count = repr.rotation_count;
        state.last_rotated_at = repr.last_rotated_at;
        Ok(state)
    }
}

impl From<RoleState> for RoleStateRepr {
    fn from(state: RoleState) -> Self {
        Self {
            live: state.assignment.live,
            ready: state.assignment.ready,
            preparing: state.assignment.preparing,
            rotation_count: state.rotation_count,
            last_rotated_at: state.last_rotated_at,
        }
    }
}

impl RoleState {
    /// tube1 = LIVE, tube2 = READY, tube3 = PREPARING
    pub fn initial() -> Self {
        Self {
            assignment: RoleAssignment {
                live: TubeId::Tube1,
                ready: TubeId::Tube2,
                preparing: TubeId::Tube3,
            },
            rotation_count: 0,
            last_rotated_at: None,
        }
    }

    pub fn try_new(live: TubeId, ready: TubeId, preparing: TubeId) -> Result<Self, DuplicateTube> {
        if live == ready || live == preparing {
            return Err(DuplicateTube(live));
        }
        if ready == preparing {
            return Err(DuplicateTube(ready));
        }
        Ok(Self {
            assignment: RoleAssignment {
                live,
                ready,
                preparing,
            },
            rotation_count: 0,
            last_rotated_at: None,
        })
    }

    pub fn live(&self) -> TubeId {
        self.assignment.live
    }

    pub fn ready(&self) -> TubeId {
        self.assignment.ready
    }

    pub fn preparing(&self) -> TubeId {
        self.assignment.preparing
    }

    pub fn assignment(&self) -> RoleAssignment {
        self.assignment
    }

    pub fn rotation_count(&self) -> u64 {
        self.rotation_count
    }

    pub fn last_rotated_at(&self) -> Option<DateTime<Utc>> {
        self.last_rotated_at
    }

    pub fn tube_for(&self, role: TubeRole) -> TubeId {
        match role {
            TubeRole::Live => self.assignment.live,
            TubeRole::Ready => self.assignment.ready,
            TubeRole::Preparing => self.assignment.preparing,
        }
    }

    pub fn role_of(&self, tube: TubeId) -> TubeRole {
        if tube == self.assignment.live {
            TubeRole::Live
        } else if tube == self.assignment.ready {
            TubeRole::Ready
        } else {
            TubeRole::Preparing
        }
    }

    /// LIVE -> PREPARING, READY -> LIVE, PREPARING -> READY
    pub fn rotated(&self, at: DateTime<Utc>) -> Self {
        Self {
            assignment: RoleAssignment {
                live: self.assignment.ready,
                ready: self.assignment.preparing,
                preparing: self.assignment.live,
            },
            rotation_count: self.rotation_count.saturating_add(1),
            last_rotated_at: Some(at),
        }
    }
}

impl Default for RoleState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Everything persisted for one learner; the unit of optimistic concurrency.
///
/// Loading a row checks that it holds exactly one store per tube, all owned
/// by the same learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LearnerStateRepr", into = "LearnerStateRepr")]
pub struct LearnerState {
    pub learner_id: String,
    pub roles: RoleState,
    pub tubes: Vec<PositionStore>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearnerStateRepr {
    learner_id: String,
    roles: RoleState,
    tubes: Vec<PositionStore>,
}

impl TryFrom<LearnerStateRepr> for LearnerState {
    type Error = String;

    fn try_from(repr: LearnerStateRepr) -> Result<Self, Self::Error> {
        let state = LearnerState::new(repr.learner_id, repr.roles, repr.tubes);
        if !state.is_complete() {
            return Err(format!(
                "learner {} must hold exactly one store per tube",
                state.learner_id
            ));
        }
        if let Some(foreign) = state
            .tubes
            .iter()
            .find(|store| store.learner_id() != state.learner_id)
        {
            return Err(format!(
                "{} of learner {} belongs to {}",
                foreign.tube(),
                state.learner_id,
                foreign.learner_id()
            ));
        }
        Ok(state)
    }
}

impl From<LearnerState> for LearnerStateRepr {
    fn from(state: LearnerState) -> Self {
        Self {
            learner_id: state.learner_id,
            roles: state.roles,
            tubes: state.tubes,
        }
    }
}

impl LearnerState {
    pub fn new(learner_id: impl Into<String>, roles: RoleState, tubes: Vec<PositionStore>) -> Self {
        Self {
            learner_id: learner_id.into(),
            roles,
            tubes,
        }
    }

    pub fn tube(&self, tube: TubeId) -> Option<&PositionStore> {
        self.tubes.iter().find(|store| store.tube() == tube)
    }

    pub fn tube_mut(&mut self, tube: TubeId) -> Option<&mut PositionStore> {
        self.tubes.iter_mut().find(|store| store.tube() == tube)
    }

    pub fn is_complete(&self) -> bool {
        self.tubes.len() == TUBE_COUNT && TubeId::ALL.iter().all(|&t| self.tube(t).is_some())
    }
}
