//! # tube-scheduler - adaptive content scheduling core
//!
//! Decides which stitch a learner practises next and pushes mastered stitches
//! progressively further back:
//!
//! - **Position store** - sparse logical-position map per (learner, tube) with
//!   gap-tolerant moves and order-preserving compression
//! - **Repetition scheduler** - skip-number spaced repetition over
//!   `[4, 8, 15, 30, 100, 1000]`
//! - **Channel rotator** - LIVE / READY / PREPARING rotation of a learner's
//!   three tubes with version-checked commits
//!
//! ## Module structure
//!
//! - [`position`] - `PositionStore`, moves and compression
//! - [`repetition`] - skip calculation and placement
//! - [`rotation`] - role state and `ChannelRotator`
//! - [`store`] - versioned persistence boundary
//! - [`progress`] - per-stitch progress records
//! - [`template`] - content-template provider contract
//! - [`config`] - `SchedulerConfig`
//! - [`logging`] - tracing subscriber setup for binaries
//! - [`types`] - shared types and constants
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tube_scheduler::{
//!     ChannelRotator, InMemoryStateStore, ProgressRecord, SchedulerConfig,
//!     SequentialTemplateProvider, SessionScore,
//! };
//!
//! let rotator = ChannelRotator::new(
//!     Arc::new(InMemoryStateStore::new()),
//!     Arc::new(SequentialTemplateProvider::new(10)),
//!     SchedulerConfig::default(),
//! );
//! rotator.initialize("learner-1").unwrap();
//!
//! let (stitch, _tube) = rotator.get_active_unit("learner-1").unwrap().unwrap();
//! let record = ProgressRecord::new(stitch);
//! let outcome = rotator
//!     .complete_active_unit("learner-1", &record, &SessionScore::perfect(20))
//!     .unwrap();
//! assert_eq!(outcome.placement.new_position, 4);
//!
//! rotator.rotate("learner-1").unwrap();
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod logging;
pub mod position;
pub mod progress;
pub mod repetition;
pub mod rotation;
pub mod store;
pub mod template;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use types::*;

pub use config::{ConfigError, SchedulerConfig};

pub use position::{CompressionResult, MoveOp, MoveOutcome, PositionError, PositionStore, ShiftedUnit};

pub use repetition::{
    calculate_skip_number, CompletionOutcome, RepetitionError, RepetitionScheduler,
    RepositionResult, SessionScore, SkipResult,
};

pub use rotation::{
    ChannelError, ChannelRotator, LearnerState, RoleAssignment, RoleState, RotationResult,
    TubeRole,
};

pub use store::{InMemoryStateStore, StateStore, StoreError, Versioned};

pub use progress::{InMemoryProgressStore, ProgressError, ProgressRecord, ProgressStore};

pub use template::{
    DefaultLayout, LayoutEntry, SequentialTemplateProvider, StaticTemplateProvider,
    TemplateError, TemplateProvider,
};
