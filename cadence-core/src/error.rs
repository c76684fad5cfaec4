//! Error types shared by the engine, the persistence layer and the runner.

use thiserror::Error;

use crate::engine::Status;

/// Errors returned by [`CountdownEngine`](crate::CountdownEngine) operations.
///
/// A failed operation never leaves the engine partially mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid timer definition: {0}")]
    InvalidDefinition(String),

    #[error("cannot {action} while {status}")]
    InvalidTransition { action: &'static str, status: Status },

    #[error("inconsistent run state: {0}")]
    InvalidState(#[from] StateError),
}

/// A [`RunState`](crate::RunState) that does not fit its timer definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("interval index {index} out of range for {count} intervals")]
    IntervalOutOfRange { index: usize, count: usize },

    #[error("remaining {remaining_ms}ms exceeds interval length {duration_ms}ms")]
    RemainingExceedsInterval { remaining_ms: u64, duration_ms: u64 },

    #[error("cycle {cycle} outside limit {limit}")]
    CycleOutOfRange { cycle: u32, limit: u32 },

    #[error("segment start must be set exactly while running")]
    SegmentStartMismatch,
}

/// Why a persisted snapshot was not used to rehydrate the engine.
///
/// None of these reach the caller of [`RunnerPersistence::load`](crate::RunnerPersistence::load)
/// as an error: the snapshot is discarded and the engine starts idle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreRejection {
    #[error("snapshot is {age_ms}ms old, older than the {threshold_ms}ms staleness threshold")]
    Stale { age_ms: i64, threshold_ms: i64 },

    #[error("snapshot records an idle run")]
    Idle,

    #[error("snapshot has no remaining time")]
    NonPositiveRemaining,

    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("snapshot does not fit the timer: {0}")]
    Inconsistent(#[from] StateError),
}

/// Failures of the key-value store backing snapshots.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the [`Runner`](crate::Runner) host adapter.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The transition was applied; only the snapshot write failed.
    #[error("snapshot write failed: {0}")]
    Store(#[from] StoreError),
}
