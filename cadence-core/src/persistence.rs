//! Snapshotting in-flight runs so they survive a restart.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::definition::TimerDefinition;
use crate::engine::{CycleLimit, RunState, Status};
use crate::error::{RestoreRejection, StoreError};
use crate::store::SnapshotStore;

/// Running snapshots older than this are not trusted.
pub const DEFAULT_STALENESS_SECS: i64 = 60;
/// Snapshot cadence while running.
pub const DEFAULT_WRITE_INTERVAL_SECS: i64 = 2;

pub fn storage_key(timer_id: &str) -> String {
    format!("timer-run:{timer_id}")
}

/// The serialized form of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRunState {
    pub timer_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub write_wall_clock: DateTime<Utc>,
    pub timer_index: usize,
    pub status: Status,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_wall_clock: Option<DateTime<Utc>>,
    /// Remaining time of the current interval as of `write_wall_clock`.
    #[serde(default)]
    pub current_duration_ms: Option<i64>,
    pub cycle_index: u32,
    #[serde(default)]
    pub cycle_limit: Option<u32>,
    #[serde(default)]
    pub unlimited: bool,
}

pub struct RunnerPersistence<S: SnapshotStore> {
    store: S,
    staleness: Duration,
    write_interval: Duration,
    last_write: Option<DateTime<Utc>>,
}

impl<S: SnapshotStore> RunnerPersistence<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            staleness: Duration::seconds(DEFAULT_STALENESS_SECS),
            write_interval: Duration::seconds(DEFAULT_WRITE_INTERVAL_SECS),
            last_write: None,
        }
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_write_interval(mut self, interval: Duration) -> Self {
        self.write_interval = interval;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Captures `state` as of `now`, folding elapsed running time into the
    /// recorded remaining value.
    pub fn snapshot(&self, state: &RunState, timer_id: &str, now: DateTime<Utc>) -> PersistedRunState {
        let (cycle_limit, unlimited) = match state.cycle_limit {
            CycleLimit::Finite(n) => (Some(n), false),
            CycleLimit::Unlimited => (None, true),
        };
        PersistedRunState {
            timer_id: timer_id.to_string(),
            write_wall_clock: now,
            timer_index: state.interval_index,
            status: state.status,
            start_wall_clock: state.segment_started_at,
            current_duration_ms: Some(state.remaining_at(now) as i64),
            cycle_index: state.cycle_index,
            cycle_limit,
            unlimited,
        }
    }

    /// Converts a snapshot back into engine state.
    ///
    /// A running snapshot resumes counting from `write_wall_clock`, so the
    /// time that passed while nobody was polling is charged to the run and
    /// any boundary crossed in that gap fires on the next poll.
    pub fn restore(
        &self,
        stored: &PersistedRunState,
        definition: &TimerDefinition,
        now: DateTime<Utc>,
    ) -> Result<RunState, RestoreRejection> {
        if stored.status == Status::Idle {
            return Err(RestoreRejection::Idle);
        }
        let remaining = match stored.current_duration_ms {
            Some(ms) if ms > 0 => ms as u64,
            _ => return Err(RestoreRejection::NonPositiveRemaining),
        };
        if stored.timer_id != definition.id {
            return Err(RestoreRejection::Malformed(format!(
                "snapshot belongs to timer '{}', not '{}'",
                stored.timer_id, definition.id
            )));
        }
        if stored.status == Status::Running {
            let age = now - stored.write_wall_clock;
            if age > self.staleness {
                return Err(RestoreRejection::Stale {
                    age_ms: age.num_milliseconds(),
                    threshold_ms: self.staleness.num_milliseconds(),
                });
            }
        }

        let cycle_limit = match (stored.unlimited, stored.cycle_limit) {
            (true, _) => CycleLimit::Unlimited,
            (false, Some(n)) if n > 0 => CycleLimit::Finite(n),
            (false, other) => {
                return Err(RestoreRejection::Malformed(format!("invalid cycle limit {other:?}")))
            }
        };
        let state = RunState {
            status: stored.status,
            interval_index: stored.timer_index,
            cycle_index: stored.cycle_index,
            cycle_limit,
            remaining_ms: remaining,
            segment_started_at: (stored.status == Status::Running).then_some(stored.write_wall_clock),
        };
        state.validate_against(definition)?;
        Ok(state)
    }

    /// Offers the stored run for `definition`, if one exists and is trusted.
    ///
    /// Anything unusable is deleted so it is never offered again.
    pub fn load(&mut self, definition: &TimerDefinition, now: DateTime<Utc>) -> Option<RunState> {
        let key = storage_key(&definition.id);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read snapshot {}: {}", key, e);
                return None;
            }
        };

        let outcome = serde_json::from_str::<PersistedRunState>(&raw)
            .map_err(|e| RestoreRejection::Malformed(e.to_string()))
            .and_then(|stored| self.restore(&stored, definition, now));

        match outcome {
            Ok(state) => {
                info!(
                    "Restoring timer '{}' ({}, interval {}, cycle {})",
                    definition.id, state.status, state.interval_index, state.cycle_index
                );
                Some(state)
            }
            Err(rejection) => {
                info!("Discarding snapshot for '{}': {}", definition.id, rejection);
                if let Err(e) = self.store.delete(&key) {
                    warn!("Failed to delete rejected snapshot {}: {}", key, e);
                }
                None
            }
        }
    }

    /// Writes a snapshot unconditionally.
    pub fn write(&mut self, state: &RunState, timer_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let snapshot = self.snapshot(state, timer_id, now);
        let json = serde_json::to_string(&snapshot)?;
        self.store.put(&storage_key(timer_id), &json)?;
        self.last_write = Some(now);
        debug!(
            "Wrote snapshot for '{}' ({}, {}ms remaining)",
            timer_id,
            state.status,
            snapshot.current_duration_ms.unwrap_or_default()
        );
        Ok(())
    }

    pub fn write_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_write {
            Some(last) => now - last >= self.write_interval,
            None => true,
        }
    }

    /// Applies the running cadence. Returns whether a write happened.
    pub fn observe(&mut self, state: &RunState, timer_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        if state.status != Status::Running || !self.write_due(now) {
            return Ok(false);
        }
        self.write(state, timer_id, now)?;
        Ok(true)
    }

    pub fn clear(&mut self, timer_id: &str) -> Result<(), StoreError> {
        self.last_write = None;
        self.store.delete(&storage_key(timer_id))?;
        debug!("Cleared snapshot for '{}'", timer_id);
        Ok(())
    }
}
