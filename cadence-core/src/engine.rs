//! The countdown state machine.
//!
//! Remaining time is always derived from wall-clock differences, never from
//! counting polls. The stored `remaining_ms` is only rewritten when time is
//! banked on pause or when a segment ends, so a host that polls late (or not
//! at all for a while) still sees the right value and exactly one
//! [`EngineEvent::SegmentComplete`] per boundary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::definition::{IntervalSpec, TimerDefinition};
use crate::error::{EngineError, StateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Idle,
    Running,
    Paused,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// How many full passes through the intervals a run makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleLimit {
    Finite(u32),
    Unlimited,
}

impl CycleLimit {
    /// A finite limit, clamped to at least one cycle.
    pub fn finite(cycles: u32) -> Self {
        CycleLimit::Finite(cycles.max(1))
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, CycleLimit::Unlimited)
    }

    /// Whether another pass may begin after `cycle_index` completes.
    fn allows_another(&self, cycle_index: u32) -> bool {
        match self {
            CycleLimit::Unlimited => true,
            CycleLimit::Finite(limit) => cycle_index.saturating_add(1) < *limit,
        }
    }
}

impl Default for CycleLimit {
    fn default() -> Self {
        CycleLimit::Finite(1)
    }
}

impl fmt::Display for CycleLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleLimit::Finite(n) => write!(f, "{n}"),
            CycleLimit::Unlimited => f.write_str("∞"),
        }
    }
}

/// The engine's mutable run state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunState {
    pub status: Status,
    pub interval_index: usize,
    pub cycle_index: u32,
    pub cycle_limit: CycleLimit,
    /// Remaining time of the current interval as of `segment_started_at`
    /// (or as of the pause, while paused).
    pub remaining_ms: u64,
    /// Set iff `status == Running`.
    pub segment_started_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Remaining time at `now` without touching stored fields.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        match self.segment_started_at {
            Some(started) => self.remaining_ms.saturating_sub(elapsed_ms(started, now)),
            None => self.remaining_ms,
        }
    }

    /// Checks the state is internally consistent and fits `definition`.
    pub fn validate_against(&self, definition: &TimerDefinition) -> Result<(), StateError> {
        let Some(interval) = definition.interval(self.interval_index) else {
            return Err(StateError::IntervalOutOfRange {
                index: self.interval_index,
                count: definition.intervals.len(),
            });
        };
        if self.remaining_ms > interval.duration_ms() {
            return Err(StateError::RemainingExceedsInterval {
                remaining_ms: self.remaining_ms,
                duration_ms: interval.duration_ms(),
            });
        }
        if let CycleLimit::Finite(limit) = self.cycle_limit {
            if limit == 0 || self.cycle_index >= limit {
                return Err(StateError::CycleOutOfRange {
                    cycle: self.cycle_index,
                    limit,
                });
            }
        }
        if self.segment_started_at.is_some() != (self.status == Status::Running) {
            return Err(StateError::SegmentStartMismatch);
        }
        Ok(())
    }
}

/// Notifications emitted as the run crosses boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    SegmentComplete { interval_index: usize, cycle_index: u32 },
    /// The run went idle by completing its last cycle, not by reset.
    TimerFinished,
}

/// Outcome of a poll (or of the catch-up a pause performs).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tick {
    pub remaining_ms: u64,
    pub events: Vec<EngineEvent>,
}

impl Tick {
    pub fn finished(&self) -> bool {
        self.events.contains(&EngineEvent::TimerFinished)
    }
}

pub struct CountdownEngine<C: Clock> {
    clock: C,
    definition: Option<TimerDefinition>,
    state: RunState,
    needs_interaction_unlock: bool,
}

impl<C: Clock> CountdownEngine<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            definition: None,
            state: RunState::default(),
            needs_interaction_unlock: false,
        }
    }

    /// Declares that the notification sink only plays after a user gesture.
    pub fn with_interaction_unlock(mut self, required: bool) -> Self {
        self.needs_interaction_unlock = required;
        self
    }

    pub fn needs_interaction_unlock(&self) -> bool {
        self.needs_interaction_unlock
    }

    pub fn mark_interaction_unlocked(&mut self) {
        if self.needs_interaction_unlock {
            debug!("Notification sink unlocked by user interaction");
        }
        self.needs_interaction_unlock = false;
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn definition(&self) -> Option<&TimerDefinition> {
        self.definition.as_ref()
    }

    pub fn current_interval(&self) -> Option<&IntervalSpec> {
        if self.state.status == Status::Idle {
            return None;
        }
        self.definition.as_ref()?.interval(self.state.interval_index)
    }

    pub fn remaining_ms_at(&self, now: DateTime<Utc>) -> u64 {
        self.state.remaining_at(now)
    }

    pub fn start(&mut self, definition: TimerDefinition, cycle_limit: CycleLimit) -> Result<(), EngineError> {
        self.expect_status("start", Status::Idle)?;
        definition.validate()?;
        if cycle_limit == CycleLimit::Finite(0) {
            return Err(EngineError::InvalidDefinition("cycle limit must be at least 1".to_string()));
        }

        let now = self.clock.now();
        let first = definition.intervals[0].duration_ms();
        info!(
            "Starting timer '{}' ({} intervals, {} cycles)",
            definition.id,
            definition.intervals.len(),
            cycle_limit
        );
        self.state = RunState {
            status: Status::Running,
            interval_index: 0,
            cycle_index: 0,
            cycle_limit,
            remaining_ms: first,
            segment_started_at: Some(now),
        };
        self.definition = Some(definition);
        Ok(())
    }

    /// Fires any boundary that already passed, then banks elapsed time.
    ///
    /// If the catch-up completes the final cycle the engine ends up idle and
    /// the returned tick carries `TimerFinished`.
    pub fn pause(&mut self) -> Result<Tick, EngineError> {
        self.expect_status("pause", Status::Running)?;
        let now = self.clock.now();
        let mut tick = self.catch_up(now);
        if self.state.status == Status::Running {
            self.state.remaining_ms = self.state.remaining_at(now);
            self.state.segment_started_at = None;
            self.state.status = Status::Paused;
            tick.remaining_ms = self.state.remaining_ms;
            info!("Paused with {}ms remaining", self.state.remaining_ms);
        }
        Ok(tick)
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.expect_status("resume", Status::Paused)?;
        self.state.segment_started_at = Some(self.clock.now());
        self.state.status = Status::Running;
        info!("Resumed with {}ms remaining", self.state.remaining_ms);
        Ok(())
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<Tick, EngineError> {
        self.expect_status("poll", Status::Running)?;
        Ok(self.catch_up(now))
    }

    /// Returns to idle from any state. Returns the status it left.
    pub fn reset(&mut self) -> Status {
        let previous = self.state.status;
        let cycle_limit = self.state.cycle_limit;
        self.state = RunState {
            cycle_limit,
            ..RunState::default()
        };
        if previous != Status::Idle {
            info!("Reset from {}", previous);
        }
        previous
    }

    /// Installs a previously persisted run. Only valid while idle.
    pub fn rehydrate(&mut self, definition: TimerDefinition, state: RunState) -> Result<(), EngineError> {
        self.expect_status("rehydrate", Status::Idle)?;
        definition.validate()?;
        if state.status == Status::Idle {
            return Err(EngineError::InvalidTransition {
                action: "rehydrate into",
                status: Status::Idle,
            });
        }
        state.validate_against(&definition)?;
        info!(
            "Rehydrated timer '{}' at interval {} cycle {} ({})",
            definition.id, state.interval_index, state.cycle_index, state.status
        );
        self.definition = Some(definition);
        self.state = state;
        Ok(())
    }

    /// Advances once per boundary that lies at or before `now`.
    fn catch_up(&mut self, now: DateTime<Utc>) -> Tick {
        let mut events = Vec::new();
        while self.state.status == Status::Running {
            let Some(started) = self.state.segment_started_at else {
                break;
            };
            let elapsed = elapsed_ms(started, now);
            if elapsed < self.state.remaining_ms {
                break;
            }
            let boundary = started + Duration::milliseconds(self.state.remaining_ms as i64);
            events.push(EngineEvent::SegmentComplete {
                interval_index: self.state.interval_index,
                cycle_index: self.state.cycle_index,
            });
            if let Some(event) = self.advance(boundary) {
                events.push(event);
            }
        }
        Tick {
            remaining_ms: self.state.remaining_at(now),
            events,
        }
    }

    /// Moves to the next segment, which begins exactly at `boundary`.
    fn advance(&mut self, boundary: DateTime<Utc>) -> Option<EngineEvent> {
        let Some(definition) = self.definition.as_ref() else {
            warn!("Advance without a definition, resetting");
            self.reset();
            return None;
        };

        let state = &mut self.state;
        if definition.is_last(state.interval_index) {
            if !state.cycle_limit.allows_another(state.cycle_index) {
                info!("Timer '{}' finished after {} cycles", definition.id, state.cycle_index + 1);
                let cycle_limit = state.cycle_limit;
                *state = RunState {
                    cycle_limit,
                    ..RunState::default()
                };
                return Some(EngineEvent::TimerFinished);
            }
            if !state.cycle_limit.is_unlimited() {
                state.cycle_index += 1;
            }
            state.interval_index = 0;
        } else {
            state.interval_index += 1;
        }

        state.remaining_ms = definition.intervals[state.interval_index].duration_ms();
        state.segment_started_at = Some(boundary);
        debug!(
            "Advanced to interval {} cycle {} ({}ms)",
            state.interval_index, state.cycle_index, state.remaining_ms
        );
        None
    }

    fn expect_status(&self, action: &'static str, expected: Status) -> Result<(), EngineError> {
        if self.state.status == expected {
            return Ok(());
        }
        warn!("Rejected {} while {}", action, self.state.status);
        Err(EngineError::InvalidTransition {
            action,
            status: self.state.status,
        })
    }
}

/// Milliseconds from `start` to `now`, zero if `now` is earlier.
fn elapsed_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_milliseconds()).unwrap_or(0)
}
