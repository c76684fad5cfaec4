//! Timer definitions and duration display helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// One scheduled segment of a timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSpec {
    /// Whole seconds. Authored intervals are positive; anything else is skipped.
    pub duration: i64,
    #[serde(default)]
    pub is_rest: bool,
}

impl IntervalSpec {
    pub fn work(duration: i64) -> Self {
        Self {
            duration,
            is_rest: false,
        }
    }

    pub fn rest(duration: i64) -> Self {
        Self {
            duration,
            is_rest: true,
        }
    }

    /// Duration in milliseconds, zero for non-positive durations.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration).unwrap_or(0).saturating_mul(1000)
    }
}

/// An ordered list of intervals, owned by whatever storage supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDefinition {
    pub id: String,
    pub name: String,
    pub intervals: Vec<IntervalSpec>,
}

impl TimerDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, intervals: Vec<IntervalSpec>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            intervals,
        }
    }

    /// Checks the definition can drive a run.
    ///
    /// Individual zero-length intervals are tolerated, but at least one
    /// interval must take time or an unlimited run would never yield.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.intervals.is_empty() {
            return Err(EngineError::InvalidDefinition(format!(
                "timer '{}' has no intervals",
                self.id
            )));
        }
        if self.intervals.iter().all(|i| i.duration_ms() == 0) {
            return Err(EngineError::InvalidDefinition(format!(
                "timer '{}' has no interval with a positive duration",
                self.id
            )));
        }
        Ok(())
    }

    pub fn interval(&self, index: usize) -> Option<&IntervalSpec> {
        self.intervals.get(index)
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 >= self.intervals.len()
    }

    /// Length of one full pass through the intervals.
    pub fn cycle_duration_ms(&self) -> u64 {
        self.intervals.iter().map(IntervalSpec::duration_ms).sum()
    }
}

/// Hours, minutes and seconds for display and authoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hms {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Hms {
    /// Floors to whole seconds, so "0:01" always means at least a full second.
    pub fn from_millis(ms: u64) -> Self {
        Self::from_seconds(ms / 1000)
    }

    pub fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }

    /// Carries overflowing seconds into minutes and minutes into hours.
    pub fn normalized(hours: u64, minutes: u64, seconds: u64) -> Self {
        let minutes = minutes + seconds / 60;
        Self {
            hours: hours + minutes / 60,
            minutes: minutes % 60,
            seconds: seconds % 60,
        }
    }

    pub fn to_seconds(self) -> u64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }
}

impl fmt::Display for Hms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hours > 0 {
            write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else {
            write!(f, "{}:{:02}", self.minutes, self.seconds)
        }
    }
}
