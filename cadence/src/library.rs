//! Timer definitions loaded from `timers.toml`.
//!
//! ```toml
//! [[timer]]
//! id = "tabata"
//! name = "Tabata"
//!
//! [[timer.intervals]]
//! seconds = 20
//!
//! [[timer.intervals]]
//! seconds = 10
//! rest = true
//! ```
//!
//! An interval is either `duration` in seconds or any mix of
//! `hours`/`minutes`/`seconds`, which are normalized (`seconds = 90` is 1:30).

use anyhow::{anyhow, bail, Context, Result};
use cadence_core::{Hms, IntervalSpec, TimerDefinition};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::project_dirs;

#[derive(Debug, Deserialize)]
struct LibraryFile {
    #[serde(default, rename = "timer")]
    timers: Vec<TimerEntry>,
}

#[derive(Debug, Deserialize)]
struct TimerEntry {
    id: String,
    name: String,
    #[serde(default)]
    intervals: Vec<IntervalEntry>,
}

#[derive(Debug, Deserialize)]
struct IntervalEntry {
    duration: Option<i64>,
    #[serde(default)]
    hours: u64,
    #[serde(default)]
    minutes: u64,
    #[serde(default)]
    seconds: u64,
    #[serde(default)]
    rest: bool,
}

impl From<IntervalEntry> for IntervalSpec {
    fn from(entry: IntervalEntry) -> Self {
        let duration = entry.duration.unwrap_or_else(|| {
            Hms::normalized(entry.hours, entry.minutes, entry.seconds).to_seconds() as i64
        });
        IntervalSpec {
            duration,
            is_rest: entry.rest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Library {
    timers: Vec<TimerDefinition>,
}

impl Library {
    pub fn parse(source: &str) -> Result<Self> {
        let file: LibraryFile = toml::from_str(source)?;
        let timers: Vec<TimerDefinition> = file
            .timers
            .into_iter()
            .map(|entry| {
                TimerDefinition::new(
                    entry.id,
                    entry.name,
                    entry.intervals.into_iter().map(IntervalSpec::from).collect(),
                )
            })
            .collect();
        for (i, timer) in timers.iter().enumerate() {
            if timers[..i].iter().any(|other| other.id == timer.id) {
                bail!("Duplicate timer id '{}'", timer.id);
            }
        }
        Ok(Self { timers })
    }

    /// Used when no library file exists.
    pub fn builtin() -> Self {
        Self {
            timers: vec![
                TimerDefinition::new(
                    "tabata",
                    "Tabata",
                    vec![IntervalSpec::work(20), IntervalSpec::rest(10)],
                ),
                TimerDefinition::new(
                    "pomodoro",
                    "Pomodoro",
                    vec![IntervalSpec::work(25 * 60), IntervalSpec::rest(5 * 60)],
                ),
            ],
        }
    }

    pub fn timers(&self) -> &[TimerDefinition] {
        &self.timers
    }

    /// Looks a timer up by id, or takes the first one.
    pub fn select(&self, id: Option<&str>) -> Result<&TimerDefinition> {
        match id {
            Some(id) => self
                .timers
                .iter()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("No timer with id '{}'", id)),
            None => self
                .timers
                .first()
                .ok_or_else(|| anyhow!("The timer library is empty")),
        }
    }
}

pub fn load_library(path: Option<&Path>) -> Result<Library> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match project_dirs() {
            Some(dirs) => dirs.config_dir().join("timers.toml"),
            None => return Ok(Library::builtin()),
        },
    };
    if !path.exists() {
        return Ok(Library::builtin());
    }
    let source = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read timer library at {:?}", path))?;
    Library::parse(&source).with_context(|| format!("Failed to parse timer library at {:?}", path))
}
