//! Countdown runtime for interval timers.
//!
//! [`CountdownEngine`] walks an ordered list of intervals across a number of
//! cycles, deriving remaining time from wall-clock timestamps. Hosts call
//! [`CountdownEngine::poll`] on their own schedule; a late poll still fires
//! exactly one [`EngineEvent::SegmentComplete`] per boundary crossed.
//!
//! [`RunnerPersistence`] snapshots a run into a [`SnapshotStore`] so it can
//! be rehydrated after a restart, and [`Runner`] ties engine, persistence
//! and a [`NotificationSink`] together for hosts.

pub mod clock;
pub mod definition;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod notify;
pub mod persistence;
pub mod runner;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use definition::{Hms, IntervalSpec, TimerDefinition};
pub use engine::{CountdownEngine, CycleLimit, EngineEvent, RunState, Status, Tick};
pub use error::{EngineError, RestoreRejection, RunnerError, StateError, StoreError};
pub use ipc::{Command, IpcError, Response, RunStatus, SOCKET_PATH};
pub use notify::{NotificationSink, RecordingSink};
pub use persistence::{storage_key, PersistedRunState, RunnerPersistence};
pub use runner::Runner;
pub use store::{MemoryStore, SnapshotStore};
