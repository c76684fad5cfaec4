//! Host adapter: owns the engine, its snapshots and the notification sink.
//!
//! The host only has to call [`Runner::poll`] on a recurring schedule and
//! forward user commands. Snapshot cadence and event delivery happen here.

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::definition::TimerDefinition;
use crate::engine::{CountdownEngine, CycleLimit, EngineEvent, Status, Tick};
use crate::error::RunnerError;
use crate::ipc::RunStatus;
use crate::notify::NotificationSink;
use crate::persistence::RunnerPersistence;
use crate::store::SnapshotStore;

pub struct Runner<C: Clock, S: SnapshotStore, N: NotificationSink> {
    engine: CountdownEngine<C>,
    persistence: RunnerPersistence<S>,
    sink: N,
    definition: TimerDefinition,
}

impl<C: Clock, S: SnapshotStore, N: NotificationSink> Runner<C, S, N> {
    /// Builds a runner for `definition`, rehydrating a trusted snapshot if
    /// the store holds one.
    pub fn attach(clock: C, persistence: RunnerPersistence<S>, sink: N, definition: TimerDefinition) -> Self {
        let engine = CountdownEngine::new(clock).with_interaction_unlock(sink.requires_interaction_unlock());
        let mut runner = Self {
            engine,
            persistence,
            sink,
            definition,
        };

        let now = runner.engine.clock().now();
        if let Some(state) = runner.persistence.load(&runner.definition, now) {
            if let Err(e) = runner.engine.rehydrate(runner.definition.clone(), state) {
                warn!("Snapshot for '{}' did not fit the engine: {}", runner.definition.id, e);
                if let Err(e) = runner.persistence.clear(&runner.definition.id) {
                    warn!("Failed to clear snapshot: {}", e);
                }
            }
        }
        runner
    }

    pub fn engine(&self) -> &CountdownEngine<C> {
        &self.engine
    }

    pub fn definition(&self) -> &TimerDefinition {
        &self.definition
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    pub fn persistence(&self) -> &RunnerPersistence<S> {
        &self.persistence
    }

    pub fn start(&mut self, cycle_limit: CycleLimit) -> Result<(), RunnerError> {
        self.engine.start(self.definition.clone(), cycle_limit)?;
        self.write_snapshot()
    }

    /// Pauses and snapshots the exact banked value.
    pub fn pause(&mut self) -> Result<Tick, RunnerError> {
        let tick = self.engine.pause()?;
        self.dispatch(&tick.events);
        if tick.finished() {
            self.persistence.clear(&self.definition.id)?;
        } else {
            self.write_snapshot()?;
        }
        Ok(tick)
    }

    pub fn resume(&mut self) -> Result<(), RunnerError> {
        self.engine.resume()?;
        self.write_snapshot()
    }

    /// Always succeeds on the engine side; only deleting the snapshot can fail.
    pub fn reset(&mut self) -> Result<(), RunnerError> {
        self.engine.reset();
        self.persistence.clear(&self.definition.id)?;
        Ok(())
    }

    /// The host's recurring tick. A no-op unless the run is active.
    pub fn poll(&mut self) -> Result<Tick, RunnerError> {
        let now = self.engine.clock().now();
        if self.engine.status() != Status::Running {
            return Ok(Tick {
                remaining_ms: self.engine.remaining_ms_at(now),
                events: Vec::new(),
            });
        }

        let tick = self.engine.poll(now)?;
        self.dispatch(&tick.events);
        if tick.finished() {
            self.persistence.clear(&self.definition.id)?;
        } else if !tick.events.is_empty() {
            // Boundaries move the snapshot's interval, so write out of cadence.
            self.write_snapshot()?;
        } else {
            self.persistence
                .observe(self.engine.state(), &self.definition.id, now)?;
        }
        Ok(tick)
    }

    /// Writes the current state out of cadence, e.g. before the host exits.
    pub fn checkpoint(&mut self) -> Result<(), RunnerError> {
        if self.engine.status() == Status::Idle {
            return Ok(());
        }
        self.write_snapshot()
    }

    /// Records the user gesture that lets the sink play.
    pub fn unlock_interaction(&mut self) {
        self.engine.mark_interaction_unlocked();
    }

    pub fn status(&self) -> RunStatus {
        let state = self.engine.state();
        let now = self.engine.clock().now();
        RunStatus {
            timer_id: self.definition.id.clone(),
            timer_name: self.definition.name.clone(),
            status: state.status,
            interval_index: state.interval_index,
            interval_count: self.definition.intervals.len(),
            cycle_index: state.cycle_index,
            cycle_limit: state.cycle_limit,
            remaining_ms: self.engine.remaining_ms_at(now),
            is_rest: self.engine.current_interval().is_some_and(|i| i.is_rest),
        }
    }

    fn write_snapshot(&mut self) -> Result<(), RunnerError> {
        let now = self.engine.clock().now();
        self.persistence
            .write(self.engine.state(), &self.definition.id, now)?;
        Ok(())
    }

    fn dispatch(&mut self, events: &[EngineEvent]) {
        if events.is_empty() {
            return;
        }
        if self.engine.needs_interaction_unlock() {
            debug!("Dropping {} notifications until the sink is unlocked", events.len());
            return;
        }
        for event in events {
            match event {
                EngineEvent::SegmentComplete {
                    interval_index,
                    cycle_index,
                } => self
                    .sink
                    .segment_complete(&self.definition, *interval_index, *cycle_index),
                EngineEvent::TimerFinished => self.sink.timer_finished(&self.definition),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::definition::IntervalSpec;
    use crate::notify::RecordingSink;
    use crate::persistence::storage_key;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::cell::Cell;
    use std::rc::Rc;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 18, 30, 0).unwrap())
    }

    fn definition() -> TimerDefinition {
        TimerDefinition::new("tabata", "Tabata", vec![IntervalSpec::work(20), IntervalSpec::rest(10)])
    }

    fn runner(clock: &ManualClock, store: MemoryStore) -> Runner<ManualClock, MemoryStore, RecordingSink> {
        Runner::attach(
            clock.clone(),
            RunnerPersistence::new(store),
            RecordingSink::default(),
            definition(),
        )
    }

    #[test]
    fn poll_delivers_events_to_sink_and_clears_on_finish() {
        let clock = clock();
        let mut runner = runner(&clock, MemoryStore::new());
        runner.start(CycleLimit::finite(2)).unwrap();
        assert!(!runner.persistence().store().is_empty());

        for _ in 0..300 {
            clock.advance_ms(200);
            runner.poll().unwrap();
        }

        assert_eq!(runner.sink().segments, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(runner.sink().finished, 1);
        assert_eq!(runner.engine().status(), Status::Idle);
        assert!(runner.persistence().store().is_empty());
    }

    #[test]
    fn snapshots_follow_cadence_while_running() {
        let clock = clock();
        let mut runner = runner(&clock, MemoryStore::new());
        runner.start(CycleLimit::finite(1)).unwrap();

        let written = |r: &Runner<ManualClock, MemoryStore, RecordingSink>| {
            let raw = r.persistence().store().get(&storage_key("tabata")).unwrap().unwrap();
            serde_json::from_str::<crate::PersistedRunState>(&raw).unwrap().write_wall_clock
        };
        let first = written(&runner);

        clock.advance_ms(1_000);
        runner.poll().unwrap();
        assert_eq!(written(&runner), first);

        clock.advance_ms(1_000);
        runner.poll().unwrap();
        assert_eq!(written(&runner), clock.now());
    }

    #[test]
    fn reload_restores_running_timer() {
        let clock = clock();
        let mut first = runner(&clock, MemoryStore::new());
        first.start(CycleLimit::finite(1)).unwrap();
        clock.advance_ms(6_000);
        first.poll().unwrap();
        let store = first.persistence().store().clone();

        clock.advance_ms(3_000);
        let second = runner(&clock, store);
        assert_eq!(second.engine().status(), Status::Running);
        assert_eq!(second.status().remaining_ms, 11_000);
    }

    #[test]
    fn reload_after_staleness_starts_idle() {
        let clock = clock();
        let mut first = runner(&clock, MemoryStore::new());
        first.start(CycleLimit::finite(1)).unwrap();
        let store = first.persistence().store().clone();

        clock.advance_ms(61_000);
        let second = runner(&clock, store);
        assert_eq!(second.engine().status(), Status::Idle);
        assert!(second.persistence().store().is_empty());
    }

    #[test]
    fn reload_fires_boundary_missed_during_gap() {
        let clock = clock();
        let mut first = runner(&clock, MemoryStore::new());
        first.start(CycleLimit::finite(1)).unwrap();
        clock.advance_ms(18_000);
        first.pause().unwrap();
        first.resume().unwrap();
        let store = first.persistence().store().clone();

        clock.advance_ms(5_000);
        let mut second = runner(&clock, store);
        let tick = second.poll().unwrap();
        assert_eq!(second.sink().segments, vec![(0, 0)]);
        assert_eq!(tick.remaining_ms, 7_000);
    }

    #[test]
    fn paused_reload_keeps_exact_value() {
        let clock = clock();
        let mut first = runner(&clock, MemoryStore::new());
        first.start(CycleLimit::Unlimited).unwrap();
        clock.advance_ms(4_321);
        first.pause().unwrap();
        let store = first.persistence().store().clone();

        clock.advance_ms(3_600_000);
        let second = runner(&clock, store);
        assert_eq!(second.engine().status(), Status::Paused);
        assert_eq!(second.status().remaining_ms, 15_679);
        assert_eq!(second.status().cycle_limit, CycleLimit::Unlimited);
    }

    #[test]
    fn reset_deletes_snapshot() {
        let clock = clock();
        let mut runner = runner(&clock, MemoryStore::new());
        runner.start(CycleLimit::finite(3)).unwrap();
        clock.advance_ms(25_000);
        runner.poll().unwrap();

        runner.reset().unwrap();
        let status = runner.status();
        assert_eq!(status.status, Status::Idle);
        assert_eq!(status.interval_index, 0);
        assert_eq!(status.cycle_index, 0);
        assert!(runner.persistence().store().is_empty());
    }

    #[test]
    fn checkpoint_captures_precise_remaining() {
        let clock = clock();
        let mut runner = runner(&clock, MemoryStore::new());
        runner.checkpoint().unwrap();
        assert!(runner.persistence().store().is_empty());

        runner.start(CycleLimit::finite(1)).unwrap();
        clock.advance_ms(1_250);
        runner.checkpoint().unwrap();

        let raw = runner.persistence().store().get(&storage_key("tabata")).unwrap().unwrap();
        let snap: crate::PersistedRunState = serde_json::from_str(&raw).unwrap();
        assert_eq!(snap.current_duration_ms, Some(18_750));
    }

    #[test]
    fn poll_while_idle_is_quiet() {
        let clock = clock();
        let mut runner = runner(&clock, MemoryStore::new());
        let tick = runner.poll().unwrap();
        assert!(tick.events.is_empty());
        assert!(runner.persistence().store().is_empty());
    }

    #[test]
    fn locked_sink_hears_nothing_until_unlocked() {
        let clock = clock();
        let sink = RecordingSink {
            requires_unlock: true,
            ..RecordingSink::default()
        };
        let mut runner = Runner::attach(clock.clone(), RunnerPersistence::new(MemoryStore::new()), sink, definition());
        runner.start(CycleLimit::finite(1)).unwrap();

        clock.advance_ms(20_000);
        runner.poll().unwrap();
        assert!(runner.sink().segments.is_empty());

        runner.unlock_interaction();
        clock.advance_ms(10_000);
        runner.poll().unwrap();
        assert_eq!(runner.sink().segments, vec![(1, 0)]);
        assert_eq!(runner.sink().finished, 1);
    }

    /// Fails every write while `broken` is set.
    struct FlakyStore {
        inner: MemoryStore,
        broken: Rc<Cell<bool>>,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.broken.get() {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    impl SnapshotStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.put(key, value)
        }

        fn delete(&mut self, key: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete(key)
        }
    }

    #[test]
    fn store_failures_surface_after_the_transition() {
        let clock = clock();
        let broken = Rc::new(Cell::new(false));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            broken: broken.clone(),
        };
        let mut runner = Runner::attach(
            clock.clone(),
            RunnerPersistence::new(store),
            RecordingSink::default(),
            definition(),
        );
        runner.start(CycleLimit::finite(1)).unwrap();

        clock.advance_ms(5_000);
        broken.set(true);
        assert!(matches!(runner.pause(), Err(RunnerError::Store(_))));
        assert_eq!(runner.engine().status(), Status::Paused);
        assert_eq!(runner.status().remaining_ms, 15_000);

        broken.set(false);
        runner.resume().unwrap();
        broken.set(true);
        clock.advance_ms(25_000);
        assert!(matches!(runner.poll(), Err(RunnerError::Store(_))));
        assert_eq!(runner.engine().status(), Status::Idle);
        assert_eq!(runner.sink().segments, vec![(0, 0), (1, 0)]);
        assert_eq!(runner.sink().finished, 1);

        broken.set(false);
        runner.start(CycleLimit::finite(1)).unwrap();
        clock.advance_ms(3_000);
        broken.set(true);
        assert!(matches!(runner.reset(), Err(RunnerError::Store(_))));
        assert_eq!(runner.engine().status(), Status::Idle);
        assert_eq!(runner.status().remaining_ms, 0);
    }
}
