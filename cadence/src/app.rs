use cadence_core::{
    Clock, Command, CycleLimit, EngineEvent, Hms, NotificationSink, Response, Runner, RunnerError,
    SnapshotStore, Status,
};
use crossterm::event::KeyCode;
use tracing::{error, warn};

use crate::config::Config;

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum AppMode {
    #[default]
    Normal,
    ShowHelp,
}

pub struct App<C: Clock, S: SnapshotStore, N: NotificationSink> {
    pub runner: Runner<C, S, N>,
    pub config: Config,
    /// Applied on the next start.
    pub cycle_limit: CycleLimit,
    pub mode: AppMode,
    pub message: Option<String>,
    pub last_error: Option<String>,
    pub should_quit: bool,
}

impl<C: Clock, S: SnapshotStore, N: NotificationSink> App<C, S, N> {
    pub fn new(runner: Runner<C, S, N>, config: Config, cycle_limit: CycleLimit) -> Self {
        // A restored run keeps the limit it was started with.
        let cycle_limit = match runner.engine().status() {
            Status::Idle => cycle_limit,
            _ => runner.engine().state().cycle_limit,
        };
        Self {
            runner,
            config,
            cycle_limit,
            mode: AppMode::Normal,
            message: None,
            last_error: None,
            should_quit: false,
        }
    }

    /// Called on every poll interval by the host loop.
    pub fn tick(&mut self) {
        match self.runner.poll() {
            Ok(tick) => self.describe(&tick.events),
            Err(e) => self.record_error(e),
        }
    }

    /// Start, pause or resume depending on the current state.
    pub fn toggle(&mut self) {
        let result = match self.runner.engine().status() {
            Status::Idle => self.runner.start(self.cycle_limit),
            Status::Running => self.runner.pause().map(|tick| self.describe(&tick.events)),
            Status::Paused => self.runner.resume(),
        };
        match result {
            Ok(()) => self.last_error = None,
            Err(e) => self.record_error(e),
        }
    }

    pub fn reset(&mut self) {
        match self.runner.reset() {
            Ok(()) => {
                self.message = None;
                self.last_error = None;
            }
            Err(e) => self.record_error(e),
        }
    }

    pub fn adjust_cycles(&mut self, delta: i32) {
        self.cycle_limit = match self.cycle_limit {
            CycleLimit::Unlimited if delta < 0 => CycleLimit::Unlimited,
            CycleLimit::Unlimited => CycleLimit::finite(1),
            CycleLimit::Finite(n) => CycleLimit::finite(n.saturating_add_signed(delta)),
        };
    }

    pub fn toggle_unlimited(&mut self) {
        self.cycle_limit = match self.cycle_limit {
            CycleLimit::Unlimited => CycleLimit::finite(1),
            CycleLimit::Finite(_) => CycleLimit::Unlimited,
        };
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        self.runner.unlock_interaction();
        if self.mode == AppMode::ShowHelp {
            self.mode = AppMode::Normal;
            return;
        }
        match code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Char(' ') => self.toggle(),
            KeyCode::Char('r') => self.reset(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_cycles(1),
            KeyCode::Char('-') => self.adjust_cycles(-1),
            KeyCode::Char('u') => self.toggle_unlimited(),
            KeyCode::Char('?') => self.mode = AppMode::ShowHelp,
            _ => {}
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Response {
        let result = match command {
            Command::Start { cycles: Some(0), .. } => {
                return Response::Error("cycle count must be at least 1".to_string());
            }
            Command::Start { cycles, unlimited } => {
                if unlimited {
                    self.cycle_limit = CycleLimit::Unlimited;
                } else if let Some(n) = cycles {
                    self.cycle_limit = CycleLimit::finite(n);
                }
                self.runner.start(self.cycle_limit)
            }
            Command::Pause => self.runner.pause().map(|tick| self.describe(&tick.events)),
            Command::Resume => self.runner.resume(),
            Command::Reset => self.runner.reset(),
            Command::Status => return Response::Status(self.runner.status()),
        };
        match result {
            Ok(()) => {
                self.last_error = None;
                Response::Ok
            }
            Err(RunnerError::Engine(e)) => Response::Error(e.to_string()),
            Err(e) => {
                // The transition happened; only the snapshot is behind.
                let text = e.to_string();
                self.record_error(e);
                Response::Error(text)
            }
        }
    }

    /// Saves precise state before exiting.
    pub fn quit(&mut self) {
        if let Err(e) = self.runner.checkpoint() {
            error!("Failed to save state on exit: {}", e);
        }
        self.should_quit = true;
    }

    pub fn remaining(&self) -> Hms {
        Hms::from_millis(self.runner.status().remaining_ms)
    }

    /// Fraction of the current interval already elapsed.
    pub fn progress(&self) -> f64 {
        let status = self.runner.status();
        let total = self
            .runner
            .engine()
            .current_interval()
            .map(|i| i.duration_ms())
            .unwrap_or(0);
        if total == 0 {
            return 0.0;
        }
        (1.0 - status.remaining_ms as f64 / total as f64).clamp(0.0, 1.0)
    }

    fn describe(&mut self, events: &[EngineEvent]) {
        let Some(event) = events.last() else {
            return;
        };
        self.last_error = None;
        self.message = Some(match event {
            EngineEvent::TimerFinished => "Finished!".to_string(),
            EngineEvent::SegmentComplete {
                interval_index,
                cycle_index,
            } => format!("Interval {} of cycle {} done", interval_index + 1, cycle_index + 1),
        });
    }

    fn record_error(&mut self, e: RunnerError) {
        match &e {
            RunnerError::Engine(_) => warn!("{}", e),
            RunnerError::Store(_) => error!("{}", e),
        }
        self.last_error = Some(e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{
        IntervalSpec, ManualClock, MemoryStore, RecordingSink, RunnerPersistence, TimerDefinition,
    };
    use cadence_core::StoreError;
    use chrono::{TimeZone, Utc};
    use std::cell::Cell;
    use std::rc::Rc;

    type TestApp = App<ManualClock, MemoryStore, RecordingSink>;

    fn app(clock: &ManualClock) -> TestApp {
        let definition = TimerDefinition::new(
            "drill",
            "Drill",
            vec![IntervalSpec::work(3), IntervalSpec::rest(2)],
        );
        let runner = Runner::attach(
            clock.clone(),
            RunnerPersistence::new(MemoryStore::new()),
            RecordingSink::default(),
            definition,
        );
        App::new(runner, Config::default(), CycleLimit::finite(1))
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 14, 9, 0, 0).unwrap())
    }

    #[test]
    fn space_cycles_through_start_pause_resume() {
        let clock = clock();
        let mut app = app(&clock);

        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.runner.engine().status(), Status::Running);
        clock.advance_ms(1_000);
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.runner.engine().status(), Status::Paused);
        assert_eq!(app.remaining().to_string(), "0:02");
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.runner.engine().status(), Status::Running);
    }

    #[test]
    fn ticks_report_boundaries() {
        let clock = clock();
        let mut app = app(&clock);
        app.toggle();

        clock.advance_ms(3_000);
        app.tick();
        assert_eq!(app.message.as_deref(), Some("Interval 1 of cycle 1 done"));

        clock.advance_ms(2_000);
        app.tick();
        assert_eq!(app.message.as_deref(), Some("Finished!"));
        assert_eq!(app.runner.engine().status(), Status::Idle);
    }

    #[test]
    fn cycle_adjustments_stay_positive() {
        let clock = clock();
        let mut app = app(&clock);
        app.adjust_cycles(-1);
        assert_eq!(app.cycle_limit, CycleLimit::Finite(1));
        app.adjust_cycles(2);
        assert_eq!(app.cycle_limit, CycleLimit::Finite(3));
        app.handle_key(KeyCode::Char('u'));
        assert_eq!(app.cycle_limit, CycleLimit::Unlimited);
        app.handle_key(KeyCode::Char('+'));
        assert_eq!(app.cycle_limit, CycleLimit::Finite(1));
    }

    #[test]
    fn commands_map_to_responses() {
        let clock = clock();
        let mut app = app(&clock);

        assert!(matches!(app.handle_command(Command::Pause), Response::Error(_)));
        assert_eq!(
            app.handle_command(Command::Start {
                cycles: Some(2),
                unlimited: false
            }),
            Response::Ok
        );
        assert_eq!(app.cycle_limit, CycleLimit::Finite(2));

        clock.advance_ms(500);
        match app.handle_command(Command::Status) {
            Response::Status(status) => {
                assert_eq!(status.status, Status::Running);
                assert_eq!(status.remaining_ms, 2_500);
                assert_eq!(status.timer_id, "drill");
            }
            other => panic!("unexpected response {:?}", other),
        }

        assert_eq!(app.handle_command(Command::Reset), Response::Ok);
        assert_eq!(app.runner.engine().status(), Status::Idle);
    }

    #[test]
    fn help_overlay_swallows_next_key() {
        let clock = clock();
        let mut app = app(&clock);
        app.handle_key(KeyCode::Char('?'));
        assert_eq!(app.mode, AppMode::ShowHelp);
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.runner.engine().status(), Status::Idle);
    }

    #[test]
    fn quit_checkpoints_running_timer() {
        let clock = clock();
        let mut app = app(&clock);
        app.toggle();
        clock.advance_ms(700);
        app.handle_key(KeyCode::Char('q'));
        assert!(app.should_quit);
        assert!(!app.runner.persistence().store().is_empty());
    }

    #[test]
    fn start_command_rejects_zero_cycles() {
        let clock = clock();
        let mut app = app(&clock);
        let response = app.handle_command(Command::Start {
            cycles: Some(0),
            unlimited: false,
        });
        assert!(matches!(response, Response::Error(_)));
        assert_eq!(app.runner.engine().status(), Status::Idle);
        assert_eq!(app.cycle_limit, CycleLimit::Finite(1));
    }

    struct FlakyStore {
        inner: MemoryStore,
        broken: Rc<Cell<bool>>,
    }

    impl SnapshotStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.broken.get() {
                return Err(StoreError::Io(std::io::Error::other("read-only filesystem")));
            }
            self.inner.put(key, value)
        }

        fn delete(&mut self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn store_error_clears_once_things_work_again() {
        let clock = clock();
        let broken = Rc::new(Cell::new(false));
        let runner = Runner::attach(
            clock.clone(),
            RunnerPersistence::new(FlakyStore {
                inner: MemoryStore::new(),
                broken: broken.clone(),
            }),
            RecordingSink::default(),
            TimerDefinition::new("drill", "Drill", vec![IntervalSpec::work(3), IntervalSpec::rest(2)]),
        );
        let mut app = App::new(runner, Config::default(), CycleLimit::finite(1));
        app.toggle();

        broken.set(true);
        clock.advance_ms(1_000);
        app.toggle();
        assert_eq!(app.runner.engine().status(), Status::Paused);
        assert!(app.last_error.is_some());

        broken.set(false);
        app.toggle();
        assert_eq!(app.last_error, None);

        broken.set(true);
        clock.advance_ms(2_000);
        app.tick();
        assert!(app.last_error.is_some());

        broken.set(false);
        clock.advance_ms(2_000);
        app.tick();
        assert_eq!(app.last_error, None);
        assert_eq!(app.message.as_deref(), Some("Finished!"));
    }
}
