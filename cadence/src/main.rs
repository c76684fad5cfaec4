use anyhow::{Context, Result};
use cadence_core::{CycleLimit, Runner, RunnerPersistence, SystemClock, SOCKET_PATH};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod ipc;
mod library;
mod notifier;
mod store;
mod ui;

use app::App;
use ipc::server::Request;
use notifier::DesktopNotifier;
use store::FileStore;

type HostApp = App<SystemClock, FileStore, DesktopNotifier>;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Interval timer for the terminal", long_about = None)]
struct Args {
    /// Timer id from the library (defaults to the first timer)
    #[arg(short, long)]
    timer: Option<String>,

    /// Number of cycles to run
    #[arg(short, long, conflicts_with = "unlimited", value_parser = clap::value_parser!(u32).range(1..))]
    cycles: Option<u32>,

    /// Repeat until reset
    #[arg(short, long)]
    unlimited: bool,

    /// Path to a timer library (defaults to timers.toml in the config directory)
    #[arg(long)]
    library: Option<PathBuf>,

    /// List the timers in the library and exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config()?;
    init_tracing(args.verbose)?;

    let library = library::load_library(args.library.as_deref())?;
    if args.list {
        for timer in library.timers() {
            println!("{}\t{}\t{} intervals", timer.id, timer.name, timer.intervals.len());
        }
        return Ok(());
    }
    let definition = library.select(args.timer.as_deref())?.clone();
    definition.validate()?;

    let cycle_limit = if args.unlimited {
        CycleLimit::Unlimited
    } else {
        match args.cycles.unwrap_or(config.runner.default_cycles) {
            0 => CycleLimit::Unlimited,
            n => CycleLimit::finite(n),
        }
    };

    let store = FileStore::open_default()?;
    info!("Snapshots are kept in {:?}", store.dir());
    let persistence = RunnerPersistence::new(store)
        .with_staleness(chrono::Duration::seconds(config.runner.staleness_secs))
        .with_write_interval(chrono::Duration::seconds(config.runner.snapshot_interval_secs));
    let runner = Runner::attach(
        SystemClock,
        persistence,
        DesktopNotifier::new(config.runner.notifications),
        definition,
    );
    let mut app = App::new(runner, config, cycle_limit);
    info!("Loaded timer '{}'", app.runner.definition().id);

    let mut requests = ipc::server::spawn()?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, &mut requests);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    let _ = fs::remove_file(SOCKET_PATH);

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_tracing(verbose: bool) -> Result<()> {
    let proj_dirs = config::project_dirs().context("Could not determine data directory")?;
    let log_dir = proj_dirs.data_dir();
    fs::create_dir_all(log_dir)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("cadence.log"))
        .with_context(|| format!("Failed to open log file in {:?}", log_dir))?;

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cadence={level},cadence_core={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut HostApp,
    requests: &mut tokio::sync::mpsc::UnboundedReceiver<Request>,
) -> Result<()> {
    let poll_every = Duration::from_millis(app.config.runner.poll_interval_ms.max(1));
    let mut next_poll = Instant::now();

    loop {
        if Instant::now() >= next_poll {
            app.tick();
            next_poll = Instant::now() + poll_every;
        }

        // Commands from cadencectl are applied here, on the only thread that
        // mutates the runner.
        while let Ok((command, reply)) = requests.try_recv() {
            let _ = reply.send(app.handle_command(command));
        }

        terminal.draw(|f| ui::draw(f, app))?;
        if app.should_quit {
            return Ok(());
        }

        let timeout = next_poll.saturating_duration_since(Instant::now());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }
    }
}
