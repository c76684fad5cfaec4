use anyhow::{bail, Result};
use cadence_core::{Command, Hms, IpcError, Response, RunStatus, Status, SOCKET_PATH};
use clap::{Parser, Subcommand};
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "cadencectl")]
#[command(about = "Control a running cadence timer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the timer
    Start {
        /// Number of cycles (defaults to the timer's current setting)
        #[arg(short, long, conflicts_with = "unlimited", value_parser = clap::value_parser!(u32).range(1..))]
        cycles: Option<u32>,
        /// Repeat until reset
        #[arg(short, long)]
        unlimited: bool,
    },
    /// Pause the timer
    Pause,
    /// Resume the timer
    Resume,
    /// Reset the timer
    Reset,
    /// Get timer status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Convert CLI command to IPC command
    let command = match cli.command {
        Commands::Start { cycles, unlimited } => Command::Start { cycles, unlimited },
        Commands::Pause => Command::Pause,
        Commands::Resume => Command::Resume,
        Commands::Reset => Command::Reset,
        Commands::Status => Command::Status,
    };

    // Send command and get response
    let response = send_command(command).await?;

    // Handle response
    match response {
        Response::Ok => println!("OK"),
        Response::Status(status) => print!("{}", describe(&status)),
        Response::Error(e) => bail!(e),
    }

    Ok(())
}

async fn send_command(cmd: Command) -> Result<Response, IpcError> {
    let stream = UnixStream::connect(SOCKET_PATH).await.map_err(|e| match e.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::NotFound => IpcError::ConnectionRefused,
        _ => IpcError::Io(e),
    })?;
    let (reader, mut writer) = stream.into_split();

    // Send command
    let mut msg = serde_json::to_vec(&cmd)?;
    msg.push(b'\n');
    writer.write_all(&msg).await?;

    // Read response
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    Ok(serde_json::from_str(&line)?)
}

fn describe(status: &RunStatus) -> String {
    let mut out = format!("Timer: {} ({})\n", status.timer_name, status.timer_id);
    out.push_str(&format!("State: {}\n", status.status));
    if status.status != Status::Idle {
        let kind = if status.is_rest { "rest" } else { "work" };
        out.push_str(&format!(
            "Interval: {}/{} ({})\n",
            status.interval_index + 1,
            status.interval_count,
            kind
        ));
        out.push_str(&format!("Cycle: {}/{}\n", status.cycle_index + 1, status.cycle_limit));
        out.push_str(&format!("Remaining: {}\n", Hms::from_millis(status.remaining_ms)));
    }
    out
}
