//! Inter-process communication between cadence and cadencectl
//!
//! We use Unix domain sockets for local IPC. Each connection carries one
//! newline-terminated JSON command and one JSON response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{CycleLimit, Status};

/// Commands that cadencectl can send to cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// `cycles: None` keeps the host's configured cycle limit.
    Start { cycles: Option<u32>, unlimited: bool },
    Pause,
    Resume,
    Reset,
    Status,
}

/// Responses from cadence back to cadencectl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Status(RunStatus),
    Error(String),
}

/// A point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub timer_id: String,
    pub timer_name: String,
    pub status: Status,
    pub interval_index: usize,
    pub interval_count: usize,
    pub cycle_index: u32,
    pub cycle_limit: CycleLimit,
    pub remaining_ms: u64,
    pub is_rest: bool,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused - is cadence running?")]
    ConnectionRefused,
}

pub const SOCKET_PATH: &str = "/tmp/cadence.sock";
