//! Worker lifecycle states.

use serde::{Deserialize, Serialize};

/// Observable state of the supervised scoring worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// No worker has been spawned yet
    #[default]
    Uninitialized,
    /// Spawned, waiting for the readiness sentinel
    Starting,
    /// Idle and accepting requests
    Ready,
    /// At least one request in flight
    Busy,
    /// Exited or timed out; the next request respawns it
    Crashed,
    /// Shutdown in progress
    ShuttingDown,
    /// Shut down; no further requests are accepted
    Stopped,
}

impl WorkerState {
    /// True while the worker process is up and has signalled readiness.
    pub fn is_serving(&self) -> bool {
        matches!(self, WorkerState::Ready | WorkerState::Busy)
    }

    /// True once shutdown has begun.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::ShuttingDown | WorkerState::Stopped)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Uninitialized => "UNINITIALIZED",
            WorkerState::Starting => "STARTING",
            WorkerState::Ready => "READY",
            WorkerState::Busy => "BUSY",
            WorkerState::Crashed => "CRASHED",
            WorkerState::ShuttingDown => "SHUTTING_DOWN",
            WorkerState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}
