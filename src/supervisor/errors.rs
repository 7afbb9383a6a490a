//! Supervisor error types.

use thiserror::Error;

/// Errors surfaced by the process supervisor and its transport.
#[derive(Debug, Error)]
pub enum McpError {
    /// The child process could not be started.
    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed {
        command: String,
        reason: String,
    },

    /// `start()` was called on a supervisor that already ran.
    #[error("process already started (state: {state})")]
    AlreadyStarted {
        state: String,
    },

    /// An operation required a running child process.
    #[error("process is not running (state: {state})")]
    NotRunning {
        state: String,
    },

    /// The child exited while requests were still in flight.
    #[error("process terminated{}", format_exit_suffix(.code, .signal))]
    ProcessTerminated {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// I/O failure on a live pipe, a serialization failure, or a framing
    /// violation (oversized line, duplicate id, malformed response envelope).
    #[error("transport error: {reason}")]
    TransportError {
        reason: String,
    },

    /// A request did not complete within the configured timeout.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        timeout_ms: u64,
    },
}

/// Format the exit-status suffix for termination errors.
fn format_exit_suffix(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!(" (exit code {code})"),
        (None, Some(signal)) => format!(" (signal {signal})"),
        (None, None) => String::new(),
    }
}
