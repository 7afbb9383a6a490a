//! Child process lifecycle and request dispatch.
//!
//! One [`McpProcess`] owns one server child process end-to-end: it spawns it
//! with all three stdio streams piped, writes newline-terminated JSON-RPC
//! requests to its stdin, and resolves each waiting caller when the stdout
//! drain assembles the response line bearing that caller's id. Everything
//! that is not a correlated response is published as a [`ProcessEvent`].

use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::{mpsc, oneshot, watch};

use super::errors::McpError;
use super::events::{ProcessEvent, ServerMessage, Subscribers};
use super::framing::LineBuffer;
use super::pending::{Completion, PendingRequests};
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::planner::ExecutionPlan;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Grace period between closing the child's stdin and force-killing it.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Cap on one undelimited stdout line.
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Read size for draining child stdio.
const READ_CHUNK_BYTES: usize = 8192;

/// Synthetic exit code recorded when the child never spawned (mirrors the
/// shell convention for "command not found").
const SPAWN_FAILURE_CODE: i32 = 127;

// ─── Process State ───────────────────────────────────────────────────────────

/// Lifecycle of a supervised child process.
///
/// The supervisor is the sole writer. `send()` is only valid in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Closing,
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessState::NotStarted => "not-started",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Closing => "closing",
            ProcessState::Exited { .. } => "exited",
        };
        f.write_str(label)
    }
}

// ─── Supervisor ──────────────────────────────────────────────────────────────

/// Supervises one MCP server child process.
///
/// All methods take `&self`, so a process can be shared behind an `Arc` and
/// driven from several tasks at once; concurrent `send()` calls each get
/// their own wait and resolve independently, in whatever order the child
/// answers.
pub struct McpProcess {
    command: String,
    args: Vec<String>,
    state: Arc<Mutex<ProcessState>>,
    pending: Arc<PendingRequests>,
    subscribers: Arc<Subscribers>,
    /// Child stdin; `None` before start and once `close()` has taken it.
    writer: AsyncMutex<Option<ChildStdin>>,
    /// Tells the exit monitor to force-kill the child.
    kill: Mutex<Option<oneshot::Sender<()>>>,
    /// Becomes true once the exit monitor has reaped the child.
    exited: Mutex<Option<watch::Receiver<bool>>>,
    request_timeout: Option<Duration>,
    shutdown_grace: Duration,
}

impl McpProcess {
    /// Create a supervisor for `command`. Nothing is spawned until
    /// [`start`](Self::start).
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            pending: Arc::new(PendingRequests::new()),
            subscribers: Arc::new(Subscribers::new()),
            writer: AsyncMutex::new(None),
            kill: Mutex::new(None),
            exited: Mutex::new(None),
            request_timeout: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Create a supervisor for a planned execution.
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        Self::new(plan.command.clone(), plan.args.clone())
    }

    /// Reject any request that has not completed within `timeout`.
    ///
    /// Off by default: without it, a request whose response never arrives
    /// waits until the process exits.
    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = Some(timeout);
    }

    /// Override the grace period `close()` allows before force-killing.
    pub fn set_shutdown_grace(&mut self, grace: Duration) {
        self.shutdown_grace = grace;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to out-of-band observations.
    ///
    /// Dropping the receiver cancels the subscription.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProcessEvent> {
        self.subscribers.subscribe()
    }

    /// Spawn the child and begin draining its stdout and stderr.
    ///
    /// All three stdio streams are piped; the child inherits nothing from
    /// the controlling terminal. Spawn failure is fatal to this launch
    /// attempt and is not retried.
    pub async fn start(&self) -> Result<(), McpError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != ProcessState::NotStarted {
                return Err(McpError::AlreadyStarted {
                    state: state.to_string(),
                });
            }
            *state = ProcessState::Starting;
        }

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.set_state(ProcessState::Exited {
                    code: Some(SPAWN_FAILURE_CODE),
                    signal: None,
                });
                return Err(McpError::SpawnFailed {
                    command: self.command.clone(),
                    reason: format!("{e}"),
                });
            }
        };

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                // kill_on_drop reaps the child when it falls out of scope
                self.set_state(ProcessState::Exited {
                    code: Some(SPAWN_FAILURE_CODE),
                    signal: None,
                });
                return Err(McpError::SpawnFailed {
                    command: self.command.clone(),
                    reason: "failed to capture child stdio".into(),
                });
            }
        };

        *self.writer.lock().await = Some(stdin);

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(false);
        *self.kill.lock().unwrap_or_else(|e| e.into_inner()) = Some(kill_tx);
        *self.exited.lock().unwrap_or_else(|e| e.into_inner()) = Some(exit_rx);

        // Running must be recorded before the monitor task exists: a child
        // that exits immediately would otherwise have its Exited state
        // overwritten below.
        self.set_state(ProcessState::Running);

        tokio::spawn(drain_stdout(
            stdout,
            Arc::clone(&self.pending),
            Arc::clone(&self.subscribers),
        ));
        tokio::spawn(drain_stderr(stderr, Arc::clone(&self.subscribers)));
        tokio::spawn(monitor_exit(
            child,
            kill_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.pending),
            Arc::clone(&self.subscribers),
            exit_tx,
        ));

        tracing::debug!(command = %self.command, "child process spawned");
        Ok(())
    }

    /// Send one request and wait for the response bearing its id.
    ///
    /// The request is written as a single newline-terminated JSON line; the
    /// pending slot is registered before the write so a response can never
    /// arrive unregistered. Writes are serialized whole-line (FIFO in lock
    /// order). The caller suspends until its id is answered, the process
    /// exits, or the configured request timeout fires.
    pub async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != ProcessState::Running {
                return Err(McpError::NotRunning {
                    state: state.to_string(),
                });
            }
        }

        let mut line = serde_json::to_string(request).map_err(|e| McpError::TransportError {
            reason: format!("failed to serialize request: {e}"),
        })?;
        line.push('\n');

        let rx = self.pending.register(request.id)?;

        // The monitor records Exited before it rejects pendings, so a
        // request registered after that sweep is caught here instead of
        // waiting forever.
        if let ProcessState::Exited { code, signal } = self.state() {
            self.pending.cancel(request.id);
            return Err(McpError::ProcessTerminated { code, signal });
        }

        if let Err(e) = self.write_line(&line).await {
            self.pending.cancel(request.id);
            if matches!(e, McpError::TransportError { .. }) {
                self.subscribers.publish(ProcessEvent::Error {
                    reason: e.to_string(),
                });
            }
            return Err(e);
        }

        match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(completion) => flatten_completion(completion),
                Err(_) => {
                    self.pending.cancel(request.id);
                    Err(McpError::Timeout {
                        method: request.method.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
            None => flatten_completion(rx.await),
        }
    }

    /// Close the child's stdin and wait for it to exit, force-killing once
    /// the grace period elapses.
    ///
    /// Idempotent: a process that never started or already exited is left
    /// alone; a concurrent `close()` waits for the first one to finish.
    pub async fn close(&self) {
        let drive = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                ProcessState::NotStarted | ProcessState::Exited { .. } => return,
                ProcessState::Closing => false,
                ProcessState::Starting | ProcessState::Running => {
                    *state = ProcessState::Closing;
                    true
                }
            }
        };

        let exited = self
            .exited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(mut exited) = exited else {
            return;
        };

        if drive {
            // Dropping stdin signals end-of-input; a well-behaved child
            // exits on its own.
            self.writer.lock().await.take();

            let timed_out =
                tokio::time::timeout(self.shutdown_grace, exited.wait_for(|done| *done))
                    .await
                    .is_err();
            if !timed_out {
                return;
            }

            tracing::debug!(command = %self.command, "grace period elapsed, killing child");
            let kill = self.kill.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(kill) = kill {
                let _ = kill.send(());
            }
        }

        let _ = exited.wait_for(|done| *done).await;
    }

    fn set_state(&self, next: ProcessState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Write one serialized line to the child's stdin.
    async fn write_line(&self, line: &str) -> Result<(), McpError> {
        let mut writer = self.writer.lock().await;
        let Some(stdin) = writer.as_mut() else {
            return Err(McpError::NotRunning {
                state: self.state().to_string(),
            });
        };

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::TransportError {
                reason: format!("failed to write to stdin: {e}"),
            })?;
        stdin.flush().await.map_err(|e| McpError::TransportError {
            reason: format!("failed to flush stdin: {e}"),
        })
    }
}

/// Unwrap a oneshot completion.
///
/// A dropped sender means the supervisor went away without resolving; the
/// exit and failure paths all resolve explicitly, so this is a transport
/// defect rather than a protocol outcome.
fn flatten_completion(
    completion: Result<Completion, oneshot::error::RecvError>,
) -> Result<JsonRpcResponse, McpError> {
    match completion {
        Ok(result) => result,
        Err(_) => Err(McpError::TransportError {
            reason: "response channel closed before completion".into(),
        }),
    }
}

/// Extract the terminating signal, where the platform reports one.
#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

// ─── Background Tasks ────────────────────────────────────────────────────────

/// Owns the child handle: reaps its exit status (killing first if asked),
/// records the terminal state, rejects in-flight requests, and publishes the
/// one `Exit` event.
async fn monitor_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    state: Arc<Mutex<ProcessState>>,
    pending: Arc<PendingRequests>,
    subscribers: Arc<Subscribers>,
    exit_tx: watch::Sender<bool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // fires on an explicit kill request and when the supervisor is
        // dropped without close()
        _ = kill_rx => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let (code, signal) = match status {
        Ok(status) => (status.code(), exit_signal(&status)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to reap child process");
            (None, None)
        }
    };

    *state.lock().unwrap_or_else(|e| e.into_inner()) = ProcessState::Exited { code, signal };
    pending.fail_all(|| McpError::ProcessTerminated { code, signal });
    subscribers.publish(ProcessEvent::Exit { code, signal });
    let _ = exit_tx.send(true);
    tracing::debug!(code = ?code, signal = ?signal, "child process exited");
}

/// Drain the child's stdout: reassemble lines across chunk boundaries and
/// correlate them against pending requests.
async fn drain_stdout(
    mut stdout: ChildStdout,
    pending: Arc<PendingRequests>,
    subscribers: Arc<Subscribers>,
) {
    let mut frames = LineBuffer::new(MAX_LINE_BYTES);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        match stdout.read(&mut chunk).await {
            // EOF — exit status and pending rejection are the monitor's job
            Ok(0) => return,
            Ok(n) => match frames.push(&chunk[..n]) {
                Ok(lines) => {
                    for line in lines {
                        handle_stdout_line(&line, &pending, &subscribers);
                    }
                }
                Err(e) => {
                    fail_transport(&pending, &subscribers, e.to_string());
                    return;
                }
            },
            Err(e) => {
                fail_transport(
                    &pending,
                    &subscribers,
                    format!("failed to read from stdout: {e}"),
                );
                return;
            }
        }
    }
}

/// Route one complete stdout line.
///
/// Non-JSON lines and parsed values without a pending id become `Message`
/// observations; one bad line never faults the transport.
fn handle_stdout_line(line: &str, pending: &PendingRequests, subscribers: &Subscribers) {
    if line.trim().is_empty() {
        return;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => {
            subscribers.publish(ProcessEvent::Message(ServerMessage::Text(line.to_string())));
            return;
        }
    };

    let Some(id) = value.get("id").and_then(serde_json::Value::as_u64) else {
        subscribers.publish(ProcessEvent::Message(ServerMessage::Json(value)));
        return;
    };

    // A value with a pending id always resolves that caller — with an error
    // when it does not read as a response envelope, so nobody waits forever.
    let completion = match serde_json::from_value::<JsonRpcResponse>(value.clone()) {
        Ok(response) => Ok(response),
        Err(e) => Err(McpError::TransportError {
            reason: format!("malformed response for id {id}: {e}"),
        }),
    };

    if !pending.complete(id, completion) {
        subscribers.publish(ProcessEvent::Message(ServerMessage::Json(value)));
    }
}

/// Reject every in-flight request and publish the transport failure.
fn fail_transport(pending: &PendingRequests, subscribers: &Subscribers, reason: String) {
    tracing::warn!(reason = %reason, "transport failed");
    subscribers.publish(ProcessEvent::Error {
        reason: reason.clone(),
    });
    pending.fail_all(|| McpError::TransportError {
        reason: reason.clone(),
    });
}

/// Drain the child's stderr, publishing every chunk as it arrives.
async fn drain_stderr(mut stderr: ChildStderr, subscribers: Arc<Subscribers>) {
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => subscribers.publish(ProcessEvent::Stderr(
                String::from_utf8_lossy(&chunk[..n]).into_owned(),
            )),
            Err(e) => {
                tracing::debug!(error = %e, "stderr drain ended");
                return;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
