//! In-flight request bookkeeping.
//!
//! One entry per request id between `send()` and resolution. Entries are
//! removed on response, on process exit, on timeout, or on cancellation —
//! whichever comes first. Ids from one builder are never reused, so there is
//! at most one entry per id and a late response to a removed id is inert.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use super::errors::McpError;
use crate::jsonrpc::JsonRpcResponse;

/// What a waiting caller eventually receives.
pub type Completion = Result<JsonRpcResponse, McpError>;

/// Table of requests awaiting their responses, keyed by request id.
///
/// Registration happens before the request line is written to the child, so
/// a response can never arrive for an unregistered id.
#[derive(Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<u64, oneshot::Sender<Completion>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id and return the receiver its completion will arrive on.
    ///
    /// Rejects an id that is already in flight: caller-supplied requests can
    /// carry arbitrary ids, and two waiters on one id could never both be
    /// resolved.
    pub fn register(&self, id: u64) -> Result<oneshot::Receiver<Completion>, McpError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(&id) {
            return Err(McpError::TransportError {
                reason: format!("request id {id} is already in flight"),
            });
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(id, tx);
        Ok(rx)
    }

    /// Resolve the waiter for `id`, removing its entry.
    ///
    /// Returns false when no such id is pending (stale or duplicate
    /// response); the caller decides what to do with the value then.
    pub fn complete(&self, id: u64, completion: Completion) -> bool {
        let sender = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.remove(&id)
        };
        match sender {
            // The waiter may have given up (timeout, dropped future) — the
            // entry is gone either way.
            Some(tx) => {
                let _ = tx.send(completion);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` without resolving it.
    pub fn cancel(&self, id: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(&id);
    }

    /// Reject every in-flight request, draining the table.
    ///
    /// `make_error` is invoked once per entry since the error type is not
    /// clonable.
    pub fn fail_all(&self, make_error: impl Fn() -> McpError) {
        let drained: Vec<oneshot::Sender<Completion>> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(make_error()));
        }
    }

    /// Number of requests currently awaiting responses.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
