//! Out-of-band observations from a supervised child process.
//!
//! The supervisor publishes everything it sees besides correlated responses:
//! stderr output, unsolicited or non-protocol stdout, transport failures,
//! and the final exit. Delivery is fire-and-forget over unbounded channels,
//! so publishing never blocks the stream drains.

use std::sync::Mutex;

use tokio::sync::mpsc;

// ─── Event Types ─────────────────────────────────────────────────────────────

/// Stdout content that was not the answer to any in-flight request.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// A parsed JSON value whose id was absent, null, or unknown
    /// (server-initiated notifications, stray or duplicate responses).
    Json(serde_json::Value),
    /// A line that was not JSON at all (incidental logging from the child),
    /// forwarded unchanged.
    Text(String),
}

/// An observation published by the supervisor.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A chunk read from the child's stderr, decoded lossily.
    Stderr(String),
    /// Unsolicited or non-protocol stdout (see [`ServerMessage`]).
    Message(ServerMessage),
    /// A transport-level failure (write to a closed pipe, oversized line).
    Error { reason: String },
    /// The child terminated. Published exactly once.
    Exit {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

/// Fan-out of [`ProcessEvent`]s to any number of subscribers.
///
/// Dropping a receiver cancels that subscription; the dead sender is pruned
/// on the next publish.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<ProcessEvent>>>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<ProcessEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).push(tx);
        rx
    }

    /// Publish an event to every live subscriber.
    pub(crate) fn publish(&self, event: ProcessEvent) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let subs = Subscribers::new();
        let mut a = subs.subscribe();
        let mut b = subs.subscribe();

        subs.publish(ProcessEvent::Stderr("warming up\n".into()));

        for rx in [&mut a, &mut b] {
            match rx.recv().await {
                Some(ProcessEvent::Stderr(chunk)) => assert_eq!(chunk, "warming up\n"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let subs = Subscribers::new();
        let rx = subs.subscribe();
        let mut live = subs.subscribe();
        assert_eq!(subs.subscriber_count(), 2);

        drop(rx);
        subs.publish(ProcessEvent::Error {
            reason: "pipe closed".into(),
        });

        assert_eq!(subs.subscriber_count(), 1);
        assert!(matches!(
            live.recv().await,
            Some(ProcessEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let subs = Subscribers::new();
        subs.publish(ProcessEvent::Exit {
            code: Some(0),
            signal: None,
        });
    }
}
