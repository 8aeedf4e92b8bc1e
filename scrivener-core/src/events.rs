//! Observer channel for session lifecycle and progress.
//!
//! Every notification the core produces is normalised into one
//! [`SessionEvent`] enum and fanned out over tokio unbounded MPSC channels,
//! one per subscriber. Unbounded is fine here: producers are rate-limited by
//! the tick interval, and a subscriber that stops reading is pruned as soon
//! as its receiver is dropped.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::{FileStreamProgress, OperationError, RevisionId, SessionId};

/// Everything a presentation layer can observe about a session.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A session moved to `streaming`.
    Started {
        session_id: SessionId,
        total_files: usize,
    },
    /// The orchestrator began working on a new artifact.
    CurrentFileChanged {
        session_id: SessionId,
        index: usize,
        file_path: String,
    },
    /// Emitted on every tick and at each file boundary.
    Progress {
        session_id: SessionId,
        progress: FileStreamProgress,
    },
    /// An artifact finished revealing and its snapshot was committed.
    FileCompleted {
        session_id: SessionId,
        index: usize,
        file_path: String,
        revision: RevisionId,
    },
    /// A per-file failure. The session keeps going.
    Error {
        session_id: SessionId,
        error: OperationError,
    },
    /// Every artifact was handled.
    Completed { session_id: SessionId },
    /// The session was cancelled and will not resume.
    Cancelled { session_id: SessionId },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::Started { session_id, .. }
            | SessionEvent::CurrentFileChanged { session_id, .. }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::FileCompleted { session_id, .. }
            | SessionEvent::Error { session_id, .. }
            | SessionEvent::Completed { session_id }
            | SessionEvent::Cancelled { session_id } => *session_id,
        }
    }

    /// `Completed` and `Cancelled` end a session's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Completed { .. } | SessionEvent::Cancelled { .. }
        )
    }
}

/// Receive half handed to subscribers.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Fan-out of [`SessionEvent`]s to any number of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. It sees only events published afterwards.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber, dropping closed ones.
    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
