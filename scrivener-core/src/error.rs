//! Error types for the authoring core.
//!
//! Only caller mistakes surface as `Err`. Failures that happen while a session
//! runs (bad artifact content, a panicking tick callback, the wall-clock guard)
//! are recorded as [`OperationError`](crate::types::OperationError) values and
//! broadcast instead, so a session always reaches a terminal state.

use crate::types::{RevisionId, SessionStatus};

/// Invalid configuration, detected before any tick is scheduled.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chars_per_tick must be greater than zero")]
    ZeroCharsPerTick,
    #[error("tick_interval_ms must be greater than zero")]
    ZeroTickInterval,
    #[error("history max_depth must be greater than zero")]
    ZeroHistoryDepth,
    #[error("diff ceiling `{0}` must be greater than zero")]
    ZeroDiffCeiling(&'static str),
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Errors returned by session lifecycle calls.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a streaming session is already active")]
    AlreadyActive,
    #[error("duplicate file path in artifact set: {0}")]
    DuplicatePath(String),
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session start requires a running tokio runtime")]
    NoRuntime,
}

/// Errors returned by the revision store and diff preview requests.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("{0} is being streamed into; edits are rejected until it completes")]
    FileBusy(String),
    #[error("no file is open for editing")]
    NoActiveFile,
    #[error("no history for {0}")]
    UnknownFile(String),
    #[error("revision {revision} is not reachable in the history of {path}")]
    UnknownRevision { path: String, revision: RevisionId },
}
