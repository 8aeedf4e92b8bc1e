//! Shared data model for the authoring core.
//!
//! All types here are fully owned and `Send`, so they can be moved out of the
//! session task and handed to subscribers without borrowing from core state.
//! Snapshots and artifacts are immutable once built; the only mutable records
//! are `StreamingSession` and `CodeOperation`, and those are mutated solely by
//! the session orchestrator.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Returns the current Unix timestamp in milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// What a streamed artifact does to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// The file is new; its content is revealed from empty.
    #[default]
    Create,
    /// The file exists; its content is replaced by the revealed text.
    Modify,
    /// The file is removed. Nothing is revealed.
    Delete,
}

/// One file's final target content within a streaming session.
///
/// `content` is optional because callers may hand over artifacts whose body
/// failed to materialise; the orchestrator turns that into a per-file
/// `OperationError` instead of refusing the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: String,
    pub content: Option<String>,
    #[serde(default)]
    pub action: FileAction,
    #[serde(default)]
    pub language: Option<String>,
}

impl FileChange {
    /// Builds a `create` artifact with the given content.
    pub fn create(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: Some(content.into()),
            action: FileAction::Create,
            language: None,
        }
    }

    /// Builds a `modify` artifact with the given content.
    pub fn modify(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action: FileAction::Modify,
            ..Self::create(file_path, content)
        }
    }

    /// Builds a `delete` artifact. Deletes carry no content.
    pub fn delete(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: None,
            action: FileAction::Delete,
            language: None,
        }
    }

    /// Sets the language hint.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Returns the text to reveal, or the reason it cannot be revealed.
    ///
    /// Content is invalid when absent or when it contains a NUL byte (binary
    /// payloads are not program text).
    pub fn revealable_content(&self) -> Result<&str, &'static str> {
        match self.content.as_deref() {
            None => Err("content is missing"),
            Some(text) if text.contains('\0') => Err("content contains a NUL byte"),
            Some(text) => Ok(text),
        }
    }
}

/// An ordered, immutable list of artifacts revealed in one session.
pub type ArtifactSet = Arc<[FileChange]>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A streaming session identifier (UUID v4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// First 8 hex characters, for log lines only.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifies one immutable snapshot in the revision store.
///
/// Ids are allocated from a single counter per store, so they are unique
/// across files and increase in commit order.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Lifecycle of a streaming session.
///
/// Valid transitions: `Idle → Streaming → Completed`, `Streaming → Cancelled`,
/// and the discard edges `Cancelled → Idle` / `Completed → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Streaming,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Streaming)
                | (Streaming, Completed)
                | (Streaming, Cancelled)
                | (Cancelled, Idle)
                | (Completed, Idle)
        )
    }

    /// `Completed` and `Cancelled` are terminal for the session's run.
    pub fn is_finished(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The live record of one streaming session.
#[derive(Debug, Clone, Serialize)]
pub struct StreamingSession {
    pub id: SessionId,
    pub files: ArtifactSet,
    pub current_file_index: usize,
    pub status: SessionStatus,
    /// Unix timestamp in milliseconds.
    pub started_at: Option<i64>,
    /// Unix timestamp in milliseconds, set when the session finishes.
    pub completed_at: Option<i64>,
    /// Per-file failures recorded while the session ran.
    pub errors: Vec<OperationError>,
}

impl StreamingSession {
    /// Creates an `Idle` session over `files`.
    pub fn new(files: ArtifactSet) -> Self {
        Self {
            id: SessionId::new(),
            files,
            current_file_index: 0,
            status: SessionStatus::Idle,
            started_at: None,
            completed_at: None,
            errors: Vec::new(),
        }
    }

    /// The artifact currently being revealed, if any.
    pub fn current_file(&self) -> Option<&FileChange> {
        self.files.get(self.current_file_index)
    }
}

/// Derived progress of a session, published on every tick.
///
/// Percentages are in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStreamProgress {
    pub current_file: Option<String>,
    pub current_file_index: usize,
    pub total_files: usize,
    pub current_file_progress: f64,
    pub overall_progress: f64,
    pub is_streaming: bool,
}

impl FileStreamProgress {
    /// Computes progress for file `index` of `total` at `file_progress` percent.
    ///
    /// `overall = index / total * 100 + file_progress / total`, evaluated as
    /// `(index * 100 + file_progress) / total` so that "file K at 100%" and
    /// "file K+1 at 0%" produce bit-identical values. An empty session is
    /// reported as fully done.
    pub fn compute(
        current_file: Option<&str>,
        index: usize,
        total: usize,
        file_progress: f64,
        is_streaming: bool,
    ) -> Self {
        let file_progress = file_progress.clamp(0.0, 100.0);
        let overall_progress = if total == 0 {
            100.0
        } else {
            ((index as f64 * 100.0 + file_progress) / total as f64).clamp(0.0, 100.0)
        };
        Self {
            current_file: current_file.map(str::to_owned),
            current_file_index: index,
            total_files: total,
            current_file_progress: file_progress,
            overall_progress,
            is_streaming,
        }
    }
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// An immutable capture of a file buffer at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSnapshot {
    pub id: RevisionId,
    pub file_path: String,
    pub content: Arc<str>,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

/// The type of change for a diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Context,
    Added,
    Removed,
}

impl DiffLineKind {
    /// Unified-diff prefix character.
    pub fn prefix(self) -> char {
        match self {
            DiffLineKind::Context => ' ',
            DiffLineKind::Added => '+',
            DiffLineKind::Removed => '-',
        }
    }
}

/// A contiguous run of lines sharing one change kind.
///
/// Each line keeps its original terminator (`\n` or `\r\n`, absent on a final
/// unterminated line) so hunks can reconstruct either side byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    pub kind: DiffLineKind,
    pub lines: Vec<String>,
}

/// Added/removed line counts for a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
}

/// Result of diffing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiffBody {
    /// Full line-level hunks.
    Hunks { hunks: Vec<DiffHunk>, stats: DiffStats },
    /// Inputs exceeded the configured ceiling; only line counts are reported.
    Summary { old_lines: usize, new_lines: usize },
}

impl DiffBody {
    /// Hunks, or an empty slice for a summary.
    pub fn hunks(&self) -> &[DiffHunk] {
        match self {
            DiffBody::Hunks { hunks, .. } => hunks,
            DiffBody::Summary { .. } => &[],
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, DiffBody::Summary { .. })
    }
}

impl fmt::Display for DiffBody {
    /// Summaries render as `"N lines before vs M lines after"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffBody::Summary { old_lines, new_lines } => {
                write!(f, "{old_lines} lines before vs {new_lines} lines after")
            }
            DiffBody::Hunks { stats, .. } => {
                write!(f, "+{} -{}", stats.added, stats.removed)
            }
        }
    }
}

/// A diff between two revisions of one file, ready for preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffPreview {
    pub id: uuid::Uuid,
    pub file_path: String,
    pub from_revision: RevisionId,
    pub to_revision: RevisionId,
    pub body: DiffBody,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    /// An artifact's content was missing or invalid.
    Content,
    /// A tick callback panicked.
    Callback,
    /// The wall-clock guard expired.
    Timeout,
}

impl fmt::Display for OperationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationErrorKind::Content => "content",
            OperationErrorKind::Callback => "callback",
            OperationErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A failure surfaced to subscribers. Never aborts the session by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
    pub file_path: Option<String>,
}

impl OperationError {
    pub fn new(
        kind: OperationErrorKind,
        message: impl Into<String>,
        file_path: Option<&str>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            file_path: file_path.map(str::to_owned),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_path {
            Some(path) => write!(f, "{} error in {}: {}", self.kind, path, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

/// Status of one step within a `CodeOperation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
    /// The operation was cancelled before this step finished.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStep {
    pub name: String,
    pub status: StepStatus,
    pub error: Option<OperationError>,
}

/// A named multi-step action. A streaming session is mirrored as one
/// operation with a step per artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeOperation {
    pub name: String,
    pub steps: Vec<OperationStep>,
}

impl CodeOperation {
    /// One pending step per artifact, named after its path.
    pub fn for_artifacts(name: impl Into<String>, files: &[FileChange]) -> Self {
        Self {
            name: name.into(),
            steps: files
                .iter()
                .map(|f| OperationStep {
                    name: f.file_path.clone(),
                    status: StepStatus::Pending,
                    error: None,
                })
                .collect(),
        }
    }

    pub(crate) fn set_status(&mut self, index: usize, status: StepStatus) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = status;
        }
    }

    pub(crate) fn fail(&mut self, index: usize, error: OperationError) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = StepStatus::Failed;
            step.error = Some(error);
        }
    }

    /// Marks every unfinished step as skipped.
    pub(crate) fn skip_remaining(&mut self) {
        for step in &mut self.steps {
            if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
                step.status = StepStatus::Skipped;
            }
        }
    }

    /// Errors attached to failed steps, in step order.
    pub fn errors(&self) -> impl Iterator<Item = &OperationError> {
        self.steps.iter().filter_map(|s| s.error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_the_state_machine() {
        use SessionStatus::*;
        assert!(Idle.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Completed));
        assert!(Streaming.can_transition_to(Cancelled));
        assert!(Cancelled.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Streaming));
        assert!(!Completed.can_transition_to(Streaming));
        assert!(!Streaming.can_transition_to(Idle));
    }

    #[test]
    fn progress_is_continuous_across_file_boundaries() {
        let end_of_first = FileStreamProgress::compute(Some("a"), 0, 3, 100.0, true);
        let start_of_second = FileStreamProgress::compute(Some("b"), 1, 3, 0.0, true);
        assert_eq!(end_of_first.overall_progress, start_of_second.overall_progress);

        let last = FileStreamProgress::compute(Some("c"), 2, 3, 100.0, false);
        assert_eq!(last.overall_progress, 100.0);
    }

    #[test]
    fn empty_session_progress_is_complete() {
        let p = FileStreamProgress::compute(None, 0, 0, 0.0, false);
        assert_eq!(p.overall_progress, 100.0);
    }

    #[test]
    fn revealable_content_rejects_missing_and_binary() {
        assert!(FileChange::delete("x").revealable_content().is_err());
        assert!(FileChange::create("x", "a\0b").revealable_content().is_err());
        assert_eq!(FileChange::create("x", "ok").revealable_content(), Ok("ok"));
    }

    #[test]
    fn summary_body_renders_line_counts() {
        let body = DiffBody::Summary { old_lines: 12, new_lines: 40 };
        assert_eq!(body.to_string(), "12 lines before vs 40 lines after");
    }
}
