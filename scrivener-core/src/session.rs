//! Session orchestrator: reveals an artifact set one file at a time.
//!
//! A session runs as one tokio task that walks the artifacts in order. For
//! each file it takes the revision store's writer lock, runs a reveal, and on
//! completion commits the final text as a snapshot. A settle delay separates
//! files so subscribers can observe each completion before the next file
//! starts writing.
//!
//! # Locking
//!
//! All mutations of the session record happen under the `state` lock, and
//! events are published while it is held. Lock order is always
//! `state → revisions → events`. Because `cancel()` flips the status under
//! the same lock, no progress event can follow a `Cancelled` event, and a
//! late tick from a cancelled reveal sees a non-live session and drops its
//! update.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cancel::CancellationToken;
use crate::config::CoreConfig;
use crate::error::SessionError;
use crate::events::{EventBus, EventReceiver, SessionEvent};
use crate::reveal::{RevealOutcome, RevealScheduler, RevealUpdate};
use crate::revision::RevisionStore;
use crate::types::{
    now_millis, ArtifactSet, CodeOperation, FileAction, FileChange, FileStreamProgress,
    OperationError, OperationErrorKind, SessionId, SessionStatus, StepStatus, StreamingSession,
};

/// Mutable record of the current (or most recent) session.
#[derive(Default)]
struct RunState {
    session: Option<StreamingSession>,
    operation: Option<CodeOperation>,
    progress: Option<FileStreamProgress>,
    token: Option<CancellationToken>,
}

impl RunState {
    /// The session with `id`, if it is still streaming.
    fn live_mut(&mut self, id: SessionId) -> Option<&mut StreamingSession> {
        self.session
            .as_mut()
            .filter(|s| s.id == id && s.status == SessionStatus::Streaming)
    }

    fn is_live(&self, id: SessionId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.id == id && s.status == SessionStatus::Streaming)
    }

    /// Stores `next`, never letting overall progress move backwards.
    fn advance_progress(&mut self, mut next: FileStreamProgress) -> FileStreamProgress {
        if let Some(prev) = &self.progress {
            if next.overall_progress < prev.overall_progress {
                next.overall_progress = prev.overall_progress;
            }
        }
        self.progress = Some(next.clone());
        next
    }
}

fn transition(session: &mut StreamingSession, to: SessionStatus) -> Result<(), SessionError> {
    if !session.status.can_transition_to(to) {
        return Err(SessionError::InvalidTransition {
            from: session.status,
            to,
        });
    }
    session.status = to;
    Ok(())
}

/// Points where tests can make the session task panic.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultSite {
    /// Inside the reveal callback, before the tick is applied.
    Tick,
    /// In the file loop, before a file is entered.
    FileStart,
}

#[cfg(test)]
type FaultHook = Box<dyn Fn(FaultSite, &str) + Send + Sync>;

struct Inner {
    config: CoreConfig,
    revisions: Arc<Mutex<RevisionStore>>,
    events: EventBus,
    state: Mutex<RunState>,
    status: watch::Sender<SessionStatus>,
    #[cfg(test)]
    fault: Mutex<Option<FaultHook>>,
}

/// Sequences reveals across an artifact set. Cheap to clone.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    /// Creates an orchestrator that commits finished files into `revisions`.
    pub fn new(config: CoreConfig, revisions: Arc<Mutex<RevisionStore>>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                revisions,
                events: EventBus::new(),
                state: Mutex::new(RunState::default()),
                status,
                #[cfg(test)]
                fault: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// A receiver that tracks the status of the current session.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Starts streaming `files`.
    ///
    /// Fails with [`SessionError::AlreadyActive`] while another session is
    /// streaming; cancel it first or use [`restart`](Self::restart). A
    /// finished session still on record is discarded (`→ idle`) first.
    /// Configuration is validated before any tick is scheduled.
    pub fn start(&self, files: Vec<FileChange>) -> Result<SessionId, SessionError> {
        self.launch(files, false)
    }

    /// Cancels any streaming session and starts `files` in its place.
    ///
    /// The cancel and the start happen under one hold of the state lock, so
    /// a concurrent `start` or `restart` cannot claim the slot in between.
    pub fn restart(&self, files: Vec<FileChange>) -> Result<SessionId, SessionError> {
        self.launch(files, true)
    }

    fn launch(&self, files: Vec<FileChange>, replace: bool) -> Result<SessionId, SessionError> {
        self.inner.config.validate()?;
        let scheduler = RevealScheduler::new(self.inner.config.reveal)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut seen = HashSet::new();
        for file in &files {
            if !seen.insert(file.file_path.as_str()) {
                return Err(SessionError::DuplicatePath(file.file_path.clone()));
            }
        }

        let files: ArtifactSet = files.into();
        let token = CancellationToken::new();
        let mut state = self.inner.state.lock();
        let live = state
            .session
            .as_ref()
            .filter(|s| s.status == SessionStatus::Streaming)
            .map(|s| s.id);
        if let Some(previous_id) = live {
            if !replace {
                return Err(SessionError::AlreadyActive);
            }
            self.inner.cancel_locked(&mut state, previous_id);
        }
        if let Some(previous) = state.session.as_mut() {
            if previous.status.is_finished() {
                transition(previous, SessionStatus::Idle)?;
            }
        }

        let mut session = StreamingSession::new(Arc::clone(&files));
        transition(&mut session, SessionStatus::Streaming)?;
        session.started_at = Some(now_millis());
        let id = session.id;
        let total = files.len();

        tracing::info!(session_id = %id.short(), files = total, "streaming session started");
        state.operation = Some(CodeOperation::for_artifacts(
            format!("stream {}", id.short()),
            &files,
        ));
        state.session = Some(session);
        state.token = Some(token.clone());
        state.progress = None;
        let first = files.first().map(|f| f.file_path.as_str());
        let progress =
            state.advance_progress(FileStreamProgress::compute(first, 0, total, 0.0, true));
        self.inner.status.send_replace(SessionStatus::Streaming);
        self.inner.events.publish(SessionEvent::Started {
            session_id: id,
            total_files: total,
        });
        self.inner.events.publish(SessionEvent::Progress {
            session_id: id,
            progress,
        });
        drop(state);

        runtime.spawn(supervise(Arc::clone(&self.inner), id, files, scheduler, token));
        Ok(id)
    }

    /// Cancels the streaming session. Returns `false` when none is streaming.
    ///
    /// The pending tick is cancelled, the live buffer of the file being
    /// streamed is dropped (its last committed snapshot stays), and a
    /// `Cancelled` event is published. The session never resumes.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(id) = state.session.as_ref().map(|s| s.id) else {
            return false;
        };
        self.inner.cancel_locked(&mut state, id)
    }

    /// Discards a finished session (`completed|cancelled → idle`).
    ///
    /// Returns `false` when there is nothing to discard.
    pub fn dismiss(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(session) = state.session.as_mut() else {
            return false;
        };
        if transition(session, SessionStatus::Idle).is_err() {
            return false;
        }
        *state = RunState::default();
        self.inner.status.send_replace(SessionStatus::Idle);
        true
    }

    pub fn status(&self) -> SessionStatus {
        self.inner
            .state
            .lock()
            .session
            .as_ref()
            .map_or(SessionStatus::Idle, |s| s.status)
    }

    pub fn session(&self) -> Option<StreamingSession> {
        self.inner.state.lock().session.clone()
    }

    pub fn progress(&self) -> Option<FileStreamProgress> {
        self.inner.state.lock().progress.clone()
    }

    pub fn operation(&self) -> Option<CodeOperation> {
        self.inner.state.lock().operation.clone()
    }

    /// Errors recorded by the current session.
    pub fn errors(&self) -> Vec<OperationError> {
        self.inner
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.errors.clone())
            .unwrap_or_default()
    }

    /// Waits until no session is streaming and returns the resulting status.
    pub async fn wait_until_settled(&self) -> SessionStatus {
        let mut rx = self.inner.status.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if status != SessionStatus::Streaming {
                return status;
            }
            if rx.changed().await.is_err() {
                return self.status();
            }
        }
    }
}

impl Inner {
    #[cfg(test)]
    fn inject(&self, site: FaultSite, file_path: &str) {
        if let Some(hook) = self.fault.lock().as_ref() {
            hook(site, file_path);
        }
    }

    fn cancel_locked(&self, state: &mut RunState, id: SessionId) -> bool {
        let Some(session) = state.live_mut(id) else {
            return false;
        };
        if transition(session, SessionStatus::Cancelled).is_err() {
            return false;
        }
        session.completed_at = Some(now_millis());
        let streaming_path = session.current_file().map(|f| f.file_path.clone());
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        if let Some(operation) = state.operation.as_mut() {
            operation.skip_remaining();
        }
        if let Some(progress) = state.progress.as_mut() {
            progress.is_streaming = false;
        }
        if let Some(path) = streaming_path {
            self.revisions.lock().abort_stream(&path);
        }
        tracing::info!(session_id = %id.short(), "streaming session cancelled");
        self.status.send_replace(SessionStatus::Cancelled);
        self.events.publish(SessionEvent::Cancelled { session_id: id });
        true
    }

    /// Enters file `index`. Returns `false` if the session is no longer live.
    fn begin_file(&self, id: SessionId, index: usize, file: &FileChange, lock_writer: bool) -> bool {
        let mut state = self.state.lock();
        let Some(session) = state.live_mut(id) else {
            return false;
        };
        session.current_file_index = session.current_file_index.max(index);
        let total = session.files.len();
        if let Some(operation) = state.operation.as_mut() {
            operation.set_status(index, StepStatus::Running);
        }
        if lock_writer {
            self.revisions.lock().begin_stream(&file.file_path);
        }
        tracing::debug!(session_id = %id.short(), index, file = %file.file_path, "file started");
        self.events.publish(SessionEvent::CurrentFileChanged {
            session_id: id,
            index,
            file_path: file.file_path.clone(),
        });
        let progress = state.advance_progress(FileStreamProgress::compute(
            Some(&file.file_path),
            index,
            total,
            0.0,
            true,
        ));
        self.events.publish(SessionEvent::Progress {
            session_id: id,
            progress,
        });
        true
    }

    /// Applies one reveal tick to the live buffer and publishes progress.
    fn on_tick(&self, id: SessionId, index: usize, file_path: &str, update: &RevealUpdate<'_>) {
        #[cfg(test)]
        self.inject(FaultSite::Tick, file_path);
        let mut state = self.state.lock();
        let Some(session) = state.live_mut(id) else {
            return;
        };
        let total = session.files.len();
        self.revisions.lock().stream_update(file_path, update.partial);
        let progress = state.advance_progress(FileStreamProgress::compute(
            Some(file_path),
            index,
            total,
            update.progress,
            true,
        ));
        tracing::trace!(file = %file_path, progress = progress.current_file_progress, "tick");
        self.events.publish(SessionEvent::Progress {
            session_id: id,
            progress,
        });
    }

    /// Commits the finished file and publishes `FileCompleted`.
    fn complete_file(&self, id: SessionId, index: usize, file: &FileChange, content: &str) {
        let mut state = self.state.lock();
        let Some(session) = state.live_mut(id) else {
            return;
        };
        let total = session.files.len();
        let revision = self
            .revisions
            .lock()
            .finish_stream(&file.file_path, content);
        if let Some(operation) = state.operation.as_mut() {
            operation.set_status(index, StepStatus::Done);
        }
        let progress = state.advance_progress(FileStreamProgress::compute(
            Some(&file.file_path),
            index,
            total,
            100.0,
            true,
        ));
        tracing::debug!(session_id = %id.short(), index, file = %file.file_path, %revision, "file completed");
        self.events.publish(SessionEvent::Progress {
            session_id: id,
            progress,
        });
        self.events.publish(SessionEvent::FileCompleted {
            session_id: id,
            index,
            file_path: file.file_path.clone(),
            revision,
        });
    }

    /// Records a per-file failure and moves the file's progress to 100 so the
    /// session can advance.
    fn fail_file(&self, id: SessionId, index: usize, file: &FileChange, error: OperationError) {
        let mut state = self.state.lock();
        let Some(session) = state.live_mut(id) else {
            return;
        };
        let total = session.files.len();
        session.errors.push(error.clone());
        self.revisions.lock().abort_stream(&file.file_path);
        if let Some(operation) = state.operation.as_mut() {
            operation.fail(index, error.clone());
        }
        tracing::warn!(session_id = %id.short(), index, %error, "file skipped");
        self.events.publish(SessionEvent::Error {
            session_id: id,
            error,
        });
        let progress = state.advance_progress(FileStreamProgress::compute(
            Some(&file.file_path),
            index,
            total,
            100.0,
            true,
        ));
        self.events.publish(SessionEvent::Progress {
            session_id: id,
            progress,
        });
    }

    /// Moves a live session to `completed`.
    fn finish(&self, id: SessionId) {
        let mut state = self.state.lock();
        let Some(session) = state.live_mut(id) else {
            return;
        };
        if transition(session, SessionStatus::Completed).is_err() {
            return;
        }
        session.completed_at = Some(now_millis());
        let total = session.files.len();
        let last = session.files.last().map(|f| f.file_path.clone());
        let errors = session.errors.len();
        state.token = None;
        let progress = state.advance_progress(FileStreamProgress::compute(
            last.as_deref(),
            total.saturating_sub(1),
            total,
            100.0,
            false,
        ));
        tracing::info!(session_id = %id.short(), files = total, errors, "streaming session completed");
        self.status.send_replace(SessionStatus::Completed);
        self.events.publish(SessionEvent::Progress {
            session_id: id,
            progress,
        });
        self.events.publish(SessionEvent::Completed { session_id: id });
    }

    /// Records a session-level failure, then cancels.
    fn abort(&self, id: SessionId, error: OperationError) {
        let mut state = self.state.lock();
        let Some(session) = state.live_mut(id) else {
            return;
        };
        session.errors.push(error.clone());
        tracing::warn!(session_id = %id.short(), %error, "streaming session aborted");
        self.events.publish(SessionEvent::Error {
            session_id: id,
            error,
        });
        self.cancel_locked(&mut state, id);
    }
}

/// Runs the session's file loop and guarantees a terminal state.
///
/// The loop runs in its own task so that a panic inside it, or the optional
/// wall-clock guard expiring, still ends the session as `cancelled` instead
/// of leaving it `streaming`.
async fn supervise(
    inner: Arc<Inner>,
    id: SessionId,
    files: ArtifactSet,
    scheduler: RevealScheduler,
    token: CancellationToken,
) {
    let mut driver = tokio::spawn(drive_files(
        Arc::clone(&inner),
        id,
        files,
        scheduler,
        token.clone(),
    ));

    let joined = match inner.config.session.max_duration() {
        Some(limit) => match tokio::time::timeout(limit, &mut driver).await {
            Ok(joined) => Some(joined),
            Err(_) => None,
        },
        None => Some((&mut driver).await),
    };

    match joined {
        Some(Ok(())) => inner.finish(id),
        Some(Err(e)) => {
            let message = if e.is_panic() {
                crate::reveal::panic_message(e.into_panic().as_ref())
            } else {
                e.to_string()
            };
            let error = OperationError::new(OperationErrorKind::Callback, message, None);
            inner.abort(id, error);
        }
        None => {
            driver.abort();
            let limit = inner.config.session.max_duration_ms.unwrap_or_default();
            let error = OperationError::new(
                OperationErrorKind::Timeout,
                format!("session exceeded {limit} ms"),
                None,
            );
            inner.abort(id, error);
        }
    }
    token.cancel();
}

async fn drive_files(
    inner: Arc<Inner>,
    id: SessionId,
    files: ArtifactSet,
    scheduler: RevealScheduler,
    token: CancellationToken,
) {
    let total = files.len();
    for (index, file) in files.iter().enumerate() {
        if token.is_cancelled() {
            return;
        }
        #[cfg(test)]
        inner.inject(FaultSite::FileStart, &file.file_path);

        let content = match file.action {
            FileAction::Delete => Ok(""),
            _ => file.revealable_content(),
        };
        let streams = content.is_ok() && file.action != FileAction::Delete;
        if !inner.begin_file(id, index, file, streams) {
            return;
        }

        match content {
            Err(reason) => {
                let error = OperationError::new(
                    OperationErrorKind::Content,
                    reason,
                    Some(&file.file_path),
                );
                inner.fail_file(id, index, file, error);
            }
            Ok(text) if !streams => inner.complete_file(id, index, file, text),
            Ok(text) => {
                let tick_inner = Arc::clone(&inner);
                let path = file.file_path.clone();
                let handle = scheduler.start(text, token.child(), move |update| {
                    tick_inner.on_tick(id, index, &path, update);
                });
                match handle.join().await {
                    RevealOutcome::Completed => inner.complete_file(id, index, file, text),
                    RevealOutcome::Cancelled => return,
                    RevealOutcome::Failed(message) => {
                        let error = OperationError::new(
                            OperationErrorKind::Callback,
                            message,
                            Some(&file.file_path),
                        );
                        inner.fail_file(id, index, file, error);
                    }
                }
            }
        }

        if index + 1 < total {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.config.session.settle_delay()) => {}
            }
        }
    }
}
