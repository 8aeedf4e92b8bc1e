//! In-process façade over the orchestrator, revision store, and diff engine.
//!
//! This is the surface a presentation layer talks to: session control and
//! progress subscription, the interactive edit commands, and diff previews.
//! Nothing here renders or persists anything.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::CoreConfig;
use crate::diff::DiffEngine;
use crate::error::{ConfigError, EditError, SessionError};
use crate::events::EventReceiver;
use crate::revision::RevisionStore;
use crate::session::SessionOrchestrator;
use crate::types::{
    CodeOperation, DiffPreview, FileChange, FileStreamProgress, OperationError, RevisionId,
    SessionId, SessionStatus, StreamingSession,
};

/// Owns one orchestrator and the revision store it writes into.
#[derive(Clone)]
pub struct Workbench {
    config: CoreConfig,
    orchestrator: SessionOrchestrator,
    revisions: Arc<Mutex<RevisionStore>>,
    diff: DiffEngine,
}

impl Workbench {
    /// Validates `config` and builds an idle workbench.
    pub fn new(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let revisions = Arc::new(Mutex::new(RevisionStore::new(config.history)));
        Ok(Self {
            config,
            orchestrator: SessionOrchestrator::new(config, Arc::clone(&revisions)),
            revisions,
            diff: DiffEngine::new(config.diff),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    /// Subscribes to progress, lifecycle, and error events.
    pub fn subscribe(&self) -> EventReceiver {
        self.orchestrator.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.orchestrator.watch_status()
    }

    /// Starts a session. Fails while another session is streaming.
    pub fn start_streaming_session(
        &self,
        files: Vec<FileChange>,
    ) -> Result<SessionId, SessionError> {
        self.orchestrator.start(files)
    }

    /// Cancels any streaming session and starts a new one.
    pub fn restart_streaming_session(
        &self,
        files: Vec<FileChange>,
    ) -> Result<SessionId, SessionError> {
        self.orchestrator.restart(files)
    }

    pub fn cancel_streaming_session(&self) -> bool {
        self.orchestrator.cancel()
    }

    pub fn dismiss_session(&self) -> bool {
        self.orchestrator.dismiss()
    }

    pub fn status(&self) -> SessionStatus {
        self.orchestrator.status()
    }

    pub fn session(&self) -> Option<StreamingSession> {
        self.orchestrator.session()
    }

    pub fn progress(&self) -> Option<FileStreamProgress> {
        self.orchestrator.progress()
    }

    pub fn operation(&self) -> Option<CodeOperation> {
        self.orchestrator.operation()
    }

    pub fn errors(&self) -> Vec<OperationError> {
        self.orchestrator.errors()
    }

    pub async fn wait_until_settled(&self) -> SessionStatus {
        self.orchestrator.wait_until_settled().await
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Switches the file under edit, seeding `baseline` for unseen files.
    pub fn open_file(&self, file_path: &str, baseline: Option<&str>) -> RevisionId {
        self.revisions.lock().open_file(file_path, baseline)
    }

    pub fn active_file(&self) -> Option<String> {
        self.revisions.lock().active_file().map(str::to_owned)
    }

    /// Commits a manual edit and makes `file_path` the file under edit.
    ///
    /// Rejected with [`EditError::FileBusy`] while the file is being streamed.
    pub fn commit_edit(&self, file_path: &str, content: &str) -> Result<RevisionId, EditError> {
        self.revisions.lock().commit_edit(file_path, content)
    }

    pub fn undo(&self) -> Result<bool, EditError> {
        self.revisions.lock().undo()
    }

    pub fn redo(&self) -> Result<bool, EditError> {
        self.revisions.lock().redo()
    }

    pub fn can_undo(&self) -> bool {
        self.revisions.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.revisions.lock().can_redo()
    }

    /// Visible content of `file_path`, including an in-flight partial.
    pub fn buffer(&self, file_path: &str) -> Option<String> {
        self.revisions.lock().buffer(file_path).map(str::to_owned)
    }

    pub fn is_dirty(&self, file_path: &str) -> bool {
        self.revisions.lock().is_dirty(file_path)
    }

    pub fn current_revision(&self, file_path: &str) -> Option<RevisionId> {
        self.revisions.lock().current_revision(file_path)
    }

    /// Reachable revisions of `file_path`, oldest first.
    pub fn revisions(&self, file_path: &str) -> Vec<RevisionId> {
        self.revisions.lock().revisions(file_path)
    }

    // -----------------------------------------------------------------------
    // Diff preview
    // -----------------------------------------------------------------------

    /// Diffs two reachable revisions of `file_path`.
    ///
    /// Oversized inputs produce a summary body rather than an error.
    pub fn request_diff_preview(
        &self,
        file_path: &str,
        from: RevisionId,
        to: RevisionId,
    ) -> Result<DiffPreview, EditError> {
        let (old, new) = {
            let revisions = self.revisions.lock();
            (
                revisions.snapshot_of(file_path, from)?,
                revisions.snapshot_of(file_path, to)?,
            )
        };
        // Snapshots are immutable, so the diff runs outside the lock.
        let body = self.diff.diff(&old.content, &new.content);
        Ok(DiffPreview {
            id: uuid::Uuid::new_v4(),
            file_path: file_path.to_owned(),
            from_revision: from,
            to_revision: to,
            body,
        })
    }
}
