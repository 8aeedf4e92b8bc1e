//! Revision store: per-file edit buffers with bounded undo/redo.
//!
//! Each file path owns one [`FileHistory`]: the committed snapshot, an undo
//! stack, a redo stack, and an optional live buffer that holds the partial
//! text while the file is being streamed into. Snapshots are immutable and
//! shared by `Arc`; undo and redo only move snapshot handles between stacks,
//! so an undo followed by a redo restores the exact same value.
//!
//! A file being streamed into is write-locked. Manual commits, undo and redo
//! aimed at it are rejected with [`EditError::FileBusy`] until the stream
//! finishes or is aborted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::config::HistoryConfig;
use crate::error::EditError;
use crate::types::{now_millis, RevisionId, RevisionSnapshot};

/// History of one file.
#[derive(Debug, Clone)]
struct FileHistory {
    current: Arc<RevisionSnapshot>,
    /// Oldest entry at the front; evicted first on overflow.
    undo: VecDeque<Arc<RevisionSnapshot>>,
    /// Next redo target at the back.
    redo: Vec<Arc<RevisionSnapshot>>,
    /// Partial content while streaming. Shadows `current` for readers.
    live: Option<String>,
    dirty: bool,
}

impl FileHistory {
    fn new(baseline: Arc<RevisionSnapshot>) -> Self {
        Self {
            current: baseline,
            undo: VecDeque::new(),
            redo: Vec::new(),
            live: None,
            dirty: false,
        }
    }

    fn buffer(&self) -> &str {
        self.live.as_deref().unwrap_or(&self.current.content)
    }

    fn push_undo(&mut self, snapshot: Arc<RevisionSnapshot>, max_depth: usize) {
        self.undo.push_back(snapshot);
        while self.undo.len() > max_depth {
            self.undo.pop_front();
        }
    }

    fn find(&self, id: RevisionId) -> Option<&Arc<RevisionSnapshot>> {
        std::iter::once(&self.current)
            .chain(self.undo.iter())
            .chain(self.redo.iter())
            .find(|s| s.id == id)
    }
}

fn make_snapshot(next_id: &mut u64, file_path: &str, content: &str) -> Arc<RevisionSnapshot> {
    *next_id += 1;
    Arc::new(RevisionSnapshot {
        id: RevisionId(*next_id),
        file_path: file_path.to_owned(),
        content: Arc::from(content),
        timestamp: now_millis(),
    })
}

/// All per-file histories plus the file currently under edit.
#[derive(Debug)]
pub struct RevisionStore {
    files: HashMap<String, FileHistory>,
    active: Option<String>,
    streaming: HashSet<String>,
    next_id: u64,
    max_depth: usize,
}

impl RevisionStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            files: HashMap::new(),
            active: None,
            streaming: HashSet::new(),
            next_id: 0,
            max_depth: config.max_depth.max(1),
        }
    }

    /// History of `file_path`, created with an empty baseline if absent.
    fn history_mut(&mut self, file_path: &str) -> &mut FileHistory {
        let next_id = &mut self.next_id;
        self.files
            .entry(file_path.to_owned())
            .or_insert_with(|| FileHistory::new(make_snapshot(next_id, file_path, "")))
    }

    fn ensure_writable(&self, file_path: &str) -> Result<(), EditError> {
        if self.streaming.contains(file_path) {
            Err(EditError::FileBusy(file_path.to_owned()))
        } else {
            Ok(())
        }
    }

    fn active_path(&self) -> Result<String, EditError> {
        self.active.clone().ok_or(EditError::NoActiveFile)
    }

    // -----------------------------------------------------------------------
    // File selection
    // -----------------------------------------------------------------------

    /// Makes `file_path` the file under edit.
    ///
    /// A file seen for the first time starts from `baseline` (empty when
    /// `None`) with no undo entries. Switching to a known file keeps its
    /// history untouched and ignores `baseline`.
    pub fn open_file(&mut self, file_path: &str, baseline: Option<&str>) -> RevisionId {
        let next_id = &mut self.next_id;
        let history = self.files.entry(file_path.to_owned()).or_insert_with(|| {
            FileHistory::new(make_snapshot(next_id, file_path, baseline.unwrap_or("")))
        });
        let current = history.current.id;
        self.active = Some(file_path.to_owned());
        current
    }

    pub fn active_file(&self) -> Option<&str> {
        self.active.as_deref()
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Commits `content` to the active file.
    pub fn commit(&mut self, content: &str) -> Result<RevisionId, EditError> {
        let path = self.active_path()?;
        self.commit_to(&path, content)
    }

    /// Commits `content` to `file_path` and makes it the active file.
    pub fn commit_edit(&mut self, file_path: &str, content: &str) -> Result<RevisionId, EditError> {
        self.ensure_writable(file_path)?;
        self.open_file(file_path, None);
        self.commit_to(file_path, content)
    }

    /// Pushes the previous buffer onto the undo stack, installs `content`,
    /// clears the redo stack, and marks the file dirty.
    fn commit_to(&mut self, file_path: &str, content: &str) -> Result<RevisionId, EditError> {
        self.ensure_writable(file_path)?;
        Ok(self.commit_unchecked(file_path, content))
    }

    fn commit_unchecked(&mut self, file_path: &str, content: &str) -> RevisionId {
        let max_depth = self.max_depth;
        let next_id = &mut self.next_id;
        let history = self
            .files
            .entry(file_path.to_owned())
            .or_insert_with(|| FileHistory::new(make_snapshot(next_id, file_path, "")));
        let snapshot = make_snapshot(next_id, file_path, content);
        let id = snapshot.id;
        let previous = std::mem::replace(&mut history.current, snapshot);
        history.push_undo(previous, max_depth);
        history.redo.clear();
        history.dirty = true;
        id
    }

    /// Steps the active file back one revision.
    ///
    /// Returns `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditError> {
        let path = self.active_path()?;
        self.undo_file(&path)
    }

    /// Steps the active file forward one revision.
    ///
    /// Returns `Ok(false)` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool, EditError> {
        let path = self.active_path()?;
        self.redo_file(&path)
    }

    pub fn undo_file(&mut self, file_path: &str) -> Result<bool, EditError> {
        self.ensure_writable(file_path)?;
        let Some(history) = self.files.get_mut(file_path) else {
            return Ok(false);
        };
        let Some(previous) = history.undo.pop_back() else {
            return Ok(false);
        };
        let current = std::mem::replace(&mut history.current, previous);
        history.redo.push(current);
        history.dirty = true;
        Ok(true)
    }

    pub fn redo_file(&mut self, file_path: &str) -> Result<bool, EditError> {
        self.ensure_writable(file_path)?;
        let max_depth = self.max_depth;
        let Some(history) = self.files.get_mut(file_path) else {
            return Ok(false);
        };
        let Some(next) = history.redo.pop() else {
            return Ok(false);
        };
        let current = std::mem::replace(&mut history.current, next);
        history.push_undo(current, max_depth);
        history.dirty = true;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.active
            .as_deref()
            .is_some_and(|path| self.can_undo_file(path))
    }

    pub fn can_redo(&self) -> bool {
        self.active
            .as_deref()
            .is_some_and(|path| self.can_redo_file(path))
    }

    pub fn can_undo_file(&self, file_path: &str) -> bool {
        self.files.get(file_path).is_some_and(|h| !h.undo.is_empty())
    }

    pub fn can_redo_file(&self, file_path: &str) -> bool {
        self.files.get(file_path).is_some_and(|h| !h.redo.is_empty())
    }

    pub fn undo_depth(&self, file_path: &str) -> usize {
        self.files.get(file_path).map_or(0, |h| h.undo.len())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The visible buffer for `file_path`: the live partial while streaming,
    /// otherwise the committed content.
    pub fn buffer(&self, file_path: &str) -> Option<&str> {
        self.files.get(file_path).map(FileHistory::buffer)
    }

    pub fn active_buffer(&self) -> Option<&str> {
        self.active.as_deref().and_then(|p| self.buffer(p))
    }

    pub fn is_dirty(&self, file_path: &str) -> bool {
        self.files.get(file_path).is_some_and(|h| h.dirty)
    }

    /// Clears the dirty flag, e.g. after a caller persisted the buffer.
    pub fn mark_clean(&mut self, file_path: &str) {
        if let Some(history) = self.files.get_mut(file_path) {
            history.dirty = false;
        }
    }

    pub fn current_revision(&self, file_path: &str) -> Option<RevisionId> {
        self.files.get(file_path).map(|h| h.current.id)
    }

    /// Reachable revisions of `file_path`, oldest first: the undo stack, the
    /// current snapshot, then the redo stack in redo order.
    pub fn revisions(&self, file_path: &str) -> Vec<RevisionId> {
        let Some(history) = self.files.get(file_path) else {
            return Vec::new();
        };
        history
            .undo
            .iter()
            .chain(std::iter::once(&history.current))
            .chain(history.redo.iter().rev())
            .map(|s| s.id)
            .collect()
    }

    /// Looks up a reachable snapshot. Evicted revisions are gone for good.
    pub fn snapshot_of(
        &self,
        file_path: &str,
        revision: RevisionId,
    ) -> Result<Arc<RevisionSnapshot>, EditError> {
        let history = self
            .files
            .get(file_path)
            .ok_or_else(|| EditError::UnknownFile(file_path.to_owned()))?;
        history
            .find(revision)
            .cloned()
            .ok_or_else(|| EditError::UnknownRevision {
                path: file_path.to_owned(),
                revision,
            })
    }

    // -----------------------------------------------------------------------
    // Streaming writer lock (orchestrator only)
    // -----------------------------------------------------------------------

    pub fn is_streaming(&self, file_path: &str) -> bool {
        self.streaming.contains(file_path)
    }

    /// Takes the writer lock on `file_path` and opens an empty live buffer.
    pub(crate) fn begin_stream(&mut self, file_path: &str) {
        self.streaming.insert(file_path.to_owned());
        self.history_mut(file_path).live = Some(String::new());
    }

    /// Replaces the live buffer with the latest partial.
    pub(crate) fn stream_update(&mut self, file_path: &str, partial: &str) {
        if !self.streaming.contains(file_path) {
            return;
        }
        if let Some(history) = self.files.get_mut(file_path) {
            let live = history.live.get_or_insert_with(String::new);
            live.clear();
            live.push_str(partial);
        }
    }

    /// Releases the lock and commits the finished content as a snapshot.
    pub(crate) fn finish_stream(&mut self, file_path: &str, content: &str) -> RevisionId {
        self.streaming.remove(file_path);
        self.history_mut(file_path).live = None;
        self.commit_unchecked(file_path, content)
    }

    /// Releases the lock and drops the live buffer without committing.
    pub(crate) fn abort_stream(&mut self, file_path: &str) {
        self.streaming.remove(file_path);
        if let Some(history) = self.files.get_mut(file_path) {
            history.live = None;
        }
    }
}

impl Default for RevisionStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}
