//! Reveal scheduler: discloses a target string a few characters at a time.
//!
//! The pure stepping logic lives in [`RevealCursor`]; [`RevealScheduler::start`]
//! wraps it in a tokio task that sleeps between ticks. Each tick's callback
//! runs to completion before the next sleep begins, so ticks never overlap.
//!
//! Cursor positions count Unicode scalar values, never bytes, so a partial
//! is always valid UTF-8 even when a tick boundary falls inside a multi-byte
//! sequence's neighbourhood.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::config::RevealConfig;
use crate::error::ConfigError;

/// One tick's worth of movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealStep {
    /// Byte offset of the cursor after this step.
    pub end: usize,
    /// Whether the chunk disclosed by this step contains a line break.
    pub chunk_had_newline: bool,
    pub is_complete: bool,
}

/// Converges a cursor toward `target` in fixed-size character chunks.
#[derive(Debug, Clone)]
pub struct RevealCursor {
    target: Arc<str>,
    chars_per_tick: usize,
    byte_pos: usize,
    revealed_chars: usize,
    total_chars: usize,
    finished: bool,
}

impl RevealCursor {
    pub fn new(target: impl Into<Arc<str>>, chars_per_tick: usize) -> Self {
        let target = target.into();
        let total_chars = target.chars().count();
        Self {
            target,
            chars_per_tick: chars_per_tick.max(1),
            byte_pos: 0,
            revealed_chars: 0,
            total_chars,
            finished: false,
        }
    }

    /// Moves the cursor forward by one tick.
    ///
    /// Returns `None` once the completing step has been produced. An empty
    /// target completes on the first call.
    pub fn advance(&mut self) -> Option<RevealStep> {
        if self.finished {
            return None;
        }
        let rest = &self.target[self.byte_pos..];
        let mut taken = 0;
        let mut end = self.byte_pos;
        let mut chunk_had_newline = false;
        for (offset, ch) in rest.char_indices().take(self.chars_per_tick) {
            taken += 1;
            end = self.byte_pos + offset + ch.len_utf8();
            if ch == '\n' || ch == '\r' {
                chunk_had_newline = true;
            }
        }
        self.byte_pos = end;
        self.revealed_chars += taken;
        let is_complete = self.byte_pos >= self.target.len();
        self.finished = is_complete;
        Some(RevealStep {
            end,
            chunk_had_newline,
            is_complete,
        })
    }

    /// Text disclosed so far.
    pub fn partial(&self) -> &str {
        &self.target[..self.byte_pos]
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Percentage of characters disclosed. An empty target counts as 100.
    pub fn progress(&self) -> f64 {
        if self.total_chars == 0 {
            100.0
        } else {
            self.revealed_chars as f64 * 100.0 / self.total_chars as f64
        }
    }
}

/// What a tick callback receives.
#[derive(Debug, Clone, Copy)]
pub struct RevealUpdate<'a> {
    pub partial: &'a str,
    pub is_complete: bool,
    /// Percentage of the target disclosed, `0.0..=100.0`.
    pub progress: f64,
}

/// How a reveal ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// The full target was emitted with `is_complete = true`.
    Completed,
    /// The token was cancelled before completion. No update followed.
    Cancelled,
    /// The tick callback panicked; the message is the panic payload.
    Failed(String),
}

/// Validated pacing, ready to start reveals.
#[derive(Debug, Clone, Copy)]
pub struct RevealScheduler {
    config: RevealConfig,
}

impl RevealScheduler {
    /// Fails fast on a zero chunk size or zero interval.
    pub fn new(config: RevealConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Spawns a reveal of `target` on the current tokio runtime.
    ///
    /// The first chunk is emitted immediately; later chunks follow after
    /// `tick_interval_ms`, plus `newline_extra_delay_ms` when the previous
    /// chunk contained a line break.
    ///
    /// The flag is checked under a delivery gate shared with the returned
    /// handle, so no update starts after [`RevealHandle::cancel`] returns.
    /// A cancel made through `token` or one of its parents is observed before
    /// the next update, including one whose sleep was already pending; an
    /// update already running on another worker may still finish.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(
        &self,
        target: impl Into<Arc<str>>,
        token: CancellationToken,
        on_update: F,
    ) -> RevealHandle
    where
        F: FnMut(&RevealUpdate<'_>) + Send + 'static,
    {
        let cursor = RevealCursor::new(target, self.config.chars_per_tick);
        let config = self.config;
        let gate = Arc::new(Mutex::new(()));
        let task = tokio::spawn(run_reveal(
            cursor,
            config,
            token.clone(),
            Arc::clone(&gate),
            on_update,
        ));
        RevealHandle { token, gate, task }
    }
}

async fn run_reveal<F>(
    mut cursor: RevealCursor,
    config: RevealConfig,
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
    mut on_update: F,
) -> RevealOutcome
where
    F: FnMut(&RevealUpdate<'_>) + Send + 'static,
{
    tracing::trace!(chars = cursor.target().len(), "reveal started");
    loop {
        // Late timers land here after cancel(); the flag wins.
        if token.is_cancelled() {
            return RevealOutcome::Cancelled;
        }
        let Some(step) = cursor.advance() else {
            return RevealOutcome::Completed;
        };
        let update = RevealUpdate {
            partial: cursor.partial(),
            is_complete: step.is_complete,
            progress: cursor.progress(),
        };
        let delivered = {
            let _gate = gate.lock();
            if token.is_cancelled() {
                return RevealOutcome::Cancelled;
            }
            catch_unwind(AssertUnwindSafe(|| on_update(&update)))
        };
        if let Err(payload) = delivered {
            let message = panic_message(payload.as_ref());
            tracing::warn!(%message, "reveal callback panicked");
            return RevealOutcome::Failed(message);
        }
        if step.is_complete {
            tracing::trace!("reveal completed");
            return RevealOutcome::Completed;
        }
        let delay: Duration = config.delay_after(step.chunk_had_newline);
        tokio::select! {
            biased;
            _ = token.cancelled() => return RevealOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tick callback panicked".to_owned()
    }
}

/// Cancellation handle for a running reveal.
#[derive(Debug)]
pub struct RevealHandle {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
    task: JoinHandle<RevealOutcome>,
}

impl RevealHandle {
    /// Stops the reveal. Idempotent.
    ///
    /// Waits for an in-flight update to return, so none is delivered once
    /// this returns. Must not be called from inside the update callback.
    pub fn cancel(&self) {
        let _gate = self.gate.lock();
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the reveal task to end.
    pub async fn join(self) -> RevealOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => RevealOutcome::Cancelled,
            Err(e) => RevealOutcome::Failed(e.to_string()),
        }
    }
}
