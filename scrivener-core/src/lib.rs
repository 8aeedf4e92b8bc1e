//! scrivener-core: simulated live authorship of program text.
//!
//! Reveals pre-authored file contents incrementally across an ordered set of
//! artifacts, keeps a revisable buffer per file with bounded undo/redo, and
//! computes line diffs between revisions. All state is in memory; callers
//! drive it through [`Workbench`] and observe it through [`SessionEvent`]s.
pub mod cancel;
pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod reveal;
pub mod revision;
pub mod session;
pub mod types;
pub mod workbench;

pub use cancel::CancellationToken;
pub use config::CoreConfig;
pub use error::{ConfigError, EditError, SessionError};
pub use events::{EventReceiver, SessionEvent};
pub use workbench::Workbench;
