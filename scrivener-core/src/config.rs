//! Tunable parameters for reveal pacing, session settling, history depth,
//! and diff ceilings.
//!
//! The pacing values only shape how a reveal "feels"; none of them affect
//! correctness. Every section deserializes with defaults, so a config file may
//! name only the keys it wants to change:
//!
//! ```toml
//! [reveal]
//! chars_per_tick = 8
//!
//! [session]
//! settle_delay_ms = 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Pacing of a single reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    /// Characters (Unicode scalar values) disclosed per tick.
    pub chars_per_tick: usize,
    /// Base delay between ticks.
    pub tick_interval_ms: u64,
    /// Added to the delay after a tick whose chunk contained a line break.
    pub newline_extra_delay_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            chars_per_tick: 3,
            tick_interval_ms: 16,
            newline_extra_delay_ms: 40,
        }
    }
}

impl RevealConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chars_per_tick == 0 {
            return Err(ConfigError::ZeroCharsPerTick);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Delay before the tick that follows a chunk.
    pub fn delay_after(&self, chunk_had_newline: bool) -> Duration {
        if chunk_had_newline {
            Duration::from_millis(self.tick_interval_ms + self.newline_extra_delay_ms)
        } else {
            self.tick_interval()
        }
    }
}

/// Sequencing across files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between one file completing and the next one starting.
    pub settle_delay_ms: u64,
    /// Optional wall-clock guard. An overrunning session is cancelled.
    pub max_duration_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 50,
            max_duration_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

/// Undo history bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo entries kept per file. The oldest entry is evicted first.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

/// Size ceilings above which diffs degrade to a line-count summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub max_input_bytes: usize,
    pub max_input_lines: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 256 * 1024,
            max_input_lines: 10_000,
        }
    }
}

/// All core settings, as loaded from `config.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub reveal: RevealConfig,
    pub session: SessionConfig,
    pub history: HistoryConfig,
    pub diff: DiffConfig,
}

impl CoreConfig {
    /// Checks every section. Called at construction and at each session start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reveal.validate()?;
        if self.history.max_depth == 0 {
            return Err(ConfigError::ZeroHistoryDepth);
        }
        if self.diff.max_input_bytes == 0 {
            return Err(ConfigError::ZeroDiffCeiling("max_input_bytes"));
        }
        if self.diff.max_input_lines == 0 {
            return Err(ConfigError::ZeroDiffCeiling("max_input_lines"));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`, falling back to defaults.
    ///
    /// A missing file is silent. A file that fails to parse or validate is
    /// logged and ignored. Never panics.
    pub fn load_or_default(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return Self::default(),
        };
        match Self::from_toml_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(CoreConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = CoreConfig::from_toml_str(
            "[reveal]\nchars_per_tick = 8\n\n[session]\nmax_duration_ms = 5000\n",
        )
        .unwrap();
        assert_eq!(config.reveal.chars_per_tick, 8);
        assert_eq!(config.reveal.tick_interval_ms, 16);
        assert_eq!(config.session.settle_delay_ms, 50);
        assert_eq!(config.session.max_duration(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = CoreConfig::from_toml_str("[reveal]\ntick_interval_ms = 0\n").unwrap_err();
        assert_eq!(err, ConfigError::ZeroTickInterval);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            CoreConfig::from_toml_str("reveal = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn newline_chunks_wait_longer() {
        let reveal = RevealConfig {
            chars_per_tick: 1,
            tick_interval_ms: 10,
            newline_extra_delay_ms: 25,
        };
        assert_eq!(reveal.delay_after(false), Duration::from_millis(10));
        assert_eq!(reveal.delay_after(true), Duration::from_millis(35));
    }

    #[test]
    fn load_or_default_tolerates_missing_and_broken_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(CoreConfig::load_or_default(&missing), CoreConfig::default());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[history]\nmax_depth = 0\n").unwrap();
        assert_eq!(CoreConfig::load_or_default(&broken), CoreConfig::default());

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[history]\nmax_depth = 7\n").unwrap();
        assert_eq!(CoreConfig::load_or_default(&good).history.max_depth, 7);
    }
}
