//! Line-granularity diffing between two snapshots of one file.
//!
//! Built on `similar`'s Myers line diff, which is deterministic for a given
//! input pair. Inputs above the configured byte or line ceiling are not
//! diffed at all; the engine reports line counts instead.

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::config::DiffConfig;
use crate::types::{DiffBody, DiffHunk, DiffLineKind, DiffStats};

/// Computes hunks under a size ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    config: DiffConfig,
}

impl DiffEngine {
    pub fn new(config: DiffConfig) -> Self {
        Self { config }
    }

    /// Diffs `old` against `new`.
    ///
    /// Consecutive lines of the same kind are merged into one hunk. Identical
    /// inputs produce a single context hunk, or no hunks when both are empty.
    pub fn diff(&self, old: &str, new: &str) -> DiffBody {
        let old_lines = line_count(old);
        let new_lines = line_count(new);
        if self.exceeds_ceiling(old, old_lines) || self.exceeds_ceiling(new, new_lines) {
            tracing::debug!(old_lines, new_lines, "diff input over ceiling, summarising");
            return DiffBody::Summary { old_lines, new_lines };
        }

        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_lines(old, new);

        let mut hunks: Vec<DiffHunk> = Vec::new();
        let mut stats = DiffStats::default();
        for change in diff.iter_all_changes() {
            let kind = match change.tag() {
                ChangeTag::Equal => DiffLineKind::Context,
                ChangeTag::Insert => {
                    stats.added += 1;
                    DiffLineKind::Added
                }
                ChangeTag::Delete => {
                    stats.removed += 1;
                    DiffLineKind::Removed
                }
            };
            let line = change.value().to_owned();
            match hunks.last_mut() {
                Some(hunk) if hunk.kind == kind => hunk.lines.push(line),
                _ => hunks.push(DiffHunk {
                    kind,
                    lines: vec![line],
                }),
            }
        }
        DiffBody::Hunks { hunks, stats }
    }

    fn exceeds_ceiling(&self, text: &str, lines: usize) -> bool {
        text.len() > self.config.max_input_bytes || lines > self.config.max_input_lines
    }
}

/// Number of lines in `text`; a trailing unterminated fragment counts as one.
pub fn line_count(text: &str) -> usize {
    text.lines().count()
}

/// Rebuilds the new side of a diff from its hunks.
///
/// Context and added lines are kept, removed lines are dropped. Because each
/// line carries its own terminator, `apply(diff(a, b))` reproduces `b`
/// byte-for-byte.
pub fn apply(hunks: &[DiffHunk]) -> String {
    hunks
        .iter()
        .filter(|h| h.kind != DiffLineKind::Removed)
        .flat_map(|h| h.lines.iter())
        .map(String::as_str)
        .collect()
}

/// Rebuilds the old side of a diff from its hunks.
pub fn revert(hunks: &[DiffHunk]) -> String {
    hunks
        .iter()
        .filter(|h| h.kind != DiffLineKind::Added)
        .flat_map(|h| h.lines.iter())
        .map(String::as_str)
        .collect()
}

/// Renders hunks as `+`/`-`/` ` prefixed lines, one per output line.
pub fn render_unified(hunks: &[DiffHunk]) -> String {
    let mut out = String::new();
    for hunk in hunks {
        for line in &hunk.lines {
            out.push(hunk.kind.prefix());
            out.push(' ');
            out.push_str(line.trim_end_matches(['\n', '\r']));
            out.push('\n');
        }
    }
    out
}

/// True when no hunk adds or removes anything.
pub fn is_unchanged(hunks: &[DiffHunk]) -> bool {
    hunks.iter().all(|h| h.kind == DiffLineKind::Context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunks(old: &str, new: &str) -> Vec<DiffHunk> {
        DiffEngine::default().diff(old, new).hunks().to_vec()
    }

    #[test]
    fn identical_inputs_are_all_context() {
        let text = "a\nb\nc\n";
        let h = hunks(text, text);
        assert!(is_unchanged(&h));
        assert_eq!(h.len(), 1);
        assert!(hunks("", "").is_empty());
    }

    #[test]
    fn apply_reproduces_the_new_side() {
        let cases = [
            ("a\nb\nc\n", "a\nB\nc\nd\n"),
            ("x", "x\ny"),
            ("one\ntwo\n", ""),
            ("", "fresh\r\nfile"),
            ("keep\nno newline", "keep\nno newline\n"),
        ];
        for (old, new) in cases {
            let h = hunks(old, new);
            assert_eq!(apply(&h), new, "apply({old:?} -> {new:?})");
            assert_eq!(revert(&h), old, "revert({old:?} -> {new:?})");
        }
    }

    #[test]
    fn hunks_group_runs_and_count_lines() {
        let body = DiffEngine::default().diff("a\nb\nc\n", "a\nx\ny\nc\n");
        let DiffBody::Hunks { hunks, stats } = body else {
            panic!("expected hunks");
        };
        let kinds: Vec<_> = hunks.iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiffLineKind::Context,
                DiffLineKind::Removed,
                DiffLineKind::Added,
                DiffLineKind::Context
            ]
        );
        assert_eq!(stats, DiffStats { added: 2, removed: 1 });
    }

    #[test]
    fn diff_is_deterministic() {
        let old = "fn a() {}\nfn b() {}\nfn c() {}\n";
        let new = "fn c() {}\nfn a() {}\nfn d() {}\n";
        let engine = DiffEngine::default();
        assert_eq!(engine.diff(old, new), engine.diff(old, new));
    }

    #[test]
    fn oversized_inputs_degrade_to_summary() {
        let engine = DiffEngine::new(DiffConfig {
            max_input_bytes: 1024,
            max_input_lines: 3,
        });
        let body = engine.diff("1\n2\n", "1\n2\n3\n4\n");
        assert!(body.is_summary());
        assert_eq!(body.to_string(), "2 lines before vs 4 lines after");

        let bytes = DiffEngine::new(DiffConfig {
            max_input_bytes: 4,
            max_input_lines: 100,
        });
        assert!(bytes.diff("tiny", "much longer").is_summary());
    }

    #[test]
    fn unified_rendering_prefixes_each_line() {
        let h = hunks("a\nb\n", "a\nc\n");
        assert_eq!(render_unified(&h), "  a\n- b\n+ c\n");
    }
}
