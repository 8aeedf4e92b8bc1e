//! Plain-text rendering of progress and diff previews for stderr.

use scrivener_core::diff::render_unified;
use scrivener_core::types::{DiffBody, DiffPreview, FileStreamProgress};

const BAR_WIDTH: usize = 24;

/// One status line, e.g. `[######------------------]  25.0%  a.ts (1/4)`.
pub fn progress_line(progress: &FileStreamProgress) -> String {
    let filled = ((progress.overall_progress / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));
    let file = progress.current_file.as_deref().unwrap_or("-");
    let position = if progress.total_files == 0 {
        "0/0".to_owned()
    } else {
        format!("{}/{}", progress.current_file_index + 1, progress.total_files)
    };
    format!(
        "[{bar}] {:>5.1}%  {file} ({position})",
        progress.overall_progress
    )
}

/// Header plus body of a diff preview.
pub fn preview_text(preview: &DiffPreview) -> String {
    let header = format!(
        "--- {} {}\n+++ {} {}\n",
        preview.file_path, preview.from_revision, preview.file_path, preview.to_revision
    );
    match &preview.body {
        DiffBody::Hunks { hunks, .. } => format!("{header}{}", render_unified(hunks)),
        summary @ DiffBody::Summary { .. } => format!("{header}{summary}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::types::RevisionId;

    #[test]
    fn progress_line_scales_the_bar() {
        let half = FileStreamProgress::compute(Some("a.ts"), 0, 2, 100.0, true);
        let line = progress_line(&half);
        assert!(line.starts_with(&format!("[{}{}]", "#".repeat(12), "-".repeat(12))));
        assert!(line.ends_with(" 50.0%  a.ts (1/2)"));
    }

    #[test]
    fn summary_previews_show_line_counts() {
        let preview = DiffPreview {
            id: uuid::Uuid::nil(),
            file_path: "big.txt".into(),
            from_revision: RevisionId(1),
            to_revision: RevisionId(2),
            body: DiffBody::Summary {
                old_lines: 3,
                new_lines: 9000,
            },
        };
        assert!(preview_text(&preview).ends_with("3 lines before vs 9000 lines after\n"));
    }
}
