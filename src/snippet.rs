//! Rendering of source excerpts for errors that point into a loaded file.

use annotate_snippets::{
    AnnotationKind, Level, Renderer, Snippet as AnnotateSnippet, renderer::DecorStyle,
};

use crate::location::Location;

/// Borrowed source text plus the name shown in the snippet header.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Snippet<'a> {
    text: &'a str,
    path: &'a str,
    /// Maximum number of *columns* to keep on each side of the error column when cropping
    /// very long lines.
    crop_radius: usize,
}

impl<'a> Snippet<'a> {
    pub(crate) fn new(text: &'a str, path: &'a str, crop_radius: usize) -> Self {
        Self {
            text,
            path,
            crop_radius,
        }
    }

    /// Render `msg` with two lines of context around `location`.
    ///
    /// Returns:
    /// - `Some(text)` with the rendered report.
    /// - `None` when the location is outside of the text or the text contains control
    ///   characters that should not reach a terminal.
    ///
    /// Called by:
    /// - `Error::with_sources` once a parse has failed.
    pub(crate) fn render(&self, msg: &str, location: Location) -> Option<String> {
        if !location.is_known() || self.crop_radius == 0 {
            return None;
        }
        // Keep snippet coordinates aligned with parsers that ignore a leading UTF-8 BOM.
        let text = self.text.strip_prefix('\u{FEFF}').unwrap_or(self.text);
        if !is_terminal_snippet_clean(text) {
            return None;
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let row = location.line() as usize;
        let col = location.column() as usize;
        if row == 0 || row > lines.len() {
            return None;
        }

        let first_row = row.saturating_sub(2).max(1);
        let last_row = row.saturating_add(2).min(lines.len());

        // Crop every line of the window to the same column range so they stay aligned.
        let error_line_len = lines[row - 1].trim_end_matches('\r').chars().count();
        let width = self.crop_radius.saturating_mul(2).saturating_add(1);
        let skip = if error_line_len > width {
            col.saturating_sub(1).saturating_sub(self.crop_radius)
        } else {
            0
        };

        let mut window = String::new();
        let mut span = 0..0;
        for n in first_row..=last_row {
            let line = lines[n - 1].trim_end_matches('\r');
            let count = line.chars().count();
            let cropped: String = if count <= width && skip == 0 {
                line.to_owned()
            } else if count <= skip {
                // Very short context lines are left intact rather than cropped to nothing.
                line.to_owned()
            } else {
                line.chars().skip(skip).take(width).collect()
            };
            if n == row {
                let caret = col.saturating_sub(1).saturating_sub(skip);
                let start = cropped
                    .char_indices()
                    .nth(caret)
                    .map(|(i, _)| i)
                    .unwrap_or(cropped.len());
                let end = cropped[start..]
                    .chars()
                    .next()
                    .map(|c| start + c.len_utf8())
                    .unwrap_or(start);
                span = window.len() + start..window.len() + end;
            }
            window.push_str(&cropped);
            window.push('\n');
        }

        let report = &[Level::ERROR
            .primary_title(format!("line {row} column {col}: {msg}"))
            .element(
                AnnotateSnippet::source(&window)
                    .line_start(first_row)
                    .path(self.path)
                    .fold(false)
                    .annotation(AnnotationKind::Primary.span(span).label(msg)),
            )];

        // Plain rendering keeps error strings free of ANSI escapes.
        let renderer = Renderer::plain().decor_style(DecorStyle::Ascii);
        Some(renderer.render(report).to_string())
    }
}

/// Returns true if `text` contains no control characters that could mess with terminal/log output.
///
/// Keeps `\n`, `\r` and `\t`.
fn is_terminal_snippet_clean(text: &str) -> bool {
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}
