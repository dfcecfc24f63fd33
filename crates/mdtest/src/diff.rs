//! Diagnostics for mismatching canonical forms.
//!
//! Canonical HTML is a single line, so the unified diff is computed over a
//! view with one tag per line.

use similar::TextDiff;

/// Detailed diff information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// The expected canonical form
    pub expected: String,
    /// The actual canonical form
    pub actual: String,
    /// Position of first difference (character offset)
    pub first_diff_pos: Option<usize>,
    /// Human-readable description of the first difference
    pub inline_diff: String,
    /// Unified diff, one tag per line
    pub unified_diff: String,
}

impl Diff {
    /// Computes the diff between two canonical forms.
    pub fn between(expected: &str, actual: &str) -> Self {
        Self {
            expected: expected.to_string(),
            actual: actual.to_string(),
            first_diff_pos: find_first_diff(expected, actual),
            inline_diff: inline_diff(expected, actual),
            unified_diff: unified_diff(expected, actual),
        }
    }

    /// Whether the two sides are identical.
    pub fn is_empty(&self) -> bool {
        self.first_diff_pos.is_none()
    }
}

/// Find the position of the first difference between two strings
fn find_first_diff(expected: &str, actual: &str) -> Option<usize> {
    let mut expected_chars = expected.chars();
    let mut actual_chars = actual.chars();
    let mut pos = 0;
    loop {
        match (expected_chars.next(), actual_chars.next()) {
            (None, None) => return None,
            (e, a) if e != a => return Some(pos),
            _ => pos += 1,
        }
    }
}

fn inline_diff(expected: &str, actual: &str) -> String {
    let Some(pos) = find_first_diff(expected, actual) else {
        return String::new();
    };

    match (expected.chars().nth(pos), actual.chars().nth(pos)) {
        (Some(e), Some(a)) => format!("At position {pos}: expected {e:?}, got {a:?}"),
        (Some(e), None) => format!("At position {pos}: expected {e:?}, but actual string ended"),
        (None, Some(a)) => format!("At position {pos}: expected end, but got {a:?}"),
        (None, None) => String::new(),
    }
}

fn unified_diff(expected: &str, actual: &str) -> String {
    let expected = one_tag_per_line(expected);
    let actual = one_tag_per_line(actual);
    let diff = TextDiff::from_lines(&expected, &actual);

    let mut result = String::from("--- expected\n+++ actual\n");
    for hunk in diff.unified_diff().iter_hunks() {
        result.push_str(&hunk.to_string());
    }
    result
}

fn one_tag_per_line(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + html.len() / 8);
    for (i, c) in html.char_indices() {
        if c == '<' && i > 0 {
            out.push('\n');
        }
        out.push(c);
    }
    out.push('\n');
    out
}
