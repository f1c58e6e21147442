//! HTML-to-text reduction for article pages.
//!
//! Headings survive as `#`-prefixed blocks, which is exactly what the
//! segmenter consumes. Citation markers and excess blank lines are noise for
//! phrase matching and are removed before any analysis sees the text.

use std::io::Cursor;

/// Convert HTML to readable plain text.
///
/// Intentionally "good enough" and deterministic, not a readability engine.
pub fn html_to_text(html: &str, width: usize) -> String {
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

/// Post-extraction cleanup: drop `[12]`-style citation markers, collapse runs
/// of three or more newlines to a blank line, trim the ends.
pub fn clean_page_text(text: &str) -> String {
    collapse_blank_runs(&strip_citation_markers(text))
        .trim()
        .to_string()
}

/// Remove bracketed all-digit reference markers (`[1]`, `[137]`).
///
/// Anything else in brackets (`[citation needed]`, `[a]`, `[]`) is left
/// untouched.
fn strip_citation_markers(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending = String::new();
    let mut in_marker = false;
    for ch in s.chars() {
        if !in_marker {
            if ch == '[' {
                in_marker = true;
                pending.clear();
                pending.push(ch);
            } else {
                out.push(ch);
            }
        } else if ch.is_ascii_digit() {
            pending.push(ch);
        } else if ch == ']' && pending.len() > 1 {
            // A complete [digits] marker: drop it.
            in_marker = false;
        } else {
            out.push_str(&pending);
            if ch == '[' {
                pending.clear();
                pending.push(ch);
            } else {
                in_marker = false;
                out.push(ch);
            }
        }
    }
    if in_marker {
        out.push_str(&pending);
    }
    out
}

fn collapse_blank_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut newline_run = 0usize;
    for ch in s.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(ch);
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out
}
