//! Batch application of textual edits.
//!
//! Two-pass design: every edit's removed span is resolved against the
//! *original* document before any mutation, so earlier edits never shift the
//! coordinates of later ones. The batch is all-or-nothing: an unresolvable
//! phrase or an overlapping pair of spans fails the whole apply and leaves
//! the input untouched.

use crate::locate::locate_bytes;
use crate::types::Edit;
use crate::{Error, Result};

/// Apply `edits` to `document`, producing the corrected text.
///
/// An empty batch returns the document unchanged. Each edit's span is the
/// first occurrence of its `text_removed`; spans must not overlap (touching
/// end-to-start is fine). No semantic filtering happens here; what counts
/// as a valid edit is the producer's policy.
pub fn apply_edits(document: &str, edits: &[Edit]) -> Result<String> {
    if edits.is_empty() {
        return Ok(document.to_string());
    }

    // Pass 1: resolve all spans against the original document.
    let mut spans: Vec<(usize, usize, &Edit)> = Vec::with_capacity(edits.len());
    for edit in edits {
        let start = locate_bytes(document, &edit.text_removed)
            .ok_or_else(|| Error::PhraseNotFound(edit.text_removed.clone()))?;
        spans.push((start, start + edit.text_removed.len(), edit));
    }
    spans.sort_by_key(|&(start, end, _)| (start, end));

    for pair in spans.windows(2) {
        let (_, prev_end, prev) = pair[0];
        let (next_start, _, next) = pair[1];
        if next_start < prev_end {
            return Err(Error::OverlappingEdits {
                first: prev.text_removed.clone(),
                second: next.text_removed.clone(),
            });
        }
    }

    // Pass 2: single walk, copying unedited spans verbatim.
    let mut out = String::with_capacity(document.len());
    let mut cursor = 0usize;
    for (start, end, edit) in spans {
        out.push_str(&document[cursor..start]);
        out.push_str(&edit.text_added);
        cursor = end;
    }
    out.push_str(&document[cursor..]);
    Ok(out)
}
