//! Exact phrase location.
//!
//! Policy: case-sensitive substring search, first occurrence. No fuzzy
//! matching and no normalization before the search. The oracle is expected
//! to quote verbatim, and a phrase it misquoted is dropped, not guessed.

/// Find `phrase` in `document`, returning its character offset.
///
/// Returns `None` when the phrase is absent. An empty phrase matches
/// everywhere and identifies nothing, so it is also reported absent.
pub fn locate(document: &str, phrase: &str) -> Option<usize> {
    let byte_idx = locate_bytes(document, phrase)?;
    Some(document[..byte_idx].chars().count())
}

/// Byte-offset variant used internally where the caller needs to splice.
pub(crate) fn locate_bytes(document: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    document.find(phrase)
}
