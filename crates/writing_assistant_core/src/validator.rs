//! crates/writing_assistant_core/src/validator.rs
//!
//! Decides whether a stored suggestion still points at the text it was computed
//! against. An invalid range is an expected outcome of concurrent edits and
//! imprecise model offsets, so nothing here returns an error.

use crate::domain::{Suggestion, TextRange};

/// `true` when `range` is non-empty, lies inside `buffer`, and covers exactly
/// `original_text`.
pub fn range_matches(buffer: &str, range: TextRange, original_text: &str) -> bool {
    if range.is_empty() {
        return false;
    }
    range.slice(buffer) == Some(original_text)
}

pub fn is_valid(buffer: &str, suggestion: &Suggestion) -> bool {
    range_matches(buffer, suggestion.range, &suggestion.original_text)
}
