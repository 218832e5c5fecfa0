//! crates/writing_assistant_core/src/dedupe.rs
//!
//! Collapses suggestions that target the same original text and range, which
//! happens when analysis passes over the same buffer overlap.

use crate::domain::Suggestion;
use std::collections::HashSet;

/// Stable deduplication keyed on `(original_text, range.start, range.end)`.
/// The first occurrence wins.
pub fn dedupe(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut seen = HashSet::with_capacity(suggestions.len());
    suggestions
        .into_iter()
        .filter(|s| seen.insert((s.original_text.clone(), s.range.start, s.range.end)))
        .collect()
}
