//! crates/writing_assistant_core/src/reconciler.rs
//!
//! The suggestion lifecycle and its interaction with the buffer.
//!
//! A suggestion moves `Pending -> Accepted` or `Pending -> Rejected` and never
//! leaves a terminal state. Every function here returns the suggestions it
//! resolved so the caller can persist their new status; the in-memory
//! transition has already happened and is never rolled back.

use crate::dedupe::dedupe;
use crate::domain::{Document, Suggestion, SuggestionStatus};
use crate::session::{DocumentSession, SessionTicket};
use crate::validator;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The replacement was spliced into the buffer. Every other pending
    /// suggestion was rejected because its offsets may have shifted.
    Applied {
        accepted: Suggestion,
        rejected: Vec<Suggestion>,
    },
    /// The suggestion no longer matched the buffer, so it was rejected instead.
    Stale { rejected: Suggestion },
}

impl AcceptOutcome {
    /// Every suggestion whose status changed, in the order it should be persisted.
    pub fn resolved(&self) -> Vec<&Suggestion> {
        match self {
            Self::Applied { accepted, rejected } => {
                std::iter::once(accepted).chain(rejected.iter()).collect()
            }
            Self::Stale { rejected } => vec![rejected],
        }
    }
}

/// Concatenates `incoming` onto `live` and deduplicates the result.
pub fn merge_suggestions(mut live: Vec<Suggestion>, incoming: Vec<Suggestion>) -> Vec<Suggestion> {
    live.extend(incoming);
    dedupe(live)
}

/// Merges freshly returned suggestions into the live set. Ranges are not
/// revalidated here; that happens on load and on accept. Returns how many
/// suggestions were actually added.
pub fn merge(session: &mut DocumentSession, incoming: Vec<Suggestion>) -> usize {
    let before = session.suggestions.len();
    let live = std::mem::take(&mut session.suggestions);
    session.suggestions = merge_suggestions(live, incoming);
    session.suggestions.len() - before
}

/// Opens `document` with its persisted pending suggestions. Suggestions that no
/// longer match the content are rejected and returned; the rest, deduplicated,
/// become the live set.
pub fn load(
    session: &mut DocumentSession,
    document: Document,
    pending: Vec<Suggestion>,
) -> (SessionTicket, Vec<Suggestion>) {
    let ticket = session.open(document);

    let (valid, mut invalid): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .filter(Suggestion::is_pending)
        .partition(|s| validator::is_valid(session.buffer(), s));

    for s in &mut invalid {
        s.status = SuggestionStatus::Rejected;
    }
    session.suggestions = dedupe(valid);
    (ticket, invalid)
}

/// Accepts a live suggestion. Returns `None` when `suggestion_id` is not in the
/// live set. Whatever happens, the live set is empty afterwards if the splice
/// was applied.
pub fn accept(session: &mut DocumentSession, suggestion_id: Uuid) -> Option<AcceptOutcome> {
    let index = session.suggestions.iter().position(|s| s.id == suggestion_id)?;

    if !validator::is_valid(session.buffer(), &session.suggestions[index]) {
        let mut stale = session.suggestions.remove(index);
        stale.status = SuggestionStatus::Rejected;
        return Some(AcceptOutcome::Stale { rejected: stale });
    }

    let target = &session.suggestions[index];
    let buffer = target.range.splice(session.buffer(), &target.replacement_text)?;
    session.set_buffer(buffer);

    let mut accepted = None;
    let mut rejected = Vec::new();
    for mut s in std::mem::take(&mut session.suggestions) {
        if s.id == suggestion_id {
            s.status = SuggestionStatus::Accepted;
            accepted = Some(s);
        } else if s.is_pending() {
            s.status = SuggestionStatus::Rejected;
            rejected.push(s);
        }
    }

    accepted.map(|accepted| AcceptOutcome::Applied { accepted, rejected })
}

/// Rejects a live suggestion and drops it from the live set. The buffer and the
/// other suggestions are untouched.
pub fn reject(session: &mut DocumentSession, suggestion_id: Uuid) -> Option<Suggestion> {
    let index = session.suggestions.iter().position(|s| s.id == suggestion_id)?;
    let mut rejected = session.suggestions.remove(index);
    rejected.status = SuggestionStatus::Rejected;
    Some(rejected)
}

/// Applies text typed by the user. Any keystroke can shift offsets anywhere in
/// the buffer, so every pending suggestion is rejected and returned. Returns
/// `None` if `text` equals the current buffer.
pub fn apply_edit(session: &mut DocumentSession, text: String) -> Option<Vec<Suggestion>> {
    if text == session.buffer() {
        return None;
    }
    session.set_buffer(text);

    let invalidated = std::mem::take(&mut session.suggestions)
        .into_iter()
        .filter(Suggestion::is_pending)
        .map(|mut s| {
            s.status = SuggestionStatus::Rejected;
            s
        })
        .collect();
    Some(invalidated)
}
