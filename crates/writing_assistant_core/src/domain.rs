//! crates/writing_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use crate::persona::PersonaType;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Documents
//=========================================================================================

/// A piece of writing owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub content: String,
    pub word_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A partial update to a document. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Counts whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

//=========================================================================================
// Text ranges
//=========================================================================================

/// A half-open range of character (Unicode scalar value) offsets into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns the text covered by this range, or `None` when the range is
    /// inverted or extends past the end of `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.start > self.end {
            return None;
        }
        let start = char_to_byte(text, self.start)?;
        let end = char_to_byte(text, self.end)?;
        Some(&text[start..end])
    }

    /// Replaces the covered text with `replacement`, producing a new string.
    pub fn splice(&self, text: &str, replacement: &str) -> Option<String> {
        if self.start > self.end {
            return None;
        }
        let start = char_to_byte(text, self.start)?;
        let end = char_to_byte(text, self.end)?;

        let mut out = String::with_capacity(text.len() - (end - start) + replacement.len());
        out.push_str(&text[..start]);
        out.push_str(replacement);
        out.push_str(&text[end..]);
        Some(out)
    }
}

/// Maps a char offset to a byte offset. `char_count` itself maps to `text.len()`.
fn char_to_byte(text: &str, char_offset: usize) -> Option<usize> {
    text.char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .nth(char_offset)
}

//=========================================================================================
// Suggestions
//=========================================================================================

/// Error returned when parsing one of the domain enums from its wire name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuggestionKind {
    Grammar,
    Spelling,
    Style,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grammar => "grammar",
            Self::Spelling => "spelling",
            Self::Style => "style",
        }
    }
}

impl FromStr for SuggestionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grammar" => Ok(Self::Grammar),
            "spelling" => Ok(Self::Spelling),
            "style" => Ok(Self::Style),
            other => Err(ParseEnumError {
                kind: "suggestion kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of a suggestion: `Pending` moves to exactly one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for SuggestionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                kind: "suggestion status",
                value: other.to_string(),
            }),
        }
    }
}

/// An edit proposal anchored to a range of the buffer it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kind: SuggestionKind,
    pub range: TextRange,
    pub original_text: String,
    pub replacement_text: String,
    pub explanation: Option<String>,
    pub status: SuggestionStatus,
    pub user_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }
}

/// A suggestion as returned by the grammar collaborator, before it is bound to
/// a document or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedSuggestion {
    pub kind: SuggestionKind,
    pub range: TextRange,
    pub original_text: String,
    pub replacement_text: String,
    pub explanation: String,
}

impl ProposedSuggestion {
    /// Binds the proposal to a document as a fresh pending suggestion.
    pub fn into_suggestion(self, document_id: Uuid) -> Suggestion {
        Suggestion {
            id: Uuid::new_v4(),
            document_id,
            kind: self.kind,
            range: self.range,
            original_text: self.original_text,
            replacement_text: self.replacement_text,
            explanation: Some(self.explanation),
            status: SuggestionStatus::Pending,
            user_feedback: None,
            created_at: Utc::now(),
        }
    }
}

/// Result of one grammar analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrammarAnalysis {
    pub suggestions: Vec<ProposedSuggestion>,
}

//=========================================================================================
// Persona outputs
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonaOutputKind {
    Tweet,
    Insight,
    Challenge,
    Encouragement,
}

impl PersonaOutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tweet => "tweet",
            Self::Insight => "insight",
            Self::Challenge => "challenge",
            Self::Encouragement => "encouragement",
        }
    }
}

impl FromStr for PersonaOutputKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tweet" => Ok(Self::Tweet),
            "insight" => Ok(Self::Insight),
            "challenge" => Ok(Self::Challenge),
            "encouragement" => Ok(Self::Encouragement),
            other => Err(ParseEnumError {
                kind: "persona output kind",
                value: other.to_string(),
            }),
        }
    }
}

/// What the persona collaborator returns for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaAnalysis {
    pub content: String,
    pub kind: PersonaOutputKind,
    pub reasoning: Option<String>,
}

/// A persisted persona commentary for a document. Informational only; it is
/// never anchored to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaOutput {
    pub id: Uuid,
    pub document_id: Uuid,
    pub persona: PersonaType,
    pub content: String,
    pub kind: PersonaOutputKind,
    pub reasoning: Option<String>,
    pub user_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl PersonaOutput {
    pub fn from_analysis(document_id: Uuid, persona: PersonaType, analysis: PersonaAnalysis) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            persona,
            content: analysis.content,
            kind: analysis.kind,
            reasoning: analysis.reasoning,
            user_rating: None,
            created_at: Utc::now(),
        }
    }
}
