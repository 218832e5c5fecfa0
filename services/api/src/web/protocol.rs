//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser editor and the API
//! server, plus the JSON shapes of the domain objects shared with the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use writing_assistant_core::domain::{Document, PersonaOutput, Suggestion};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens a document for editing, replacing any document already open.
    Open { document_id: Uuid },

    /// The full text of the editor after the user typed.
    Edit { content: String },

    Accept { suggestion_id: Uuid },

    Reject {
        suggestion_id: Uuid,
        #[serde(default)]
        feedback: Option<String>,
    },

    /// Switches the persona used for commentary. Triggers a pass right away.
    SelectPersona { persona: String },

    /// Saves the buffer now instead of waiting for autosave.
    Save,

    Rename { title: Option<String> },

    /// Closes the open document. Unsaved text is written first.
    Close,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms that a document is open and gives its starting state.
    DocumentOpened {
        document: DocumentDto,
        suggestions: Vec<SuggestionDto>,
        persona: String,
    },

    /// The complete live suggestion set. Replaces whatever the client shows.
    SuggestionsUpdated { suggestions: Vec<SuggestionDto> },

    /// The buffer was rewritten by the server (an accepted suggestion).
    ContentReplaced { content: String },

    PersonaOutput { output: PersonaOutputDto },

    /// Which background operations are currently running.
    AnalysisState {
        grammar: bool,
        persona: bool,
        saving: bool,
    },

    Saved {
        document_id: Uuid,
        word_count: usize,
        saved_at: DateTime<Utc>,
    },

    DocumentRenamed {
        document_id: Uuid,
        title: Option<String>,
    },

    DocumentClosed { document_id: Uuid },

    /// Reports a failed request. The connection stays usable.
    Error { message: String },
}

//=========================================================================================
// Shared DTOs
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct DocumentDto {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: String,
    pub word_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Document> for DocumentDto {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            content: doc.content.clone(),
            word_count: doc.word_count,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct SuggestionDto {
    pub id: Uuid,
    pub document_id: Uuid,
    /// One of `grammar`, `spelling`, `style`.
    pub kind: String,
    /// Char offset of the first replaced character.
    pub start: usize,
    /// Char offset one past the last replaced character.
    pub end: usize,
    pub original_text: String,
    pub replacement_text: String,
    pub explanation: Option<String>,
    /// One of `pending`, `accepted`, `rejected`.
    pub status: String,
    pub user_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Suggestion> for SuggestionDto {
    fn from(s: &Suggestion) -> Self {
        Self {
            id: s.id,
            document_id: s.document_id,
            kind: s.kind.as_str().to_string(),
            start: s.range.start,
            end: s.range.end,
            original_text: s.original_text.clone(),
            replacement_text: s.replacement_text.clone(),
            explanation: s.explanation.clone(),
            status: s.status.as_str().to_string(),
            user_feedback: s.user_feedback.clone(),
            created_at: s.created_at,
        }
    }
}

pub fn suggestion_dtos(suggestions: &[Suggestion]) -> Vec<SuggestionDto> {
    suggestions.iter().map(SuggestionDto::from).collect()
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct PersonaOutputDto {
    pub id: Uuid,
    pub document_id: Uuid,
    pub persona: String,
    pub content: String,
    /// One of `tweet`, `insight`, `challenge`, `encouragement`.
    pub output_type: String,
    pub reasoning: Option<String>,
    pub user_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl From<&PersonaOutput> for PersonaOutputDto {
    fn from(output: &PersonaOutput) -> Self {
        Self {
            id: output.id,
            document_id: output.document_id,
            persona: output.persona.as_str().to_string(),
            content: output.content.clone(),
            output_type: output.kind.as_str().to_string(),
            reasoning: output.reasoning.clone(),
            user_rating: output.user_rating,
            created_at: output.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let id = Uuid::new_v4();
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "reject", "suggestion_id": id })).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Reject {
                suggestion_id: id,
                feedback: None
            }
        );

        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "select_persona", "persona": "anima" })).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SelectPersona {
                persona: "anima".to_string()
            }
        );

        assert_eq!(
            serde_json::from_value::<ClientMessage>(json!({ "type": "save" })).unwrap(),
            ClientMessage::Save
        );
        assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "init" })).is_err());
    }

    #[test]
    fn server_messages_serialize_with_snake_case_tags() {
        let value = serde_json::to_value(ServerMessage::AnalysisState {
            grammar: true,
            persona: false,
            saving: false,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "type": "analysis_state", "grammar": true, "persona": false, "saving": false })
        );

        let value = serde_json::to_value(ServerMessage::ContentReplaced {
            content: "The cat sat.".to_string(),
        })
        .unwrap();
        assert_eq!(value["type"], "content_replaced");
    }
}
