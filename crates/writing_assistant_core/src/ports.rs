//! crates/writing_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or LLM APIs.

use crate::domain::{
    Document, DocumentUpdate, GrammarAnalysis, PersonaAnalysis, PersonaOutput, Suggestion,
    SuggestionStatus,
};
use crate::persona::PersonaType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Document Management ---
    async fn create_document(&self, user_id: Uuid, title: &str, content: &str) -> PortResult<Document>;

    async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document>;

    async fn update_document(&self, document_id: Uuid, update: DocumentUpdate) -> PortResult<Document>;

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()>;

    /// Most recently updated first.
    async fn get_documents_by_user(&self, user_id: Uuid) -> PortResult<Vec<Document>>;

    /// Case-insensitive substring match on title or content, most recently updated first.
    async fn search_documents(&self, user_id: Uuid, query: &str) -> PortResult<Vec<Document>>;

    async fn get_document_dates_by_user(&self, user_id: Uuid) -> PortResult<Vec<DateTime<Utc>>>;

    // --- Suggestion Management ---
    async fn create_suggestion(&self, suggestion: Suggestion) -> PortResult<Suggestion>;

    async fn create_suggestions(&self, suggestions: Vec<Suggestion>) -> PortResult<Vec<Suggestion>>;

    async fn update_suggestion_status(
        &self,
        suggestion_id: Uuid,
        status: SuggestionStatus,
        user_feedback: Option<&str>,
    ) -> PortResult<()>;

    /// Oldest first.
    async fn get_suggestions_for_document(&self, document_id: Uuid) -> PortResult<Vec<Suggestion>>;

    /// Pending only, oldest first.
    async fn get_pending_suggestions(&self, document_id: Uuid) -> PortResult<Vec<Suggestion>>;

    // --- Persona Outputs ---
    async fn save_persona_output(&self, output: PersonaOutput) -> PortResult<PersonaOutput>;

    async fn get_persona_output_by_id(&self, output_id: Uuid) -> PortResult<PersonaOutput>;

    async fn rate_persona_output(&self, output_id: Uuid, rating: u8) -> PortResult<()>;
}

#[async_trait]
pub trait GrammarAnalysisService: Send + Sync {
    /// Proposes grammar, spelling and style fixes. Returned ranges are relative
    /// to the full `text`, whatever window the service actually examined.
    async fn analyze_grammar(&self, text: &str) -> PortResult<GrammarAnalysis>;
}

#[async_trait]
pub trait PersonaAnalysisService: Send + Sync {
    /// Writes a piece of commentary on `text` in the voice of `persona`.
    async fn analyze_persona(&self, text: &str, persona: PersonaType) -> PortResult<PersonaAnalysis>;
}
