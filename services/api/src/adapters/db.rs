//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use writing_assistant_core::domain::{
    count_words, Document, DocumentUpdate, PersonaOutput, Suggestion, SuggestionStatus, TextRange,
};
use writing_assistant_core::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const DOCUMENT_COLUMNS: &str = "id, user_id, title, content, word_count, created_at, updated_at";
const SUGGESTION_COLUMNS: &str = "id, document_id, kind, range_start, range_end, original_text, \
     replacement_text, explanation, status, user_feedback, created_at";
const PERSONA_OUTPUT_COLUMNS: &str =
    "id, document_id, persona, output_content, output_type, reasoning, user_rating, created_at";

fn unexpected(e: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: &str, id: Uuid) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    title: Option<String>,
    content: String,
    word_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            content: self.content,
            word_count: self.word_count.max(0) as usize,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct SuggestionRecord {
    id: Uuid,
    document_id: Uuid,
    kind: String,
    range_start: i32,
    range_end: i32,
    original_text: String,
    replacement_text: String,
    explanation: Option<String>,
    status: String,
    user_feedback: Option<String>,
    created_at: DateTime<Utc>,
}
impl SuggestionRecord {
    fn to_domain(self) -> PortResult<Suggestion> {
        Ok(Suggestion {
            id: self.id,
            document_id: self.document_id,
            kind: self.kind.parse().map_err(unexpected)?,
            range: TextRange::new(self.range_start.max(0) as usize, self.range_end.max(0) as usize),
            original_text: self.original_text,
            replacement_text: self.replacement_text,
            explanation: self.explanation,
            status: self.status.parse().map_err(unexpected)?,
            user_feedback: self.user_feedback,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct PersonaOutputRecord {
    id: Uuid,
    document_id: Uuid,
    persona: String,
    output_content: String,
    output_type: String,
    reasoning: Option<String>,
    user_rating: Option<i16>,
    created_at: DateTime<Utc>,
}
impl PersonaOutputRecord {
    fn to_domain(self) -> PortResult<PersonaOutput> {
        Ok(PersonaOutput {
            id: self.id,
            document_id: self.document_id,
            persona: self.persona.parse().map_err(unexpected)?,
            content: self.output_content,
            kind: self.output_type.parse().map_err(unexpected)?,
            reasoning: self.reasoning,
            user_rating: self.user_rating.map(|r| r.clamp(0, u8::MAX as i16) as u8),
            created_at: self.created_at,
        })
    }
}

fn suggestions_to_domain(records: Vec<SuggestionRecord>) -> PortResult<Vec<Suggestion>> {
    records.into_iter().map(SuggestionRecord::to_domain).collect()
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_document(&self, user_id: Uuid, title: &str, content: &str) -> PortResult<Document> {
        let sql = format!(
            "INSERT INTO documents (id, user_id, title, content, word_count) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(title)
            .bind(content)
            .bind(count_words(content) as i32)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, "Document", document_id))?;
        Ok(record.to_domain())
    }

    async fn update_document(&self, document_id: Uuid, update: DocumentUpdate) -> PortResult<Document> {
        let word_count = update.content.as_deref().map(|c| count_words(c) as i32);
        let sql = format!(
            "UPDATE documents SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 word_count = COALESCE($4, word_count), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(document_id)
            .bind(update.title)
            .bind(update.content)
            .bind(word_count)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, "Document", document_id))?;
        Ok(record.to_domain())
    }

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        Ok(())
    }

    async fn get_documents_by_user(&self, user_id: Uuid) -> PortResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE user_id = $1 ORDER BY updated_at DESC",
            DOCUMENT_COLUMNS
        );
        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn search_documents(&self, user_id: Uuid, query: &str) -> PortResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents \
             WHERE user_id = $1 AND (title ILIKE $2 OR content ILIKE $2) \
             ORDER BY updated_at DESC",
            DOCUMENT_COLUMNS
        );
        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(user_id)
            .bind(like_pattern(query))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_document_dates_by_user(&self, user_id: Uuid) -> PortResult<Vec<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM documents WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn create_suggestion(&self, suggestion: Suggestion) -> PortResult<Suggestion> {
        let mut created = self.create_suggestions(vec![suggestion]).await?;
        created
            .pop()
            .ok_or_else(|| PortError::Unexpected("Suggestion insert returned no row".to_string()))
    }

    async fn create_suggestions(&self, suggestions: Vec<Suggestion>) -> PortResult<Vec<Suggestion>> {
        if suggestions.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO suggestions (id, document_id, kind, range_start, range_end, original_text, \
             replacement_text, explanation, status, user_feedback, created_at) ",
        );
        builder.push_values(&suggestions, |mut row, s| {
            row.push_bind(s.id)
                .push_bind(s.document_id)
                .push_bind(s.kind.as_str())
                .push_bind(s.range.start as i32)
                .push_bind(s.range.end as i32)
                .push_bind(s.original_text.clone())
                .push_bind(s.replacement_text.clone())
                .push_bind(s.explanation.clone())
                .push_bind(s.status.as_str())
                .push_bind(s.user_feedback.clone())
                .push_bind(s.created_at);
        });
        builder.push(" RETURNING ");
        builder.push(SUGGESTION_COLUMNS);

        let records = builder
            .build_query_as::<SuggestionRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        suggestions_to_domain(records)
    }

    async fn update_suggestion_status(
        &self,
        suggestion_id: Uuid,
        status: SuggestionStatus,
        user_feedback: Option<&str>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE suggestions SET status = $2, user_feedback = COALESCE($3, user_feedback) WHERE id = $1",
        )
        .bind(suggestion_id)
        .bind(status.as_str())
        .bind(user_feedback)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Suggestion {} not found", suggestion_id)));
        }
        Ok(())
    }

    async fn get_suggestions_for_document(&self, document_id: Uuid) -> PortResult<Vec<Suggestion>> {
        let sql = format!(
            "SELECT {} FROM suggestions WHERE document_id = $1 ORDER BY created_at ASC",
            SUGGESTION_COLUMNS
        );
        let records = sqlx::query_as::<_, SuggestionRecord>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        suggestions_to_domain(records)
    }

    async fn get_pending_suggestions(&self, document_id: Uuid) -> PortResult<Vec<Suggestion>> {
        let sql = format!(
            "SELECT {} FROM suggestions WHERE document_id = $1 AND status = 'pending' ORDER BY created_at ASC",
            SUGGESTION_COLUMNS
        );
        let records = sqlx::query_as::<_, SuggestionRecord>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        suggestions_to_domain(records)
    }

    async fn save_persona_output(&self, output: PersonaOutput) -> PortResult<PersonaOutput> {
        let sql = format!(
            "INSERT INTO persona_outputs (id, document_id, persona, output_content, output_type, reasoning, user_rating, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            PERSONA_OUTPUT_COLUMNS
        );
        let record = sqlx::query_as::<_, PersonaOutputRecord>(&sql)
            .bind(output.id)
            .bind(output.document_id)
            .bind(output.persona.as_str())
            .bind(&output.content)
            .bind(output.kind.as_str())
            .bind(&output.reasoning)
            .bind(output.user_rating.map(i16::from))
            .bind(output.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_persona_output_by_id(&self, output_id: Uuid) -> PortResult<PersonaOutput> {
        let sql = format!("SELECT {} FROM persona_outputs WHERE id = $1", PERSONA_OUTPUT_COLUMNS);
        let record = sqlx::query_as::<_, PersonaOutputRecord>(&sql)
            .bind(output_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, "Persona output", output_id))?;
        record.to_domain()
    }

    async fn rate_persona_output(&self, output_id: Uuid, rating: u8) -> PortResult<()> {
        let result = sqlx::query("UPDATE persona_outputs SET user_rating = $2 WHERE id = $1")
            .bind(output_id)
            .bind(i16::from(rating))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Persona output {} not found", output_id)));
        }
        Ok(())
    }
}

/// Builds an `ILIKE` pattern matching `query` anywhere, with its own wildcards escaped.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
