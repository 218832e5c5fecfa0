//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every handler runs behind `require_user`, so the caller's id is always in
//! the request extensions.

use crate::web::{
    protocol::{suggestion_dtos, DocumentDto, SuggestionDto},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;
use writing_assistant_core::{
    calculate_streak,
    domain::{Document, DocumentUpdate},
    persona,
    ports::{DatabaseService, PortError},
};

type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_documents_handler,
        create_document_handler,
        get_document_handler,
        update_document_handler,
        delete_document_handler,
        list_suggestions_handler,
        list_personas_handler,
        streak_handler,
        rate_persona_output_handler,
    ),
    components(
        schemas(
            DocumentDto,
            SuggestionDto,
            CreateDocumentRequest,
            UpdateDocumentRequest,
            PersonaDto,
            PersonaCategoryDto,
            StreakResponse,
            RatingRequest,
        )
    ),
    tags(
        (name = "Writing Assistant API", description = "Documents, suggestions and personas for the AI writing editor.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentQuery {
    /// Case-insensitive text to look for in titles and content.
    q: Option<String>,
}

#[derive(Deserialize, Default, ToSchema)]
#[serde(default)]
pub struct CreateDocumentRequest {
    title: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDocumentRequest {
    title: Option<String>,
    content: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PersonaDto {
    id: String,
    name: String,
}

#[derive(Serialize, ToSchema)]
pub struct PersonaCategoryDto {
    category: String,
    personas: Vec<PersonaDto>,
}

#[derive(Serialize, ToSchema)]
pub struct StreakResponse {
    current: u32,
    longest: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct RatingRequest {
    /// From 1 to 5.
    rating: u8,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn port_error(e: PortError, what: &str) -> HandlerError {
    match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Unexpected(_) => {
            error!("Unexpected error for {}: {:?}", what, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

/// Loads a document, hiding documents of other users behind a 404.
async fn owned_document(
    db: &dyn DatabaseService,
    user_id: Uuid,
    document_id: Uuid,
) -> Result<Document, HandlerError> {
    let document = db
        .get_document_by_id(document_id)
        .await
        .map_err(|e| port_error(e, "Document"))?;
    if document.user_id != user_id {
        return Err((StatusCode::NOT_FOUND, "Document not found".to_string()));
    }
    Ok(document)
}

fn default_title() -> String {
    format!("Writing Session - {}", Utc::now().format("%Y-%m-%d"))
}

fn validate_rating(rating: u8) -> Result<u8, HandlerError> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            "rating must be between 1 and 5".to_string(),
        ))
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's documents, most recently updated first. With `q`, only
/// documents whose title or content contains it.
#[utoipa::path(
    get,
    path = "/documents",
    params(
        DocumentQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "The caller's documents", body = [DocumentDto]),
        (status = 401, description = "Missing or invalid x-user-id header")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Vec<DocumentDto>>, HandlerError> {
    let documents = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => app_state.db.search_documents(user_id, q).await,
        None => app_state.db.get_documents_by_user(user_id).await,
    }
    .map_err(|e| port_error(e, "Documents"))?;

    Ok(Json(documents.iter().map(DocumentDto::from).collect()))
}

/// Create a document. Untitled documents are named after the current date.
#[utoipa::path(
    post,
    path = "/documents",
    request_body = CreateDocumentRequest,
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 201, description = "Document created", body = DocumentDto),
        (status = 401, description = "Missing or invalid x-user-id header")
    )
)]
pub async fn create_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let title = req
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(default_title);
    let content = req.content.unwrap_or_default();

    let document = app_state
        .db
        .create_document(user_id, &title, &content)
        .await
        .map_err(|e| port_error(e, "Document"))?;
    info!(document_id = %document.id, %user_id, "document created");

    Ok((StatusCode::CREATED, Json(DocumentDto::from(&document))))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    params(
        ("id" = Uuid, Path, description = "Document id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "The document", body = DocumentDto),
        (status = 404, description = "No such document for this user")
    )
)]
pub async fn get_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentDto>, HandlerError> {
    let document = owned_document(app_state.db.as_ref(), user_id, document_id).await?;
    Ok(Json(DocumentDto::from(&document)))
}

/// Update the title and/or content of a document.
#[utoipa::path(
    patch,
    path = "/documents/{id}",
    request_body = UpdateDocumentRequest,
    params(
        ("id" = Uuid, Path, description = "Document id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "The updated document", body = DocumentDto),
        (status = 404, description = "No such document for this user")
    )
)]
pub async fn update_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentDto>, HandlerError> {
    owned_document(app_state.db.as_ref(), user_id, document_id).await?;
    let update = DocumentUpdate {
        title: req.title,
        content: req.content,
    };
    let document = app_state
        .db
        .update_document(document_id, update)
        .await
        .map_err(|e| port_error(e, "Document"))?;
    Ok(Json(DocumentDto::from(&document)))
}

/// Delete a document together with its suggestions and persona outputs.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    params(
        ("id" = Uuid, Path, description = "Document id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "No such document for this user")
    )
)]
pub async fn delete_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    owned_document(app_state.db.as_ref(), user_id, document_id).await?;
    app_state
        .db
        .delete_document(document_id)
        .await
        .map_err(|e| port_error(e, "Document"))?;
    info!(%document_id, %user_id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Every suggestion ever made for a document, oldest first.
#[utoipa::path(
    get,
    path = "/documents/{id}/suggestions",
    params(
        ("id" = Uuid, Path, description = "Document id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "The document's suggestions", body = [SuggestionDto]),
        (status = 404, description = "No such document for this user")
    )
)]
pub async fn list_suggestions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<SuggestionDto>>, HandlerError> {
    owned_document(app_state.db.as_ref(), user_id, document_id).await?;
    let suggestions = app_state
        .db
        .get_suggestions_for_document(document_id)
        .await
        .map_err(|e| port_error(e, "Suggestions"))?;
    Ok(Json(suggestion_dtos(&suggestions)))
}

/// The persona catalog, grouped by category.
#[utoipa::path(
    get,
    path = "/personas",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses((status = 200, description = "Persona catalog", body = [PersonaCategoryDto]))
)]
pub async fn list_personas_handler() -> Json<Vec<PersonaCategoryDto>> {
    let catalog = persona::catalog()
        .into_iter()
        .map(|(category, personas)| PersonaCategoryDto {
            category: category.display_name().to_string(),
            personas: personas
                .into_iter()
                .map(|p| PersonaDto {
                    id: p.as_str().to_string(),
                    name: p.display_name().to_string(),
                })
                .collect(),
        })
        .collect();
    Json(catalog)
}

/// Consecutive days (ending today or yesterday) on which the caller started a document.
#[utoipa::path(
    get,
    path = "/streak",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses((status = 200, description = "The caller's writing streak", body = StreakResponse))
)]
pub async fn streak_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<StreakResponse>, HandlerError> {
    let dates = app_state
        .db
        .get_document_dates_by_user(user_id)
        .await
        .map_err(|e| port_error(e, "Documents"))?;
    let streak = calculate_streak(&dates, Utc::now().date_naive());
    Ok(Json(StreakResponse {
        current: streak.current,
        longest: streak.longest,
    }))
}

/// Rate a persona output from 1 to 5.
#[utoipa::path(
    put,
    path = "/persona-outputs/{id}/rating",
    request_body = RatingRequest,
    params(
        ("id" = Uuid, Path, description = "Persona output id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 204, description = "Rating stored"),
        (status = 400, description = "Rating out of range"),
        (status = 404, description = "No such persona output for this user")
    )
)]
pub async fn rate_persona_output_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(output_id): Path<Uuid>,
    Json(req): Json<RatingRequest>,
) -> Result<StatusCode, HandlerError> {
    let rating = validate_rating(req.rating)?;
    let output = app_state
        .db
        .get_persona_output_by_id(output_id)
        .await
        .map_err(|e| port_error(e, "Persona output"))?;
    owned_document(app_state.db.as_ref(), user_id, output.document_id)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "Persona output not found".to_string()))?;

    app_state
        .db
        .rate_persona_output(output_id, rating)
        .await
        .map_err(|e| port_error(e, "Persona output"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use rstest::rstest;
    use writing_assistant_core::{
        count_words,
        domain::{PersonaOutput, Suggestion, SuggestionStatus},
        ports::PortResult,
    };

    /// A store holding exactly one document.
    struct SingleDocument(Document);

    impl SingleDocument {
        fn owned_by(user_id: Uuid) -> Self {
            let now = Utc::now();
            Self(Document {
                id: Uuid::new_v4(),
                user_id,
                title: Some("Draft".to_string()),
                content: "private words".to_string(),
                word_count: count_words("private words"),
                created_at: now,
                updated_at: now,
            })
        }

        fn unused<T>() -> PortResult<T> {
            Err(PortError::Unexpected("not used here".to_string()))
        }
    }

    #[async_trait]
    impl DatabaseService for SingleDocument {
        async fn create_document(&self, _: Uuid, _: &str, _: &str) -> PortResult<Document> {
            Self::unused()
        }

        async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document> {
            if document_id == self.0.id {
                Ok(self.0.clone())
            } else {
                Err(PortError::NotFound(document_id.to_string()))
            }
        }

        async fn update_document(&self, _: Uuid, _: DocumentUpdate) -> PortResult<Document> {
            Self::unused()
        }

        async fn delete_document(&self, _: Uuid) -> PortResult<()> {
            Self::unused()
        }

        async fn get_documents_by_user(&self, _: Uuid) -> PortResult<Vec<Document>> {
            Self::unused()
        }

        async fn search_documents(&self, _: Uuid, _: &str) -> PortResult<Vec<Document>> {
            Self::unused()
        }

        async fn get_document_dates_by_user(&self, _: Uuid) -> PortResult<Vec<DateTime<Utc>>> {
            Self::unused()
        }

        async fn create_suggestion(&self, _: Suggestion) -> PortResult<Suggestion> {
            Self::unused()
        }

        async fn create_suggestions(&self, _: Vec<Suggestion>) -> PortResult<Vec<Suggestion>> {
            Self::unused()
        }

        async fn update_suggestion_status(&self, _: Uuid, _: SuggestionStatus, _: Option<&str>) -> PortResult<()> {
            Self::unused()
        }

        async fn get_suggestions_for_document(&self, _: Uuid) -> PortResult<Vec<Suggestion>> {
            Self::unused()
        }

        async fn get_pending_suggestions(&self, _: Uuid) -> PortResult<Vec<Suggestion>> {
            Self::unused()
        }

        async fn save_persona_output(&self, _: PersonaOutput) -> PortResult<PersonaOutput> {
            Self::unused()
        }

        async fn get_persona_output_by_id(&self, _: Uuid) -> PortResult<PersonaOutput> {
            Self::unused()
        }

        async fn rate_persona_output(&self, _: Uuid, _: u8) -> PortResult<()> {
            Self::unused()
        }
    }

    #[tokio::test]
    async fn owners_see_their_documents() {
        let owner = Uuid::new_v4();
        let db = SingleDocument::owned_by(owner);
        let document = owned_document(&db, owner, db.0.id).await.unwrap();
        assert_eq!(document.content, "private words");
    }

    #[tokio::test]
    async fn other_users_get_a_404() {
        let db = SingleDocument::owned_by(Uuid::new_v4());
        let (status, body) = owned_document(&db, Uuid::new_v4(), db.0.id).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.contains("private"));
    }

    #[tokio::test]
    async fn missing_documents_get_a_404() {
        let owner = Uuid::new_v4();
        let db = SingleDocument::owned_by(owner);
        let (status, _) = owned_document(&db, owner, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(5, true)]
    #[case(6, false)]
    fn ratings_must_be_one_to_five(#[case] rating: u8, #[case] ok: bool) {
        assert_eq!(validate_rating(rating).is_ok(), ok);
    }

    #[test]
    fn not_found_maps_to_404() {
        let (status, _) = port_error(PortError::NotFound("x".to_string()), "Document");
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = port_error(PortError::Unexpected("db down".to_string()), "Document");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("db down"));
    }

    #[test]
    fn default_titles_carry_the_date() {
        assert!(default_title().starts_with("Writing Session - 20"));
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/documents",
            "/documents/{id}",
            "/documents/{id}/suggestions",
            "/personas",
            "/streak",
            "/persona-outputs/{id}/rating",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
