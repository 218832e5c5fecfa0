pub mod editor_task;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary mounts on the router.
pub use middleware::require_user;
pub use rest::{
    create_document_handler, delete_document_handler, get_document_handler,
    list_documents_handler, list_personas_handler, list_suggestions_handler,
    rate_persona_output_handler, streak_handler, update_document_handler,
};
pub use ws_handler::ws_handler;
