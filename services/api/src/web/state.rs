//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use writing_assistant_core::ports::{
    DatabaseService, GrammarAnalysisService, PersonaAnalysisService,
};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub grammar_adapter: Arc<dyn GrammarAnalysisService>,
    pub persona_adapter: Arc<dyn PersonaAnalysisService>,
}
