pub mod dedupe;
pub mod domain;
pub mod engine;
pub mod persona;
pub mod ports;
pub mod reconciler;
pub mod scheduler;
pub mod session;
pub mod streak;
pub mod validator;

pub use domain::{
    count_words, Document, DocumentUpdate, GrammarAnalysis, PersonaAnalysis, PersonaOutput,
    PersonaOutputKind, ProposedSuggestion, Suggestion, SuggestionKind, SuggestionStatus, TextRange,
};
pub use engine::{Effect, EditorEngine};
pub use persona::{PersonaCategory, PersonaType};
pub use ports::{
    DatabaseService, GrammarAnalysisService, PersonaAnalysisService, PortError, PortResult,
};
pub use scheduler::SchedulerConfig;
pub use session::{DocumentSession, SessionTicket};
pub use streak::{calculate_streak, WritingStreak};
