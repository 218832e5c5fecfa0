pub mod db;
pub mod grammar_llm;
pub mod persona_llm;

pub use db::DbAdapter;
pub use grammar_llm::OpenAiGrammarAdapter;
pub use persona_llm::OpenAiPersonaAdapter;
