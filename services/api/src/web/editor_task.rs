//! services/api/src/web/editor_task.rs
//!
//! The per-connection editor actor. It owns one `EditorEngine`, feeds it client
//! commands and timer ticks, runs the effects it returns against the ports, and
//! reports state changes back to the client.
//!
//! Everything touching the engine happens on this one task. Analysis calls run
//! in a `JoinSet` and come back as `Completion`s; persistence of suggestion
//! statuses is fire-and-forget; saves are awaited in place so two writes of the
//! same document never race.

use crate::web::{
    protocol::{suggestion_dtos, ClientMessage, DocumentDto, PersonaOutputDto, ServerMessage},
    state::AppState,
};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use writing_assistant_core::{
    domain::{Document, DocumentUpdate, PersonaAnalysis, PersonaOutput, ProposedSuggestion},
    persona::PersonaType,
    ports::{DatabaseService, GrammarAnalysisService, PersonaAnalysisService, PortError, PortResult},
    scheduler::Pipeline,
    Effect, EditorEngine, SchedulerConfig, SessionTicket,
};

/// The collaborators an editor session talks to.
#[derive(Clone)]
pub struct EditorPorts {
    pub db: Arc<dyn DatabaseService>,
    pub grammar: Arc<dyn GrammarAnalysisService>,
    pub persona: Arc<dyn PersonaAnalysisService>,
}

/// The result of a background analysis call, delivered back to the actor.
enum Completion {
    Grammar {
        ticket: SessionTicket,
        proposals: Vec<ProposedSuggestion>,
    },
    Persona {
        ticket: SessionTicket,
        persona: PersonaType,
        analysis: Option<PersonaAnalysis>,
    },
}

pub struct EditorTask {
    user_id: Uuid,
    engine: EditorEngine,
    ports: EditorPorts,
    analysis_timeout: Duration,
    outbound: mpsc::Sender<ServerMessage>,
    tasks: JoinSet<Completion>,
    published: Option<(bool, bool, bool)>,
}

impl EditorTask {
    pub fn new(
        user_id: Uuid,
        ports: EditorPorts,
        scheduler: SchedulerConfig,
        analysis_timeout: Duration,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            user_id,
            engine: EditorEngine::new(scheduler, PersonaType::default()),
            ports,
            analysis_timeout,
            outbound,
            tasks: JoinSet::new(),
            published: None,
        }
    }

    pub fn from_state(state: &AppState, user_id: Uuid, outbound: mpsc::Sender<ServerMessage>) -> Self {
        let ports = EditorPorts {
            db: state.db.clone(),
            grammar: state.grammar_adapter.clone(),
            persona: state.persona_adapter.clone(),
        };
        Self::new(
            user_id,
            ports,
            state.config.scheduler_config(),
            state.config.analysis_timeout,
            outbound,
        )
    }

    /// Runs until the command channel closes or `token` is cancelled. An open
    /// document is flushed and closed on the way out.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ClientMessage>, token: CancellationToken) {
        info!(user_id = %self.user_id, "editor task started");

        loop {
            let deadline = self.engine.next_deadline();
            tokio::select! {
                _ = token.cancelled() => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },

                joined = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Some(Ok(completion)) => self.complete(completion).await,
                    Some(Err(e)) => warn!(error = %e, "analysis task was cancelled"),
                    None => {}
                },

                _ = wait_until(deadline) => {
                    let effects = self.engine.poll(Instant::now());
                    self.execute(effects).await;
                }
            }
            self.publish_state().await;
        }

        self.close_document().await;
        info!(user_id = %self.user_id, "editor task finished");
    }

    async fn handle(&mut self, command: ClientMessage) {
        match command {
            ClientMessage::Open { document_id } => self.open(document_id).await,
            ClientMessage::Edit { content } => {
                let effects = self.engine.edit(Instant::now(), content);
                if !effects.is_empty() {
                    self.send_suggestions().await;
                }
                self.execute(effects).await;
            }
            ClientMessage::Accept { suggestion_id } => {
                let before = self.engine.session().buffer().to_string();
                let effects = self.engine.accept(Instant::now(), suggestion_id);
                if effects.is_empty() {
                    return;
                }
                if self.engine.session().buffer() != before {
                    let content = self.engine.session().buffer().to_string();
                    self.send(ServerMessage::ContentReplaced { content }).await;
                }
                self.send_suggestions().await;
                self.execute(effects).await;
            }
            ClientMessage::Reject {
                suggestion_id,
                feedback,
            } => {
                let effects = self.engine.reject(suggestion_id, feedback);
                if !effects.is_empty() {
                    self.send_suggestions().await;
                }
                self.execute(effects).await;
            }
            ClientMessage::SelectPersona { persona } => match persona.parse::<PersonaType>() {
                Ok(persona) => {
                    let effects = self.engine.select_persona(persona);
                    self.execute(effects).await;
                }
                Err(e) => self.send_error(e.to_string()).await,
            },
            ClientMessage::Save => {
                if !self.engine.session().is_open() {
                    self.send_error("No document is open.").await;
                    return;
                }
                let effects = self.engine.save();
                self.execute(effects).await;
            }
            ClientMessage::Rename { title } => self.rename(title).await,
            ClientMessage::Close => self.close_document().await,
        }
    }

    async fn open(&mut self, document_id: Uuid) {
        let document = match self.ports.db.get_document_by_id(document_id).await {
            Ok(doc) if doc.user_id == self.user_id => doc,
            Ok(_) | Err(PortError::NotFound(_)) => {
                warn!(%document_id, user_id = %self.user_id, "open refused: no such document for user");
                self.send_error("Document not found.").await;
                return;
            }
            Err(e) => {
                error!(%document_id, error = %e, "failed to load document");
                self.send_error("Failed to load document.").await;
                return;
            }
        };

        self.close_document().await;

        let pending = self
            .ports
            .db
            .get_pending_suggestions(document_id)
            .await
            .unwrap_or_else(|e| {
                error!(%document_id, error = %e, "failed to load pending suggestions");
                Vec::new()
            });

        let dto = DocumentDto::from(&document);
        let effects = self.engine.open(Instant::now(), document, pending);
        let session = self.engine.session();
        let opened = ServerMessage::DocumentOpened {
            document: dto,
            suggestions: suggestion_dtos(session.suggestions()),
            persona: session.active_persona().as_str().to_string(),
        };
        self.send(opened).await;
        self.execute(effects).await;
    }

    /// Writes unsaved text, then ends the session. No-op when nothing is open.
    async fn close_document(&mut self) {
        let session = self.engine.session();
        let Some(document_id) = session.document_id() else {
            return;
        };

        if session.is_dirty() {
            let update = DocumentUpdate {
                title: None,
                content: Some(session.buffer().to_string()),
            };
            match self.ports.db.update_document(document_id, update).await {
                Ok(_) => debug!(%document_id, "flushed unsaved text on close"),
                Err(e) => error!(%document_id, error = %e, "failed to flush unsaved text on close"),
            }
        }

        self.engine.close();
        self.send(ServerMessage::DocumentClosed { document_id }).await;
    }

    async fn rename(&mut self, title: Option<String>) {
        let Some(document_id) = self.engine.session().document_id() else {
            self.send_error("No document is open.").await;
            return;
        };
        let update = DocumentUpdate {
            title,
            content: None,
        };
        match self.ports.db.update_document(document_id, update).await {
            Ok(doc) => {
                self.engine.rename(document_id, doc.title.clone());
                self.send(ServerMessage::DocumentRenamed {
                    document_id,
                    title: doc.title,
                })
                .await;
            }
            Err(e) => {
                error!(%document_id, error = %e, "failed to rename document");
                self.send_error("Failed to rename document.").await;
            }
        }
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PersistStatus {
                    suggestion_id,
                    status,
                    user_feedback,
                } => {
                    let db = self.ports.db.clone();
                    tokio::spawn(async move {
                        if let Err(e) = db
                            .update_suggestion_status(suggestion_id, status, user_feedback.as_deref())
                            .await
                        {
                            error!(%suggestion_id, status = status.as_str(), error = %e, "failed to persist suggestion status");
                        }
                    });
                }
                Effect::AnalyzeGrammar { ticket, text } => {
                    let grammar = self.ports.grammar.clone();
                    let limit = self.analysis_timeout;
                    self.tasks.spawn(async move {
                        let proposals = guarded("grammar analysis", limit, grammar.analyze_grammar(&text))
                            .await
                            .map(|analysis| analysis.suggestions)
                            .unwrap_or_default();
                        Completion::Grammar { ticket, proposals }
                    });
                }
                Effect::AnalyzePersona {
                    ticket,
                    text,
                    persona,
                } => {
                    let service = self.ports.persona.clone();
                    let limit = self.analysis_timeout;
                    self.tasks.spawn(async move {
                        let analysis =
                            guarded("persona analysis", limit, service.analyze_persona(&text, persona)).await;
                        Completion::Persona {
                            ticket,
                            persona,
                            analysis,
                        }
                    });
                }
                Effect::Save { ticket, content } => self.save(ticket, content).await,
            }
        }
    }

    async fn save(&mut self, ticket: SessionTicket, content: String) {
        self.publish_state().await;

        let update = DocumentUpdate {
            title: None,
            content: Some(content),
        };
        let saved = match self.ports.db.update_document(ticket.document_id, update).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                error!(document_id = %ticket.document_id, error = %e, "failed to save document");
                None
            }
        };
        self.engine.complete_save(ticket, saved.clone());

        match saved {
            Some(Document {
                id,
                word_count,
                updated_at,
                ..
            }) => {
                debug!(document_id = %id, word_count, "document saved");
                self.send(ServerMessage::Saved {
                    document_id: id,
                    word_count,
                    saved_at: updated_at,
                })
                .await;
            }
            None => self.send_error("Failed to save document.").await,
        }
    }

    async fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Grammar { ticket, proposals } => {
                if !self.engine.session().is_current(ticket) {
                    self.engine.complete_grammar(ticket, Vec::new());
                    return;
                }
                let fresh: Vec<_> = proposals
                    .into_iter()
                    .map(|p| p.into_suggestion(ticket.document_id))
                    .collect();
                let suggestions = if fresh.is_empty() {
                    fresh
                } else {
                    match self.ports.db.create_suggestions(fresh.clone()).await {
                        Ok(stored) => stored,
                        Err(e) => {
                            error!(document_id = %ticket.document_id, error = %e, "failed to persist suggestions");
                            fresh
                        }
                    }
                };
                if self.engine.complete_grammar(ticket, suggestions) {
                    self.send_suggestions().await;
                }
            }
            Completion::Persona {
                ticket,
                persona,
                analysis,
            } => {
                let session = self.engine.session();
                let wanted = session.is_current(ticket) && session.active_persona() == persona;
                let output = match analysis {
                    Some(analysis) if wanted => {
                        let output = PersonaOutput::from_analysis(ticket.document_id, persona, analysis);
                        match self.ports.db.save_persona_output(output.clone()).await {
                            Ok(stored) => Some(stored),
                            Err(e) => {
                                error!(document_id = %ticket.document_id, error = %e, "failed to persist persona output");
                                Some(output)
                            }
                        }
                    }
                    _ => None,
                };
                if self.engine.complete_persona(ticket, output) {
                    if let Some(output) = self.engine.session().persona_output() {
                        let output = PersonaOutputDto::from(output);
                        self.send(ServerMessage::PersonaOutput { output }).await;
                    }
                }
            }
        }
    }

    /// Sends the running-operations flags if they changed since last time.
    async fn publish_state(&mut self) {
        let scheduler = self.engine.scheduler();
        let state = (
            scheduler.is_in_flight(Pipeline::Grammar),
            scheduler.is_in_flight(Pipeline::Persona),
            self.engine.session().is_saving(),
        );
        if self.published == Some(state) {
            return;
        }
        self.published = Some(state);
        let (grammar, persona, saving) = state;
        self.send(ServerMessage::AnalysisState {
            grammar,
            persona,
            saving,
        })
        .await;
    }

    async fn send_suggestions(&self) {
        let suggestions = suggestion_dtos(self.engine.session().suggestions());
        self.send(ServerMessage::SuggestionsUpdated { suggestions }).await;
    }

    async fn send_error(&self, message: impl Into<String>) {
        self.send(ServerMessage::Error {
            message: message.into(),
        })
        .await;
    }

    async fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).await.is_err() {
            debug!(user_id = %self.user_id, "client gone, dropping outbound message");
        }
    }
}

/// Awaits one analysis call under `limit`. Errors, timeouts and panics all
/// come back as `None` so the pipeline always gets its completion.
async fn guarded<T>(
    what: &'static str,
    limit: Duration,
    call: impl Future<Output = PortResult<T>>,
) -> Option<T> {
    match AssertUnwindSafe(tokio::time::timeout(limit, call)).catch_unwind().await {
        Ok(Ok(Ok(value))) => Some(value),
        Ok(Ok(Err(e))) => {
            error!(error = %e, "{what} failed");
            None
        }
        Ok(Err(_)) => {
            warn!(timeout_secs = limit.as_secs(), "{what} timed out");
            None
        }
        Err(_) => {
            error!("{what} panicked");
            None
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use writing_assistant_core::domain::{
        count_words, GrammarAnalysis, PersonaOutputKind, Suggestion, SuggestionKind, SuggestionStatus,
        TextRange,
    };

    //-------------------------------------------------------------------------------------
    // Fake ports
    //-------------------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeDb {
        documents: Mutex<HashMap<Uuid, Document>>,
        suggestions: Mutex<Vec<Suggestion>>,
        statuses: Mutex<Vec<(Uuid, SuggestionStatus)>>,
        persona_outputs: Mutex<Vec<PersonaOutput>>,
    }

    impl FakeDb {
        fn insert(&self, user_id: Uuid, content: &str) -> Uuid {
            let now = Utc::now();
            let doc = Document {
                id: Uuid::new_v4(),
                user_id,
                title: Some("Draft".to_string()),
                content: content.to_string(),
                word_count: count_words(content),
                created_at: now,
                updated_at: now,
            };
            let id = doc.id;
            self.documents.lock().unwrap().insert(id, doc);
            id
        }

        fn content(&self, id: Uuid) -> String {
            self.documents.lock().unwrap()[&id].content.clone()
        }

        fn unused<T>() -> PortResult<T> {
            Err(PortError::Unexpected("not used by the editor".to_string()))
        }
    }

    #[async_trait]
    impl DatabaseService for FakeDb {
        async fn create_document(&self, _: Uuid, _: &str, _: &str) -> PortResult<Document> {
            Self::unused()
        }

        async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document> {
            self.documents
                .lock()
                .unwrap()
                .get(&document_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(document_id.to_string()))
        }

        async fn update_document(&self, document_id: Uuid, update: DocumentUpdate) -> PortResult<Document> {
            let mut documents = self.documents.lock().unwrap();
            let doc = documents
                .get_mut(&document_id)
                .ok_or_else(|| PortError::NotFound(document_id.to_string()))?;
            if let Some(title) = update.title {
                doc.title = Some(title);
            }
            if let Some(content) = update.content {
                doc.word_count = count_words(&content);
                doc.content = content;
            }
            doc.updated_at = Utc::now();
            Ok(doc.clone())
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

        async fn create_suggestion(&self, suggestion: Suggestion) -> PortResult<Suggestion> {
            self.suggestions.lock().unwrap().push(suggestion.clone());
            Ok(suggestion)
        }

        async fn create_suggestions(&self, suggestions: Vec<Suggestion>) -> PortResult<Vec<Suggestion>> {
            self.suggestions.lock().unwrap().extend(suggestions.iter().cloned());
            Ok(suggestions)
        }

        async fn update_suggestion_status(
            &self,
            suggestion_id: Uuid,
            status: SuggestionStatus,
            _: Option<&str>,
        ) -> PortResult<()> {
            self.statuses.lock().unwrap().push((suggestion_id, status));
            Ok(())
        }

        async fn get_suggestions_for_document(&self, _: Uuid) -> PortResult<Vec<Suggestion>> {
            Self::unused()
        }

        async fn get_pending_suggestions(&self, document_id: Uuid) -> PortResult<Vec<Suggestion>> {
            Ok(self
                .suggestions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.document_id == document_id && s.is_pending())
                .cloned()
                .collect())
        }

        async fn save_persona_output(&self, output: PersonaOutput) -> PortResult<PersonaOutput> {
            self.persona_outputs.lock().unwrap().push(output.clone());
            Ok(output)
        }

        async fn get_persona_output_by_id(&self, _: Uuid) -> PortResult<PersonaOutput> {
            Self::unused()
        }

        async fn rate_persona_output(&self, _: Uuid, _: u8) -> PortResult<()> {
            Self::unused()
        }
    }

    /// Flags "Teh" wherever it appears, optionally after a delay. With
    /// `panic_first` set, the first call panics instead.
    #[derive(Default)]
    struct FakeGrammar {
        calls: AtomicUsize,
        delay: Option<Duration>,
        panic_first: bool,
    }

    #[async_trait]
    impl GrammarAnalysisService for FakeGrammar {
        async fn analyze_grammar(&self, text: &str) -> PortResult<GrammarAnalysis> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_first && call == 0 {
                panic!("malformed model reply");
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let suggestions = text
                .find("Teh")
                .map(|byte| {
                    let start = text[..byte].chars().count();
                    ProposedSuggestion {
                        kind: SuggestionKind::Spelling,
                        range: TextRange::new(start, start + 3),
                        original_text: "Teh".to_string(),
                        replacement_text: "The".to_string(),
                        explanation: "spelling".to_string(),
                    }
                })
                .into_iter()
                .collect();
            Ok(GrammarAnalysis { suggestions })
        }
    }

    #[derive(Default)]
    struct FakePersona {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PersonaAnalysisService for FakePersona {
        async fn analyze_persona(&self, _: &str, persona: PersonaType) -> PortResult<PersonaAnalysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PersonaAnalysis {
                content: format!("{} says keep going", persona.display_name()),
                kind: PersonaOutputKind::Encouragement,
                reasoning: None,
            })
        }
    }

    //-------------------------------------------------------------------------------------
    // Harness
    //-------------------------------------------------------------------------------------

    struct Harness {
        user_id: Uuid,
        db: Arc<FakeDb>,
        grammar: Arc<FakeGrammar>,
        persona: Arc<FakePersona>,
        commands: mpsc::Sender<ClientMessage>,
        outbound: mpsc::Receiver<ServerMessage>,
        token: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn start(grammar: FakeGrammar, analysis_timeout: Duration) -> Self {
            let user_id = Uuid::new_v4();
            let db = Arc::new(FakeDb::default());
            let grammar = Arc::new(grammar);
            let persona = Arc::new(FakePersona::default());
            let ports = EditorPorts {
                db: db.clone(),
                grammar: grammar.clone(),
                persona: persona.clone(),
            };
            let (commands, command_rx) = mpsc::channel(16);
            let (outbound_tx, outbound) = mpsc::channel(64);
            let token = CancellationToken::new();
            let task = EditorTask::new(user_id, ports, SchedulerConfig::default(), analysis_timeout, outbound_tx);
            let handle = tokio::spawn(task.run(command_rx, token.clone()));
            Self {
                user_id,
                db,
                grammar,
                persona,
                commands,
                outbound,
                token,
                handle,
            }
        }

        async fn send(&self, message: ClientMessage) {
            self.commands.send(message).await.unwrap();
        }

        /// Waits (in paused time) for the first message matching `pred`, skipping others.
        async fn expect(&mut self, what: &str, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
            let wait = async {
                loop {
                    let message = self.outbound.recv().await.expect("editor task hung up");
                    if pred(&message) {
                        return message;
                    }
                }
            };
            tokio::time::timeout(Duration::from_secs(120), wait)
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        }

        async fn open(&mut self, document_id: Uuid) {
            self.send(ClientMessage::Open { document_id }).await;
            self.expect("document_opened", |m| matches!(m, ServerMessage::DocumentOpened { .. }))
                .await;
        }
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn documents_of_other_users_cannot_be_opened() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        let foreign = h.db.insert(Uuid::new_v4(), "secret");

        h.send(ClientMessage::Open { document_id: foreign }).await;
        let message = h
            .expect("error", |m| matches!(m, ServerMessage::Error { .. } | ServerMessage::DocumentOpened { .. }))
            .await;
        assert_eq!(
            message,
            ServerMessage::Error {
                message: "Document not found.".to_string()
            }
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn typing_then_pausing_runs_one_grammar_pass() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        let doc = h.db.insert(h.user_id, "");
        h.open(doc).await;

        for text in ["T", "Te", "Teh", "Teh cat", "Teh cat sat."] {
            h.send(ClientMessage::Edit {
                content: text.to_string(),
            })
            .await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        let ServerMessage::SuggestionsUpdated { suggestions } = h
            .expect("suggestions", |m| matches!(m, ServerMessage::SuggestionsUpdated { .. }))
            .await
        else {
            unreachable!()
        };
        assert_eq!(suggestions.len(), 1);
        assert_eq!((suggestions[0].start, suggestions[0].end), (0, 3));
        assert_eq!(h.grammar.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.suggestions.lock().unwrap().len(), 1);

        let ServerMessage::PersonaOutput { output } = h
            .expect("persona output", |m| matches!(m, ServerMessage::PersonaOutput { .. }))
            .await
        else {
            unreachable!()
        };
        assert_eq!(output.persona, "twitter_naval");
        assert_eq!(h.persona.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.persona_outputs.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn accepting_rewrites_the_buffer_and_saves_shortly_after() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        let doc = h.db.insert(h.user_id, "");
        h.open(doc).await;

        h.send(ClientMessage::Edit {
            content: "Teh cat sat.".to_string(),
        })
        .await;
        let ServerMessage::SuggestionsUpdated { suggestions } = h
            .expect("suggestions", |m| matches!(m, ServerMessage::SuggestionsUpdated { .. }))
            .await
        else {
            unreachable!()
        };
        let id = suggestions[0].id;

        h.send(ClientMessage::Accept { suggestion_id: id }).await;
        let replaced = h
            .expect("content", |m| matches!(m, ServerMessage::ContentReplaced { .. }))
            .await;
        assert_eq!(
            replaced,
            ServerMessage::ContentReplaced {
                content: "The cat sat.".to_string()
            }
        );
        let cleared = h
            .expect("suggestions", |m| matches!(m, ServerMessage::SuggestionsUpdated { .. }))
            .await;
        assert_eq!(cleared, ServerMessage::SuggestionsUpdated { suggestions: vec![] });

        h.expect("saved", |m| matches!(m, ServerMessage::Saved { .. })).await;
        assert_eq!(h.db.content(doc), "The cat sat.");
        assert!(h
            .db
            .statuses
            .lock()
            .unwrap()
            .contains(&(id, SuggestionStatus::Accepted)));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn a_hung_grammar_call_times_out_and_frees_the_pipeline() {
        let slow = FakeGrammar {
            delay: Some(Duration::from_secs(600)),
            ..FakeGrammar::default()
        };
        let mut h = Harness::start(slow, Duration::from_secs(5));
        let doc = h.db.insert(h.user_id, "");
        h.open(doc).await;

        h.send(ClientMessage::Edit {
            content: "first draft".to_string(),
        })
        .await;
        h.expect("grammar busy", |m| {
            matches!(m, ServerMessage::AnalysisState { grammar: true, .. })
        })
        .await;
        h.expect("grammar idle", |m| {
            matches!(m, ServerMessage::AnalysisState { grammar: false, .. })
        })
        .await;

        h.send(ClientMessage::Edit {
            content: "second draft".to_string(),
        })
        .await;
        h.expect("grammar busy again", |m| {
            matches!(m, ServerMessage::AnalysisState { grammar: true, .. })
        })
        .await;
        assert_eq!(h.grammar.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn a_panicking_grammar_call_frees_the_pipeline() {
        let flaky = FakeGrammar {
            panic_first: true,
            ..FakeGrammar::default()
        };
        let mut h = Harness::start(flaky, default_timeout());
        let doc = h.db.insert(h.user_id, "");
        h.open(doc).await;

        h.send(ClientMessage::Edit {
            content: "first draft".to_string(),
        })
        .await;
        h.expect("grammar busy", |m| {
            matches!(m, ServerMessage::AnalysisState { grammar: true, .. })
        })
        .await;
        h.expect("grammar idle", |m| {
            matches!(m, ServerMessage::AnalysisState { grammar: false, .. })
        })
        .await;

        h.send(ClientMessage::Edit {
            content: "Teh second draft".to_string(),
        })
        .await;
        let ServerMessage::SuggestionsUpdated { suggestions } = h
            .expect("suggestions", |m| {
                matches!(m, ServerMessage::SuggestionsUpdated { suggestions } if !suggestions.is_empty())
            })
            .await
        else {
            unreachable!()
        };
        assert_eq!(suggestions[0].original_text, "Teh");
        assert_eq!(h.grammar.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn renaming_updates_the_stored_title() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        let doc = h.db.insert(h.user_id, "hello");
        h.open(doc).await;

        h.send(ClientMessage::Rename {
            title: Some("Morning pages".to_string()),
        })
        .await;
        let renamed = h
            .expect("renamed", |m| matches!(m, ServerMessage::DocumentRenamed { .. }))
            .await;
        assert_eq!(
            renamed,
            ServerMessage::DocumentRenamed {
                document_id: doc,
                title: Some("Morning pages".to_string()),
            }
        );
        assert_eq!(
            h.db.documents.lock().unwrap()[&doc].title.as_deref(),
            Some("Morning pages")
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn renaming_without_an_open_document_is_an_error() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        h.send(ClientMessage::Rename {
            title: Some("Nothing open".to_string()),
        })
        .await;
        let message = h.expect("error", |m| matches!(m, ServerMessage::Error { .. })).await;
        assert_eq!(
            message,
            ServerMessage::Error {
                message: "No document is open.".to_string()
            }
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn closing_flushes_unsaved_text() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        let doc = h.db.insert(h.user_id, "");
        h.open(doc).await;

        h.send(ClientMessage::Edit {
            content: "hello world".to_string(),
        })
        .await;
        h.send(ClientMessage::Close).await;
        let closed = h
            .expect("closed", |m| matches!(m, ServerMessage::DocumentClosed { .. }))
            .await;
        assert_eq!(closed, ServerMessage::DocumentClosed { document_id: doc });
        assert_eq!(h.db.content(doc), "hello world");
        assert_eq!(h.grammar.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn unknown_personas_are_reported() {
        let mut h = Harness::start(FakeGrammar::default(), default_timeout());
        h.send(ClientMessage::SelectPersona {
            persona: "twitter_unknown".to_string(),
        })
        .await;
        let message = h.expect("error", |m| matches!(m, ServerMessage::Error { .. })).await;
        assert!(matches!(message, ServerMessage::Error { message } if message.contains("twitter_unknown")));

        h.token.cancel();
        h.handle.await.unwrap();
    }
}
