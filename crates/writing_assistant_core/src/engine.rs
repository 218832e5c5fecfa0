//! crates/writing_assistant_core/src/engine.rs
//!
//! Ties the session store, the reconciler and the scheduler together behind one
//! API. Every operation mutates the in-memory state synchronously and returns
//! the I/O it wants performed as [`Effect`]s; the owner runs them and reports
//! results back through the `complete_*` methods. Time is always passed in, so
//! the whole engine can be driven without a runtime.

use crate::domain::{Document, PersonaOutput, Suggestion, SuggestionStatus};
use crate::persona::PersonaType;
use crate::reconciler::{self, AcceptOutcome};
use crate::scheduler::{AnalysisScheduler, Job, Pipeline, SchedulerConfig};
use crate::session::{DocumentSession, SessionTicket};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write a suggestion's terminal status to storage. Fire-and-forget.
    PersistStatus {
        suggestion_id: Uuid,
        status: SuggestionStatus,
        user_feedback: Option<String>,
    },
    AnalyzeGrammar {
        ticket: SessionTicket,
        text: String,
    },
    AnalyzePersona {
        ticket: SessionTicket,
        text: String,
        persona: PersonaType,
    },
    /// Persist `content` as the document's text. Report back with `complete_save`.
    Save {
        ticket: SessionTicket,
        content: String,
    },
}

impl Effect {
    fn persist(suggestion: &Suggestion) -> Self {
        Self::PersistStatus {
            suggestion_id: suggestion.id,
            status: suggestion.status,
            user_feedback: suggestion.user_feedback.clone(),
        }
    }
}

#[derive(Debug)]
pub struct EditorEngine {
    session: DocumentSession,
    scheduler: AnalysisScheduler,
}

impl EditorEngine {
    pub fn new(config: SchedulerConfig, persona: PersonaType) -> Self {
        Self {
            session: DocumentSession::new(persona),
            scheduler: AnalysisScheduler::new(config),
        }
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Opens `document` with its persisted pending suggestions, replacing any
    /// document already open.
    pub fn open(&mut self, now: Instant, document: Document, pending: Vec<Suggestion>) -> Vec<Effect> {
        self.scheduler.teardown();
        let (ticket, rejected) = reconciler::load(&mut self.session, document, pending);
        self.scheduler.start_autosave(now);

        info!(
            document_id = %ticket.document_id,
            live = self.session.suggestions().len(),
            rejected = rejected.len(),
            "document opened"
        );
        rejected.iter().map(Effect::persist).collect()
    }

    /// Ends the editing session: clears all timers and follow-ups. Calls still
    /// in flight are left to finish; their results will not match any ticket.
    pub fn close(&mut self) {
        self.scheduler.teardown();
        if let Some(id) = self.session.document_id() {
            info!(document_id = %id, "document closed");
        }
        self.session.close();
    }

    /// Applies text typed by the user: invalidates every pending suggestion and
    /// restarts both debounce windows.
    pub fn edit(&mut self, now: Instant, text: String) -> Vec<Effect> {
        if !self.session.is_open() {
            return Vec::new();
        }
        let Some(invalidated) = reconciler::apply_edit(&mut self.session, text) else {
            return Vec::new();
        };
        self.scheduler.on_buffer_changed(now);
        invalidated.iter().map(Effect::persist).collect()
    }

    pub fn accept(&mut self, now: Instant, suggestion_id: Uuid) -> Vec<Effect> {
        let Some(outcome) = reconciler::accept(&mut self.session, suggestion_id) else {
            debug!(%suggestion_id, "accept for unknown suggestion ignored");
            return Vec::new();
        };
        if let AcceptOutcome::Applied { ref rejected, .. } = outcome {
            info!(%suggestion_id, discarded = rejected.len(), "suggestion accepted");
            self.scheduler.schedule_after_accept(now);
        } else {
            warn!(%suggestion_id, "suggestion no longer matches the buffer, rejected instead");
        }
        outcome.resolved().into_iter().map(Effect::persist).collect()
    }

    pub fn reject(&mut self, suggestion_id: Uuid, user_feedback: Option<String>) -> Vec<Effect> {
        let Some(mut rejected) = reconciler::reject(&mut self.session, suggestion_id) else {
            return Vec::new();
        };
        rejected.user_feedback = user_feedback;
        vec![Effect::persist(&rejected)]
    }

    /// Switches persona. A real switch with a document open triggers a persona
    /// pass immediately, without waiting for the idle window.
    pub fn select_persona(&mut self, persona: PersonaType) -> Vec<Effect> {
        if !self.session.set_active_persona(persona) {
            return Vec::new();
        }
        let Some(job) = self.scheduler.request_persona(&self.session) else {
            return Vec::new();
        };
        self.run(job).into_iter().collect()
    }

    /// Saves the buffer now, unless a save is already running.
    pub fn save(&mut self) -> Vec<Effect> {
        match self.session.ticket() {
            Some(ticket) => self.run(Job::Save { ticket }).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Fires everything the scheduler has due at `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        self.scheduler
            .poll(now, &self.session)
            .into_iter()
            .filter_map(|job| self.run(job))
            .collect()
    }

    fn run(&mut self, job: Job) -> Option<Effect> {
        match job {
            Job::Grammar { ticket, text } => Some(Effect::AnalyzeGrammar { ticket, text }),
            Job::Persona { ticket, text, persona } => Some(Effect::AnalyzePersona { ticket, text, persona }),
            Job::Save { ticket } => {
                if !self.session.begin_save() {
                    debug!("save already in progress, skipped");
                    return None;
                }
                Some(Effect::Save {
                    ticket,
                    content: self.session.buffer().to_string(),
                })
            }
        }
    }

    /// Merges the result of a grammar pass. Returns `false` when the result was
    /// discarded because the document was closed or reopened meanwhile.
    pub fn complete_grammar(&mut self, ticket: SessionTicket, suggestions: Vec<Suggestion>) -> bool {
        if !self.session.is_current(ticket) {
            warn!(document_id = %ticket.document_id, "discarding stale grammar result");
            return false;
        }
        self.scheduler.finish(Pipeline::Grammar);
        let added = reconciler::merge(&mut self.session, suggestions);
        debug!(added, live = self.session.suggestions().len(), "grammar suggestions merged");
        true
    }

    /// Applies the result of a persona pass; `None` means the pass failed.
    pub fn complete_persona(&mut self, ticket: SessionTicket, output: Option<PersonaOutput>) -> bool {
        if !self.session.is_current(ticket) {
            warn!(document_id = %ticket.document_id, "discarding stale persona result");
            return false;
        }
        self.scheduler.finish(Pipeline::Persona);
        output.is_some_and(|output| self.session.set_persona_output(output))
    }

    /// Records the outcome of a save; `None` means it failed.
    pub fn complete_save(&mut self, ticket: SessionTicket, saved: Option<Document>) {
        if !self.session.is_current(ticket) {
            return;
        }
        self.session.finish_save(saved);
    }

    /// Applies a title change made through another channel to the open document.
    pub fn rename(&mut self, document_id: Uuid, title: Option<String>) {
        self.session.rename(document_id, title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PersonaAnalysis, PersonaOutputKind, ProposedSuggestion, SuggestionKind, TextRange};
    use crate::session::tests::document;
    use std::time::Duration;

    fn engine() -> EditorEngine {
        EditorEngine::new(SchedulerConfig::default(), PersonaType::TwitterNaval)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn spelling(doc_id: Uuid, start: usize, end: usize, original: &str, fix: &str) -> Suggestion {
        ProposedSuggestion {
            kind: SuggestionKind::Spelling,
            range: TextRange::new(start, end),
            original_text: original.to_string(),
            replacement_text: fix.to_string(),
            explanation: "spelling".to_string(),
        }
        .into_suggestion(doc_id)
    }

    fn statuses(effects: &[Effect]) -> Vec<(Uuid, SuggestionStatus)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::PersistStatus { suggestion_id, status, .. } => Some((*suggestion_id, *status)),
                _ => None,
            })
            .collect()
    }

    fn grammar_ticket(effects: &[Effect]) -> Option<SessionTicket> {
        effects.iter().find_map(|effect| match effect {
            Effect::AnalyzeGrammar { ticket, .. } => Some(*ticket),
            _ => None,
        })
    }

    #[test]
    fn grammar_result_flows_into_the_live_set_and_accept_rewrites_the_buffer() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("");
        engine.open(t0, doc.clone(), Vec::new());

        engine.edit(t0, "Teh cat sat.".to_string());
        let effects = engine.poll(t0 + ms(500));
        let ticket = grammar_ticket(&effects).expect("grammar pass should fire");

        let fix = spelling(doc.id, 0, 3, "Teh", "The");
        assert!(engine.complete_grammar(ticket, vec![fix.clone()]));
        assert_eq!(engine.session().suggestions().len(), 1);

        let effects = engine.accept(t0 + ms(600), fix.id);
        assert_eq!(statuses(&effects), vec![(fix.id, SuggestionStatus::Accepted)]);
        assert_eq!(engine.session().buffer(), "The cat sat.");
        assert!(engine.session().suggestions().is_empty());
    }

    #[test]
    fn accept_rejects_untouched_suggestions_and_schedules_follow_ups() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("Teh cat sat on teh mat.");
        let a = spelling(doc.id, 0, 3, "Teh", "The");
        let b = spelling(doc.id, 15, 18, "teh", "the");
        engine.open(t0, doc, vec![a.clone(), b.clone()]);

        let effects = engine.accept(t0, a.id);
        assert_eq!(
            statuses(&effects),
            vec![(a.id, SuggestionStatus::Accepted), (b.id, SuggestionStatus::Rejected)]
        );
        assert!(engine.session().suggestions().is_empty());

        let save = engine.poll(t0 + ms(500));
        assert!(matches!(save.as_slice(), [Effect::Save { content, .. }] if content == "The cat sat on teh mat."));
        let reanalysis = engine.poll(t0 + ms(1000));
        assert!(grammar_ticket(&reanalysis).is_some());
    }

    #[test]
    fn duplicate_findings_from_two_passes_merge_into_one() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("The cat sat.");
        let ticket = {
            engine.open(t0, doc.clone(), Vec::new());
            engine.session().ticket().unwrap()
        };

        assert!(engine.complete_grammar(ticket, vec![spelling(doc.id, 4, 7, "cat", "dog")]));
        assert!(engine.complete_grammar(ticket, vec![spelling(doc.id, 4, 7, "cat", "dog")]));
        assert_eq!(engine.session().suggestions().len(), 1);
    }

    #[test]
    fn open_rejects_stale_persisted_suggestions() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("The cat sat.");
        let stale = spelling(doc.id, 0, 3, "Teh", "The");
        let valid = spelling(doc.id, 4, 7, "cat", "dog");

        let effects = engine.open(t0, doc, vec![stale.clone(), valid.clone()]);

        assert_eq!(statuses(&effects), vec![(stale.id, SuggestionStatus::Rejected)]);
        assert_eq!(engine.session().suggestions(), &[valid]);
    }

    #[test]
    fn typing_invalidates_pending_suggestions_before_rearming() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("The cat sat.");
        let s = spelling(doc.id, 4, 7, "cat", "dog");
        engine.open(t0, doc, vec![s.clone()]);

        let effects = engine.edit(t0, "The cat sat down.".to_string());

        assert_eq!(statuses(&effects), vec![(s.id, SuggestionStatus::Rejected)]);
        assert_eq!(engine.next_deadline(), Some(t0 + ms(500)));
    }

    #[test]
    fn reject_carries_user_feedback() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("The cat sat.");
        let s = spelling(doc.id, 4, 7, "cat", "dog");
        engine.open(t0, doc, vec![s.clone()]);

        let effects = engine.reject(s.id, Some("I like cats".to_string()));

        assert_eq!(
            effects,
            vec![Effect::PersistStatus {
                suggestion_id: s.id,
                status: SuggestionStatus::Rejected,
                user_feedback: Some("I like cats".to_string()),
            }]
        );
        assert!(engine.session().suggestions().is_empty());
    }

    #[test]
    fn switching_persona_analyzes_immediately() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.open(t0, document("Today I shipped."), Vec::new());

        let effects = engine.select_persona(PersonaType::Animus);
        assert!(matches!(
            effects.as_slice(),
            [Effect::AnalyzePersona { persona: PersonaType::Animus, .. }]
        ));

        // already in flight: the next switch is dropped
        assert!(engine.select_persona(PersonaType::Anima).is_empty());
        // same persona is not a switch
        assert!(engine.select_persona(PersonaType::Anima).is_empty());
    }

    #[test]
    fn switching_persona_without_content_does_nothing() {
        let t0 = Instant::now();
        let mut engine = engine();
        assert!(engine.select_persona(PersonaType::Animus).is_empty());

        engine.open(t0, document("   "), Vec::new());
        assert!(engine.select_persona(PersonaType::Anima).is_empty());
    }

    #[test]
    fn results_for_a_closed_or_reopened_document_are_discarded() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("Some text.");
        engine.open(t0, doc.clone(), Vec::new());
        let effects = engine.select_persona(PersonaType::Anima);
        let Some(Effect::AnalyzePersona { ticket, .. }) = effects.first().cloned() else {
            panic!("expected a persona pass");
        };

        engine.close();
        engine.open(t0, doc.clone(), Vec::new());

        let output = PersonaOutput::from_analysis(
            doc.id,
            PersonaType::Anima,
            PersonaAnalysis {
                content: "late".to_string(),
                kind: PersonaOutputKind::Insight,
                reasoning: None,
            },
        );
        assert!(!engine.complete_persona(ticket, Some(output)));
        assert!(engine.session().persona_output().is_none());
        assert!(!engine.complete_grammar(ticket, vec![spelling(doc.id, 0, 4, "Some", "Any")]));
        assert!(engine.session().suggestions().is_empty());
    }

    #[test]
    fn failed_analysis_frees_the_pipeline() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.open(t0, document("Some text."), Vec::new());
        let ticket = engine.session().ticket().unwrap();

        engine.edit(t0, "Some text!".to_string());
        assert!(grammar_ticket(&engine.poll(t0 + ms(500))).is_some());
        assert!(engine.scheduler().is_in_flight(Pipeline::Grammar));

        assert!(engine.complete_grammar(ticket, Vec::new()));
        assert!(!engine.scheduler().is_in_flight(Pipeline::Grammar));
    }

    #[test]
    fn manual_save_is_single_flight() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("v1");
        engine.open(t0, doc.clone(), Vec::new());
        engine.edit(t0, "v2".to_string());

        let effects = engine.save();
        let Some(Effect::Save { ticket, content }) = effects.first().cloned() else {
            panic!("expected a save");
        };
        assert_eq!(content, "v2");
        assert!(engine.save().is_empty());

        let mut saved = doc;
        saved.content = content;
        engine.complete_save(ticket, Some(saved));
        assert!(!engine.session().is_dirty());
        assert!(engine.session().last_saved().is_some());
    }

    #[test]
    fn renaming_updates_the_open_snapshot_only() {
        let t0 = Instant::now();
        let mut engine = engine();
        let doc = document("hello");
        engine.open(t0, doc.clone(), Vec::new());

        engine.rename(Uuid::new_v4(), Some("Elsewhere".to_string()));
        assert_eq!(engine.session().document().and_then(|d| d.title.clone()), doc.title);

        engine.rename(doc.id, Some("Morning pages".to_string()));
        assert_eq!(
            engine.session().document().and_then(|d| d.title.as_deref()),
            Some("Morning pages")
        );
    }
}
