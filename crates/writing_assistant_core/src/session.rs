//! crates/writing_assistant_core/src/session.rs
//!
//! The single mutable state container for one editing session: the open
//! document, its unsaved buffer, the live suggestion set and the latest
//! persona output. Suggestion state only changes through `reconciler`.

use crate::domain::{Document, PersonaOutput, Suggestion};
use crate::persona::PersonaType;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifies the document and the open of it that an analysis request was
/// issued for. Reopening the same document yields a different ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionTicket {
    pub document_id: Uuid,
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct DocumentSession {
    document: Option<Document>,
    buffer: String,
    pub(crate) suggestions: Vec<Suggestion>,
    persona_output: Option<PersonaOutput>,
    active_persona: PersonaType,
    epoch: u64,
    is_saving: bool,
    last_saved: Option<DateTime<Utc>>,
}

impl DocumentSession {
    pub fn new(active_persona: PersonaType) -> Self {
        Self {
            active_persona,
            ..Self::default()
        }
    }

    /// Makes `document` the open document. The buffer starts from its persisted
    /// content and all per-document state is cleared.
    pub(crate) fn open(&mut self, document: Document) -> SessionTicket {
        self.epoch += 1;
        let ticket = SessionTicket {
            document_id: document.id,
            epoch: self.epoch,
        };
        self.buffer = document.content.clone();
        self.document = Some(document);
        self.suggestions.clear();
        self.persona_output = None;
        self.is_saving = false;
        self.last_saved = None;
        ticket
    }

    /// Closes the open document, if any. Pending suggestions are returned
    /// untouched: they stay pending in storage and are revalidated on the next open.
    pub fn close(&mut self) -> Vec<Suggestion> {
        self.epoch += 1;
        self.document = None;
        self.buffer.clear();
        self.persona_output = None;
        self.is_saving = false;
        std::mem::take(&mut self.suggestions)
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.document.as_ref().map(|d| d.id)
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn ticket(&self) -> Option<SessionTicket> {
        self.document_id().map(|document_id| SessionTicket {
            document_id,
            epoch: self.epoch,
        })
    }

    /// The stale-response guard: `true` only if `ticket` was issued for the
    /// currently open document during the current open.
    pub fn is_current(&self, ticket: SessionTicket) -> bool {
        self.ticket() == Some(ticket)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub(crate) fn set_buffer(&mut self, text: String) {
        self.buffer = text;
    }

    pub fn has_content(&self) -> bool {
        !self.buffer.trim().is_empty()
    }

    /// `true` when the buffer has diverged from the last persisted content.
    pub fn is_dirty(&self) -> bool {
        self.document
            .as_ref()
            .is_some_and(|d| d.content != self.buffer)
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn persona_output(&self) -> Option<&PersonaOutput> {
        self.persona_output.as_ref()
    }

    /// Replaces the persona output wholesale. Ignored when it belongs to another
    /// document or persona than the one now active.
    pub fn set_persona_output(&mut self, output: PersonaOutput) -> bool {
        if self.document_id() != Some(output.document_id) || output.persona != self.active_persona {
            return false;
        }
        self.persona_output = Some(output);
        true
    }

    pub fn active_persona(&self) -> PersonaType {
        self.active_persona
    }

    /// Switches persona. Returns `false` when it was already active.
    pub fn set_active_persona(&mut self, persona: PersonaType) -> bool {
        if self.active_persona == persona {
            return false;
        }
        self.active_persona = persona;
        self.persona_output = None;
        true
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    /// Marks a save as started. Returns `false` if one is already running or
    /// no document is open.
    pub fn begin_save(&mut self) -> bool {
        if self.is_saving || self.document.is_none() {
            return false;
        }
        self.is_saving = true;
        true
    }

    /// Records the outcome of a save. `saved` is the document as persisted; it is
    /// ignored if a different document has been opened in the meantime.
    pub fn finish_save(&mut self, saved: Option<Document>) {
        self.is_saving = false;
        let Some(saved) = saved else {
            return;
        };
        if self.document_id() == Some(saved.id) {
            self.last_saved = Some(saved.updated_at);
            self.document = Some(saved);
        }
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Applies a title change made outside the editor to the open document.
    pub fn rename(&mut self, document_id: Uuid, title: Option<String>) {
        if let Some(doc) = self.document.as_mut().filter(|d| d.id == document_id) {
            doc.title = title;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::count_words;

    pub(crate) fn document(content: &str) -> Document {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: Some("Draft".to_string()),
            content: content.to_string(),
            word_count: count_words(content),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reopening_the_same_document_issues_a_new_ticket() {
        let doc = document("hello");
        let mut session = DocumentSession::default();

        let first = session.open(doc.clone());
        assert!(session.is_current(first));

        session.close();
        assert!(!session.is_current(first));

        let second = session.open(doc);
        assert_eq!(first.document_id, second.document_id);
        assert!(!session.is_current(first));
        assert!(session.is_current(second));
    }

    #[test]
    fn dirty_tracks_divergence_from_persisted_content() {
        let mut session = DocumentSession::default();
        session.open(document("hello"));
        assert!(!session.is_dirty());

        session.set_buffer("hello world".to_string());
        assert!(session.is_dirty());
    }

    #[test]
    fn only_one_save_runs_at_a_time() {
        let mut session = DocumentSession::default();
        assert!(!session.begin_save());

        let doc = document("a");
        session.open(doc.clone());
        assert!(session.begin_save());
        assert!(!session.begin_save());

        session.finish_save(Some(doc));
        assert!(!session.is_saving());
        assert!(session.last_saved().is_some());
    }

    #[test]
    fn persona_output_for_another_persona_is_ignored() {
        let doc = document("text");
        let mut session = DocumentSession::new(PersonaType::Anima);
        session.open(doc.clone());

        let output = PersonaOutput::from_analysis(
            doc.id,
            PersonaType::Animus,
            crate::domain::PersonaAnalysis {
                content: "keep going".to_string(),
                kind: crate::domain::PersonaOutputKind::Encouragement,
                reasoning: None,
            },
        );
        assert!(!session.set_persona_output(output.clone()));

        session.set_active_persona(PersonaType::Animus);
        assert!(session.set_persona_output(output));
        assert!(session.persona_output().is_some());
    }
}
