//! crates/writing_assistant_core/src/scheduler.rs
//!
//! Decides *when* analysis runs, given a high-frequency stream of buffer edits.
//!
//! Two independent trailing-edge debounce timers (a short grammar window and a
//! longer persona idle window) are restarted on every edit. Each pipeline has
//! an in-flight flag; a trigger that arrives while its pipeline is busy is
//! dropped, not queued, because the next idle period will capture the latest
//! buffer anyway. Deferred follow-up work (the save and re-analysis after an
//! accept, periodic autosave) lives on the same scheduler so that teardown
//! clears it and callers can drive it deterministically.
//!
//! Nothing here sleeps. The owner asks for [`AnalysisScheduler::next_deadline`],
//! waits until then, and calls [`AnalysisScheduler::poll`].

use crate::persona::PersonaType;
use crate::session::{DocumentSession, SessionTicket};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub grammar_debounce: Duration,
    pub persona_idle: Duration,
    pub save_after_accept: Duration,
    pub reanalysis_after_accept: Duration,
    pub autosave_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grammar_debounce: Duration::from_millis(500),
            persona_idle: Duration::from_millis(3000),
            save_after_accept: Duration::from_millis(500),
            reanalysis_after_accept: Duration::from_millis(1000),
            autosave_interval: Duration::from_secs(10),
        }
    }
}

/// A cancellable one-shot deadline. Re-arming replaces the previous deadline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTimer {
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarms the timer and returns `true` if its deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    Grammar,
    Persona,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Save,
    GrammarPass,
}

/// Work the scheduler wants started now. Analysis jobs carry the buffer as it
/// is when the job is created, not as it was when the timer was armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Grammar {
        ticket: SessionTicket,
        text: String,
    },
    Persona {
        ticket: SessionTicket,
        text: String,
        persona: PersonaType,
    },
    Save {
        ticket: SessionTicket,
    },
}

#[derive(Debug)]
pub struct AnalysisScheduler {
    config: SchedulerConfig,
    grammar_timer: DebounceTimer,
    persona_timer: DebounceTimer,
    autosave_timer: DebounceTimer,
    follow_ups: Vec<(Instant, FollowUp)>,
    grammar_in_flight: bool,
    persona_in_flight: bool,
}

impl AnalysisScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            grammar_timer: DebounceTimer::default(),
            persona_timer: DebounceTimer::default(),
            autosave_timer: DebounceTimer::default(),
            follow_ups: Vec::new(),
            grammar_in_flight: false,
            persona_in_flight: false,
        }
    }

    /// Restarts both debounce windows.
    pub fn on_buffer_changed(&mut self, now: Instant) {
        self.grammar_timer.arm(now, self.config.grammar_debounce);
        self.persona_timer.arm(now, self.config.persona_idle);
    }

    /// Starts the periodic autosave check for a freshly opened document.
    pub fn start_autosave(&mut self, now: Instant) {
        self.autosave_timer.arm(now, self.config.autosave_interval);
    }

    /// Enqueues the save and grammar pass that follow an accepted suggestion.
    pub fn schedule_after_accept(&mut self, now: Instant) {
        self.follow_ups
            .push((now + self.config.save_after_accept, FollowUp::Save));
        self.follow_ups
            .push((now + self.config.reanalysis_after_accept, FollowUp::GrammarPass));
    }

    /// The earliest moment at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.grammar_timer.deadline(),
            self.persona_timer.deadline(),
            self.autosave_timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .chain(self.follow_ups.iter().map(|(at, _)| *at))
        .min()
    }

    /// Fires every timer and follow-up that is due at `now`.
    pub fn poll(&mut self, now: Instant, session: &DocumentSession) -> Vec<Job> {
        let mut jobs = Vec::new();

        let mut due = Vec::new();
        self.follow_ups.retain(|&(at, follow_up)| {
            if at <= now {
                due.push((at, follow_up));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        for (_, follow_up) in due {
            match follow_up {
                FollowUp::Save => jobs.extend(session.ticket().map(|ticket| Job::Save { ticket })),
                FollowUp::GrammarPass => jobs.extend(self.request_grammar(session)),
            }
        }

        if self.grammar_timer.fire(now) {
            jobs.extend(self.request_grammar(session));
        }
        if self.persona_timer.fire(now) {
            jobs.extend(self.request_persona(session));
        }
        if self.autosave_timer.fire(now) && session.is_open() {
            self.autosave_timer.arm(now, self.config.autosave_interval);
            if session.is_dirty() {
                jobs.extend(session.ticket().map(|ticket| Job::Save { ticket }));
            }
        }

        jobs
    }

    /// Starts a grammar pass over the current buffer unless one is already
    /// running, the buffer is blank, or no document is open.
    pub fn request_grammar(&mut self, session: &DocumentSession) -> Option<Job> {
        let ticket = self.guard(Pipeline::Grammar, session)?;
        self.grammar_in_flight = true;
        Some(Job::Grammar {
            ticket,
            text: session.buffer().to_string(),
        })
    }

    /// Persona counterpart of [`request_grammar`](Self::request_grammar). Also
    /// called directly when the user switches persona, bypassing the idle timer.
    pub fn request_persona(&mut self, session: &DocumentSession) -> Option<Job> {
        let ticket = self.guard(Pipeline::Persona, session)?;
        self.persona_in_flight = true;
        Some(Job::Persona {
            ticket,
            text: session.buffer().to_string(),
            persona: session.active_persona(),
        })
    }

    fn guard(&self, pipeline: Pipeline, session: &DocumentSession) -> Option<SessionTicket> {
        if self.is_in_flight(pipeline) {
            debug!(?pipeline, "analysis already in flight, trigger dropped");
            return None;
        }
        if !session.has_content() {
            return None;
        }
        session.ticket()
    }

    pub fn finish(&mut self, pipeline: Pipeline) {
        match pipeline {
            Pipeline::Grammar => self.grammar_in_flight = false,
            Pipeline::Persona => self.persona_in_flight = false,
        }
    }

    pub fn is_in_flight(&self, pipeline: Pipeline) -> bool {
        match pipeline {
            Pipeline::Grammar => self.grammar_in_flight,
            Pipeline::Persona => self.persona_in_flight,
        }
    }

    /// Clears every armed timer and pending follow-up, and forgets in-flight
    /// calls. Results of those calls are discarded by the session's ticket check.
    pub fn teardown(&mut self) {
        self.grammar_timer.cancel();
        self.persona_timer.cancel();
        self.autosave_timer.cancel();
        self.follow_ups.clear();
        self.grammar_in_flight = false;
        self.persona_in_flight = false;
    }
}
