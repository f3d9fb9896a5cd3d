//! Listener that records everything it receives, for assertions in tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use j84_protocol::ActionOutcome;

use super::{Answer, MessageKind, ResultsListener};

/// One listener call, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Progress { current: u32, total: u32, message: String },
    Result(String),
    Milestone(String),
    Urgent { title: String, text: String, kind: MessageKind },
    Outcome(ActionOutcome),
}

/// In-memory listener with scripted answers.
///
/// Unscripted questions are answered `Yes`.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RecordedEvent>>,
    answers: Mutex<VecDeque<Answer>>,
    cancelled: AtomicBool,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next question with `answer`.
    pub fn push_answer(&self, answer: Answer) {
        self.answers.lock().unwrap_or_else(PoisonError::into_inner).push_back(answer);
    }

    pub fn set_cancelled(&self, cancelled: bool) {
        self.cancelled.store(cancelled, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Urgent message texts, one per line.
    pub fn messages(&self) -> String {
        self.collect(|e| match e {
            RecordedEvent::Urgent { text, .. } => Some(text.clone()),
            _ => None,
        })
    }

    /// Part and step banners, one per line.
    pub fn milestones(&self) -> String {
        self.collect(|e| match e {
            RecordedEvent::Milestone(text) => Some(text.clone()),
            _ => None,
        })
    }

    /// The transcript: every result line followed by a newline.
    pub fn results(&self) -> String {
        self.collect(|e| match e {
            RecordedEvent::Result(line) => Some(line.clone()),
            _ => None,
        })
    }

    pub fn progress(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Progress { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn outcomes(&self) -> Vec<ActionOutcome> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Outcome(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    fn collect(&self, pick: impl Fn(&RecordedEvent) -> Option<String>) -> String {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(pick)
            .map(|line| line + "\n")
            .collect()
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

#[async_trait]
impl ResultsListener for RecordingListener {
    fn on_progress(&self, current: u32, total: u32, message: &str) {
        self.record(RecordedEvent::Progress {
            current,
            total,
            message: message.to_string(),
        });
    }

    fn on_result(&self, line: &str) {
        self.record(RecordedEvent::Result(line.to_string()));
    }

    fn on_milestone(&self, text: &str) {
        self.record(RecordedEvent::Milestone(text.to_string()));
    }

    async fn on_urgent_message(&self, text: &str, title: &str, kind: MessageKind) -> Answer {
        self.record(RecordedEvent::Urgent {
            title: title.to_string(),
            text: text.to_string(),
            kind,
        });
        if kind != MessageKind::Question {
            return Answer::Yes;
        }
        self.answers.lock().unwrap_or_else(PoisonError::into_inner).pop_front().unwrap_or(Answer::Yes)
    }

    fn add_outcome(&self, outcome: &ActionOutcome) {
        self.record(RecordedEvent::Outcome(outcome.clone()));
        self.on_result(&outcome.transcript_line());
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
