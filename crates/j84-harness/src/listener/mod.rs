//! Results listener: the one-way sink for progress, transcript lines,
//! structured outcomes and urgent operator prompts.

mod recording;
mod report;

pub use recording::{RecordedEvent, RecordingListener};
pub use report::ReportListener;

use std::fmt;

use async_trait::async_trait;
use j84_protocol::ActionOutcome;

/// Severity of an urgent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warning,
    Question,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Info => "INFO",
            MessageKind::Warning => "WARNING",
            MessageKind::Question => "QUESTION",
            MessageKind::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Operator answer to an urgent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

#[async_trait]
pub trait ResultsListener: Send + Sync {
    /// Progress of the running part or step.
    fn on_progress(&self, current: u32, total: u32, message: &str);

    /// Append one line to the transcript.
    fn on_result(&self, line: &str);

    /// Part and step banners. Not part of the transcript.
    fn on_milestone(&self, _text: &str) {}

    /// Show a message and wait for the operator.
    ///
    /// Non-question messages are acknowledged with `Yes`.
    async fn on_urgent_message(&self, text: &str, title: &str, kind: MessageKind) -> Answer;

    /// Record a structured outcome; the transcript gets `KIND: message`.
    fn add_outcome(&self, outcome: &ActionOutcome) {
        self.on_result(&outcome.transcript_line());
    }

    /// Operator-requested cancellation, polled at every suspension point.
    fn is_cancelled(&self) -> bool {
        false
    }
}
