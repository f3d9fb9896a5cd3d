//! Listener that writes the run transcript to the report file.
//!
//! Lines are appended with a time stamp and echoed to stdout. Questions are
//! answered from stdin unless an automatic answer is configured.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use j84_canbus::{CancelToken, Clock};

use super::{Answer, MessageKind, ResultsListener};

/// Operator input, read one line per question.
type AnswerLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

pub struct ReportListener {
    file: Mutex<File>,
    answers: tokio::sync::Mutex<AnswerLines>,
    clock: Arc<dyn Clock>,
    auto_answer: Option<Answer>,
    cancel: CancelToken,
    echo: bool,
}

impl ReportListener {
    /// Open `path` for appending, creating it when missing.
    pub fn create(
        path: &Path,
        clock: Arc<dyn Clock>,
        auto_answer: Option<Answer>,
        cancel: CancelToken,
    ) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::info!(path = %path.display(), "report file opened");
        Ok(Self {
            file: Mutex::new(file),
            answers: tokio::sync::Mutex::new(answer_lines(tokio::io::stdin())),
            clock,
            auto_answer,
            cancel,
            echo: true,
        })
    }

    /// Disable printing lines to stdout.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Read answers from `input` instead of stdin.
    pub fn with_answers(self, input: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            answers: tokio::sync::Mutex::new(answer_lines(input)),
            ..self
        }
    }

    fn write_line(&self, line: &str) {
        let stamped = format!("{} {line}", self.clock.now().format("%Y-%m-%dT%H:%M:%S%.3fZ"));
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{stamped}") {
            tracing::warn!(error = %e, "failed to write report line");
        }
        if self.echo {
            println!("{line}");
        }
    }

    async fn ask_operator(&self) -> Answer {
        if self.echo {
            println!("[y]es / [n]o / [c]ancel?");
        }
        let mut lines = self.answers.lock().await;
        let line = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Answer::Cancel,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(text)) => parse_answer(&text),
            Ok(None) => Answer::Cancel,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read answer from stdin");
                Answer::Cancel
            }
        }
    }
}

fn answer_lines(input: impl AsyncRead + Send + Unpin + 'static) -> AnswerLines {
    let input: Box<dyn AsyncRead + Send + Unpin> = Box::new(input);
    BufReader::new(input).lines()
}

fn parse_answer(text: &str) -> Answer {
    match text.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "n" | "no" => Answer::No,
        _ => Answer::Cancel,
    }
}

#[async_trait]
impl ResultsListener for ReportListener {
    fn on_progress(&self, current: u32, total: u32, message: &str) {
        tracing::info!(current, total, "{message}");
    }

    fn on_result(&self, line: &str) {
        self.write_line(line);
    }

    fn on_milestone(&self, text: &str) {
        self.write_line(text);
    }

    async fn on_urgent_message(&self, text: &str, title: &str, kind: MessageKind) -> Answer {
        self.write_line(&format!("{kind}: {title}"));
        for line in text.lines() {
            self.write_line(line);
        }
        if kind != MessageKind::Question {
            return Answer::Yes;
        }
        let answer = match self.auto_answer {
            Some(answer) => answer,
            None => self.ask_operator().await,
        };
        self.write_line(&format!("Answer: {answer:?}"));
        answer
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
