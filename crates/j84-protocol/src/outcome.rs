use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Verdict attached to a single observation made by a test step.
///
/// Variants are declared in ascending severity so the derived `Ord` gives
/// `Abort > Fail > Warn > Incomplete > Pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Incomplete,
    Warn,
    Fail,
    Abort,
}

impl Outcome {
    /// All outcomes, most severe last.
    pub const ALL: [Outcome; 5] = [
        Outcome::Pass,
        Outcome::Incomplete,
        Outcome::Warn,
        Outcome::Fail,
        Outcome::Abort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Incomplete => "INCOMPLETE",
            Outcome::Warn => "WARN",
            Outcome::Fail => "FAIL",
            Outcome::Abort => "ABORT",
        }
    }

    /// Most severe outcome of the sequence, or `Pass` when empty.
    pub fn worst<I: IntoIterator<Item = Outcome>>(outcomes: I) -> Outcome {
        outcomes.into_iter().max().unwrap_or(Outcome::Pass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown outcome keyword.
#[derive(Debug, thiserror::Error)]
#[error("unknown outcome: {0}")]
pub struct ParseOutcomeError(pub String);

impl FromStr for Outcome {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PASS" => Ok(Outcome::Pass),
            "INCOMPLETE" => Ok(Outcome::Incomplete),
            "WARN" => Ok(Outcome::Warn),
            "FAIL" => Ok(Outcome::Fail),
            "ABORT" => Ok(Outcome::Abort),
            _ => Err(ParseOutcomeError(s.to_string())),
        }
    }
}

/// A structured outcome tagged with the part and step that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub part: u8,
    pub step: u8,
    pub outcome: Outcome,
    pub message: String,
}

impl ActionOutcome {
    pub fn new(part: u8, step: u8, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            part,
            step,
            outcome,
            message: message.into(),
        }
    }

    /// Transcript form, e.g. `FAIL: 6.3.7.2.b - ...`.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.outcome, self.message)
    }
}
