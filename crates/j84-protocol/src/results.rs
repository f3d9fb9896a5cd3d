//! Accumulated part and step results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::outcome::{ActionOutcome, Outcome};

/// Lifecycle of a step or part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Pending,
    Running,
    Completed,
    Aborted,
    FailedUnexpected,
}

impl ExecutionState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Aborted | ExecutionState::FailedUnexpected
        )
    }
}

/// Outcomes recorded for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub part: u8,
    pub step: u8,
    pub name: String,
    pub state: ExecutionState,
    pub outcomes: Vec<ActionOutcome>,
}

impl StepResult {
    pub fn new(part: u8, step: u8, name: impl Into<String>) -> Self {
        Self {
            part,
            step,
            name: name.into(),
            state: ExecutionState::Pending,
            outcomes: Vec::new(),
        }
    }

    /// Worst outcome recorded, `Pass` when none.
    pub fn outcome(&self) -> Outcome {
        Outcome::worst(self.outcomes.iter().map(|o| o.outcome))
    }

    pub fn has_outcome(&self, outcome: Outcome) -> bool {
        self.outcomes.iter().any(|o| o.outcome == outcome)
    }

    pub fn display_name(&self) -> String {
        format!("Part {} Step {}", self.part, self.step)
    }
}

/// Step results of one part, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartResult {
    pub part: u8,
    pub name: String,
    pub state: ExecutionState,
    pub steps: Vec<StepResult>,
}

impl PartResult {
    pub fn new(part: u8, name: impl Into<String>) -> Self {
        Self {
            part,
            name: name.into(),
            state: ExecutionState::Pending,
            steps: Vec::new(),
        }
    }

    pub fn step_result(&self, step: u8) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == step)
    }

    pub fn step_result_mut(&mut self, step: u8) -> Option<&mut StepResult> {
        self.steps.iter_mut().find(|s| s.step == step)
    }

    /// Worst outcome over all steps.
    pub fn outcome(&self) -> Outcome {
        Outcome::worst(self.steps.iter().map(StepResult::outcome))
    }

    /// Number of steps ending with each outcome.
    pub fn outcome_counts(&self) -> BTreeMap<Outcome, usize> {
        let mut counts = BTreeMap::new();
        for step in &self.steps {
            *counts.entry(step.outcome()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of individual outcomes of the given kind across all steps.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.steps
            .iter()
            .flat_map(|s| s.outcomes.iter())
            .filter(|o| o.outcome == outcome)
            .count()
    }
}
