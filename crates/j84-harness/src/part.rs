//! Part controller: runs the steps of one part as a serial pipeline.

use j84_canbus::J1939Bus;
use j84_protocol::{ExecutionState, Outcome, PartResult};

use crate::control::{Ending, RunControl};
use crate::error::{ConfigError, StepError};
use crate::listener::ResultsListener;
use crate::repository::DataRepository;
use crate::step::{Step, StepContext};

/// What the run driver needs to know after a part.
#[derive(Debug, Clone)]
pub struct PartReport {
    pub result: PartResult,
    /// The part stopped on an abort, stop or cancellation.
    pub interrupted: Option<Ending>,
    /// The adapter failed in a way no later step can recover from.
    pub fatal_error: bool,
    /// A step ended on a bus or internal error.
    pub had_errors: bool,
}

pub struct PartController {
    part: u8,
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl PartController {
    /// Steps must belong to `part` and be in strictly ascending step order.
    pub fn new(part: u8, name: impl Into<String>, steps: Vec<Box<dyn Step>>) -> Result<Self, ConfigError> {
        let mut previous: Option<u8> = None;
        for step in &steps {
            let info = step.info();
            if info.part != part {
                return Err(ConfigError::Invalid(format!(
                    "{} registered under part {part}",
                    info.display_name()
                )));
            }
            if previous.is_some_and(|p| p >= info.step) {
                return Err(ConfigError::Invalid(format!(
                    "{} is out of order in part {part}",
                    info.display_name()
                )));
            }
            previous = Some(info.step);
        }
        Ok(Self {
            part,
            name: name.into(),
            steps,
        })
    }

    pub fn part(&self) -> u8 {
        self.part
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub async fn execute(
        &self,
        bus: &J1939Bus,
        repository: &mut DataRepository,
        listener: &dyn ResultsListener,
        control: &RunControl,
    ) -> PartReport {
        let part = self.part;
        let total = self.steps.len() as u32;
        let mut interrupted = None;
        let mut fatal_error = false;
        let mut had_errors = false;

        tracing::info!(part, name = %self.name, steps = total, "part started");
        repository.begin_part(part, &self.name);
        listener.on_milestone(&format!("Start {}", self.name));

        for (index, step) in self.steps.iter().enumerate() {
            match control.ending() {
                Some(Ending::Completed) => {
                    tracing::info!(part, "run completed early, skipping remaining steps");
                    break;
                }
                _ => {
                    if let Some(ending) = control.interruption() {
                        interrupted = Some(ending);
                        break;
                    }
                }
            }

            let info = step.info();
            let banner = format!("Part {part}, Step {} - {}", info.step, info.name);
            repository.begin_step(part, info.step, info.name);
            listener.on_milestone(&format!("Start {banner}"));
            listener.on_progress(index as u32 + 1, total, &banner);
            tracing::info!(part, step = info.step, name = info.name, "step started");

            let mut ctx = StepContext::new(bus, repository, listener, control, &info);
            let state = match step.run(&mut ctx).await {
                Ok(()) => ExecutionState::Completed,
                Err(StepError::Interrupted(ending)) => {
                    let already_aborted = ctx
                        .repository()
                        .step_result(part, info.step)
                        .is_some_and(|s| s.has_outcome(Outcome::Abort));
                    match ending {
                        Ending::Stopped => ctx.add_outcome(Outcome::Incomplete, "Stopped - user ended test"),
                        _ if !already_aborted => ctx.add_outcome(Outcome::Abort, "User cancelled operation"),
                        _ => {}
                    }
                    interrupted = Some(ending);
                    ExecutionState::Aborted
                }
                Err(StepError::Bus(e)) => {
                    tracing::warn!(part, step = info.step, error = %e, "bus error during step");
                    ctx.add_failure(e.to_string());
                    had_errors = true;
                    fatal_error = e.is_fatal();
                    ExecutionState::FailedUnexpected
                }
                Err(StepError::Unexpected(e)) => {
                    tracing::warn!(part, step = info.step, error = %e, "unexpected error during step");
                    ctx.add_failure(format!("Unexpected error: {e:#}"));
                    had_errors = true;
                    ExecutionState::FailedUnexpected
                }
            };
            repository.set_step_state(part, info.step, state);
            listener.on_milestone(&format!("End {banner}"));
            tracing::info!(part, step = info.step, state = ?state, "step finished");

            if interrupted.is_some() || fatal_error {
                break;
            }
        }

        let part_state = if interrupted.is_some() {
            ExecutionState::Aborted
        } else if fatal_error {
            ExecutionState::FailedUnexpected
        } else {
            ExecutionState::Completed
        };
        repository.set_part_state(part, part_state);

        let result = repository
            .part_result(part)
            .cloned()
            .unwrap_or_else(|| PartResult::new(part, self.name.clone()));
        listener.on_milestone(&summary_line(&result));
        tracing::info!(part, outcome = %result.outcome(), state = ?part_state, "part finished");

        PartReport {
            result,
            interrupted,
            fatal_error,
            had_errors,
        }
    }
}

/// `End Part 3 Test: FAIL (PASS: 2, FAIL: 1)`
fn summary_line(result: &PartResult) -> String {
    let counts = result
        .outcome_counts()
        .iter()
        .map(|(outcome, n)| format!("{outcome}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("End {}: {} ({counts})", result.name, result.outcome())
}
