//! Run driver: executes selected parts in order and summarises the result.

use serde::Serialize;
use uuid::Uuid;

use j84_canbus::J1939Bus;
use j84_protocol::{Outcome, PartResult};

use crate::control::{Ending, RunControl};
use crate::listener::ResultsListener;
use crate::part::PartController;
use crate::repository::DataRepository;

pub struct TestRun {
    run_id: Uuid,
    parts: Vec<PartController>,
}

/// Exit code for bus and internal errors, including failures before the
/// first part starts.
pub const ERROR_EXIT_CODE: u8 = 3;

/// Overall result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub parts: Vec<PartResult>,
    /// Worst outcome over every part, `PASS` for an empty run.
    pub outcome: Outcome,
    pub aborted: bool,
    /// A step ended on a bus or internal error.
    pub errors: bool,
}

impl RunSummary {
    /// 3 on bus or internal errors, 2 when aborted, 1 on any failure.
    pub fn exit_code(&self) -> u8 {
        if self.errors {
            ERROR_EXIT_CODE
        } else if self.aborted {
            2
        } else if self.outcome >= Outcome::Fail {
            1
        } else {
            0
        }
    }
}

impl TestRun {
    pub fn new(parts: Vec<PartController>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            parts,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn parts(&self) -> &[PartController] {
        &self.parts
    }

    pub async fn execute(
        &self,
        bus: &J1939Bus,
        repository: &mut DataRepository,
        listener: &dyn ResultsListener,
        control: &RunControl,
    ) -> RunSummary {
        let run_id = self.run_id;
        tracing::info!(%run_id, parts = self.parts.len(), "run started");
        listener.on_milestone(&format!("Run {run_id}"));

        let mut results = Vec::with_capacity(self.parts.len());
        let mut aborted = false;
        let mut errors = false;

        for part in &self.parts {
            if control.ending() == Some(Ending::Completed) {
                break;
            }
            if control.interruption().is_some() {
                aborted = true;
                break;
            }

            let report = part.execute(bus, repository, listener, control).await;
            errors |= report.had_errors;
            results.push(report.result);

            if report.interrupted.is_some() {
                aborted = true;
                break;
            }
            if report.fatal_error {
                tracing::error!(%run_id, part = part.part(), "fatal bus error, ending run");
                break;
            }
        }

        let outcome = Outcome::worst(results.iter().map(PartResult::outcome));
        tracing::info!(%run_id, %outcome, aborted, errors, "run finished");

        RunSummary {
            run_id,
            parts: results,
            outcome,
            aborted,
            errors,
        }
    }
}
