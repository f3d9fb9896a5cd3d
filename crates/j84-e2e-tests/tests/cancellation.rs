//! E2E tests for ending a run while a step is waiting.
//!
//! These use the system clock on paused tokio time so that pauses really
//! suspend and the cancel latency can be measured.

mod helpers;

use std::time::Duration;

use tokio::time::Instant;

use j84_harness::{Ending, PartRegistry};
use j84_protocol::{ExecutionState, Outcome};

use helpers::TestHarness;

/// Part 1 with no responders reaches the 60 second idle after about 3 s.
const DURING_IDLE: Duration = Duration::from_secs(10);

fn abort_messages(h: &TestHarness, part: u8, step: u8) -> Vec<String> {
    h.repo
        .step_result(part, step)
        .unwrap()
        .outcomes
        .iter()
        .filter(|o| o.outcome == Outcome::Abort)
        .map(|o| o.message.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn e2e_cancel_during_idle_returns_within_a_quantum() {
    let mut h = TestHarness::with_system_clock();
    h.engine_running(650.0);
    let token = h.control.cancel_token().clone();
    let start = Instant::now();

    let canceller = async move {
        tokio::time::sleep(DURING_IDLE).await;
        token.cancel();
    };
    let (report, ()) = tokio::join!(h.run_part(1), canceller);

    assert!(start.elapsed() <= DURING_IDLE + Duration::from_secs(1));
    assert_eq!(report.interrupted, Some(Ending::Aborted));
    assert_eq!(report.result.state, ExecutionState::Aborted);
    assert_eq!(h.repo.step_result(1, 27).unwrap().state, ExecutionState::Aborted);
    assert_eq!(abort_messages(&h, 1, 27), vec!["User cancelled operation"]);
    // The countdown was under way when the cancel arrived.
    assert!(h.listener.progress().iter().any(|p| p.starts_with("Allowing engine to idle for")));
}

#[tokio::test(start_paused = true)]
async fn e2e_listener_cancel_flag_aborts() {
    let mut h = TestHarness::with_system_clock();
    h.engine_running(650.0);
    let listener = h.listener.clone();
    let start = Instant::now();

    let canceller = async move {
        tokio::time::sleep(DURING_IDLE).await;
        listener.set_cancelled(true);
    };
    let (report, ()) = tokio::join!(h.run_part(1), canceller);

    assert!(start.elapsed() <= DURING_IDLE + Duration::from_secs(1));
    assert_eq!(report.interrupted, Some(Ending::Aborted));
    assert!(h.control.is_cancelled());
    assert_eq!(abort_messages(&h, 1, 27), vec!["User cancelled operation"]);
}

#[tokio::test(start_paused = true)]
async fn e2e_stop_marks_step_incomplete() {
    let mut h = TestHarness::with_system_clock();
    h.engine_running(650.0);
    let controller = PartRegistry::with_defaults().controller(1).unwrap();
    let control = &h.control;

    let stopper = async {
        tokio::time::sleep(DURING_IDLE).await;
        control.set_ending(Ending::Stopped);
    };
    let (report, ()) = tokio::join!(
        controller.execute(&h.bus, &mut h.repo, h.listener.as_ref(), control),
        stopper
    );

    assert_eq!(report.interrupted, Some(Ending::Stopped));
    let step = h.repo.step_result(1, 27).unwrap();
    assert_eq!(step.state, ExecutionState::Aborted);
    assert!(
        step.outcomes
            .iter()
            .any(|o| o.outcome == Outcome::Incomplete && o.message == "Stopped - user ended test")
    );
    assert!(abort_messages(&h, 1, 27).is_empty());
}

#[tokio::test(start_paused = true)]
async fn e2e_cancel_before_run_sends_nothing() {
    let mut h = TestHarness::new();
    h.control.cancel();

    let summary = h.run_parts(&[1, 3]).await;

    assert!(summary.aborted);
    assert!(summary.parts.is_empty());
    assert_eq!(summary.exit_code(), 2);
    assert!(h.mock.requests_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn e2e_cancel_skips_remaining_parts() {
    let mut h = TestHarness::with_system_clock();
    h.engine_running(650.0);
    let token = h.control.cancel_token().clone();

    let canceller = async move {
        tokio::time::sleep(DURING_IDLE).await;
        token.cancel();
    };
    let (summary, ()) = tokio::join!(h.run_parts(&[1, 3, 11]), canceller);

    assert!(summary.aborted);
    assert_eq!(summary.parts.len(), 1);
    assert_eq!(summary.outcome, Outcome::Abort);
    assert!(h.repo.part_result(3).is_none());
    assert!(h.repo.part_result(11).is_none());
}
