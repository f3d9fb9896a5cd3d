//! Shared test harness for E2E tests.
//!
//! Wires the real part controllers and steps to a `MockCanInterface`, a
//! virtual clock and a `RecordingListener`, so scenarios exercise the same
//! code paths as the binary.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use j84_canbus::packets::{AckResponse, AcknowledgmentPacket, Dm2, Dm21, Dm26, Dm5, EngineSpeed};
use j84_canbus::types::DEFAULT_TOOL_ADDRESS;
use j84_canbus::{CanFrame, CancelToken, Clock, J1939Bus, MockCanInterface, SpnValue, SystemClock, TestClock, TypedPacket};
use j84_harness::part::PartReport;
use j84_harness::{DataRepository, PartRegistry, RecordingListener, RunControl, RunResult, RunSummary, Step, StepContext, TestRun};
use j84_protocol::{DiagnosticTroubleCode, LampStatus, Outcome};

pub const TOOL: u8 = DEFAULT_TOOL_ADDRESS;
pub const OFF: LampStatus = LampStatus::Off;

/// End-to-end harness: one bus, one repository, one run control.
pub struct TestHarness {
    pub mock: Arc<MockCanInterface>,
    pub clock: Arc<dyn Clock>,
    pub listener: Arc<RecordingListener>,
    pub control: RunControl,
    pub bus: J1939Bus,
    pub repo: DataRepository,
}

impl TestHarness {
    /// Harness on a virtual clock starting at 2026-01-01T10:15:30Z.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TestClock::default()))
    }

    /// Harness whose pauses sleep on tokio time, for cancellation timing.
    pub fn with_system_clock() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mock = Arc::new(MockCanInterface::new());
        let cancel = CancelToken::new();
        let bus = J1939Bus::new(mock.clone(), clock.clone(), cancel.clone(), TOOL);
        Self {
            mock,
            clock,
            listener: Arc::new(RecordingListener::new()),
            control: RunControl::new(cancel),
            bus,
            repo: DataRepository::new(),
        }
    }

    /// Register `addresses` as known OBD modules.
    pub fn with_obd_modules(mut self, addresses: &[u8]) -> Self {
        for &address in addresses {
            self.repo.put_obd_module(address);
        }
        self
    }

    pub async fn run_step(&mut self, step: &dyn Step) -> RunResult<()> {
        let info = step.info();
        let mut ctx = StepContext::new(&self.bus, &mut self.repo, self.listener.as_ref(), &self.control, &info);
        step.run(&mut ctx).await
    }

    pub async fn run_part(&mut self, part: u8) -> PartReport {
        let controller = PartRegistry::with_defaults()
            .controller(part)
            .expect("registered part");
        controller
            .execute(&self.bus, &mut self.repo, self.listener.as_ref(), &self.control)
            .await
    }

    pub async fn run_parts(&mut self, parts: &[u8]) -> RunSummary {
        let controllers = PartRegistry::with_defaults()
            .controllers(parts)
            .expect("registered parts");
        TestRun::new(controllers)
            .execute(&self.bus, &mut self.repo, self.listener.as_ref(), &self.control)
            .await
    }

    /// Messages of every FAIL outcome, in order.
    pub fn failures(&self) -> Vec<String> {
        self.listener
            .outcomes()
            .into_iter()
            .filter(|o| o.outcome == Outcome::Fail)
            .map(|o| o.message)
            .collect()
    }

    /// Broadcast Engine Speed from the engine every 100 ms.
    pub fn engine_running(&self, rpm: f64) {
        self.mock.stop_broadcasts();
        self.mock.broadcast_every(engine_speed(rpm), Duration::from_millis(100));
    }
}

// ── Frame builders ──────────────────────────────────────────────

pub fn dm2(source: u8, mil: LampStatus, dtcs: &[DiagnosticTroubleCode]) -> CanFrame {
    Dm2::create(source, mil, OFF, OFF, OFF, dtcs).unwrap().packet().to_frame()
}

pub fn dm5(source: u8, compliance: u8) -> CanFrame {
    Dm5::create(source, 0, 0, compliance).unwrap().packet().to_frame()
}

pub fn dm21_clean(source: u8) -> CanFrame {
    let zero = SpnValue::Value(0.0);
    Dm21::create(source, TOOL, zero, zero, zero, zero)
        .unwrap()
        .packet()
        .to_frame()
}

pub fn dm26(source: u8, seconds: f64) -> Dm26 {
    Dm26::create(source, SpnValue::Value(seconds), 0).unwrap()
}

pub fn nack(source: u8, pgn: u32) -> CanFrame {
    AcknowledgmentPacket::create(source, AckResponse::Nack, pgn, TOOL)
        .unwrap()
        .packet()
        .to_frame()
}

pub fn engine_speed(rpm: f64) -> CanFrame {
    EngineSpeed::create(0, SpnValue::Value(rpm)).unwrap().packet().to_frame()
}
