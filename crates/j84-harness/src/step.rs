//! Step framework.
//!
//! A step is a [`Step`] value: metadata plus one async `run` entry point.
//! Everything a step needs (bus, repository, listener, run control) is lent
//! to it through [`StepContext`], which also carries the shared helpers.
//! Every suspension point checks for an ending and returns
//! `StepError::Interrupted` so `?` carries it to the part controller.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use j84_canbus::addresses::address_name;
use j84_canbus::packets::{AcknowledgmentPacket, EngineSpeed};
use j84_canbus::types::ENGINE_ADDRESS;
use j84_canbus::{DecodeFailure, DsResponse, GlobalResponse, J1939Bus, TypedPacket};
use j84_protocol::{ActionOutcome, Outcome};

use crate::checks;
use crate::control::{Ending, RunControl};
use crate::engine::{ENGINE_SPEED_WINDOW, EngineState};
use crate::error::{RunResult, StepError};
use crate::listener::{Answer, MessageKind, ResultsListener};
use crate::repository::DataRepository;

/// Longest uninterrupted wait inside `pause_for`.
pub const PAUSE_QUANTUM: Duration = Duration::from_secs(1);

/// Interval between engine state polls while waiting on the operator.
const KEY_STATE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    pub part: u8,
    pub step: u8,
    pub total_sub_steps: u32,
    pub name: &'static str,
}

impl StepInfo {
    pub fn display_name(&self) -> String {
        format!("Part {} Step {}", self.part, self.step)
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn info(&self) -> StepInfo;

    async fn run(&self, ctx: &mut StepContext<'_>) -> RunResult<()>;
}

/// Destination-specific responses gathered from several modules.
#[derive(Debug, Clone)]
pub struct DsCollection<T> {
    pub packets: Vec<T>,
    pub acks: Vec<AcknowledgmentPacket>,
    pub decode_errors: Vec<DecodeFailure>,
    /// Addresses that never answered.
    pub timeouts: Vec<u8>,
}

impl<T> Default for DsCollection<T> {
    fn default() -> Self {
        Self {
            packets: Vec::new(),
            acks: Vec::new(),
            decode_errors: Vec::new(),
            timeouts: Vec::new(),
        }
    }
}

pub struct StepContext<'a> {
    bus: &'a J1939Bus,
    repository: &'a mut DataRepository,
    listener: &'a dyn ResultsListener,
    control: &'a RunControl,
    part: u8,
    step: u8,
    total_sub_steps: u32,
    progress: u32,
}

impl<'a> StepContext<'a> {
    pub fn new(
        bus: &'a J1939Bus,
        repository: &'a mut DataRepository,
        listener: &'a dyn ResultsListener,
        control: &'a RunControl,
        info: &StepInfo,
    ) -> Self {
        Self {
            bus,
            repository,
            listener,
            control,
            part: info.part,
            step: info.step,
            total_sub_steps: info.total_sub_steps,
            progress: 0,
        }
    }

    pub fn part(&self) -> u8 {
        self.part
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn bus(&self) -> &J1939Bus {
        self.bus
    }

    pub fn listener(&self) -> &dyn ResultsListener {
        self.listener
    }

    pub fn repository(&self) -> &DataRepository {
        self.repository
    }

    pub fn repository_mut(&mut self) -> &mut DataRepository {
        self.repository
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.bus.clock().now()
    }

    // ── Outcomes & transcript ───────────────────────────────────

    pub fn add_outcome(&mut self, outcome: Outcome, message: impl Into<String>) {
        let outcome = ActionOutcome::new(self.part, self.step, outcome, message);
        tracing::info!(
            part = self.part,
            step = self.step,
            outcome = %outcome.outcome,
            message = %outcome.message,
            "outcome"
        );
        self.listener.add_outcome(&outcome);
        self.repository.record_outcome(outcome);
    }

    pub fn add_failure(&mut self, message: impl Into<String>) {
        self.add_outcome(Outcome::Fail, message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add_outcome(Outcome::Warn, message);
    }

    /// Informational transcript line; not a structured outcome.
    pub fn add_info(&self, message: &str) {
        self.listener.on_result(&format!("INFO: {message}"));
    }

    pub fn on_result(&self, line: &str) {
        self.listener.on_result(line);
    }

    pub fn increment_progress(&mut self, message: &str) {
        self.progress = (self.progress + 1).min(self.total_sub_steps.max(1));
        tracing::info!(part = self.part, step = self.step, "{message}");
        self.listener.on_progress(self.progress, self.total_sub_steps, message);
    }

    pub fn update_progress(&self, message: &str) {
        self.listener.on_progress(self.progress, self.total_sub_steps, message);
    }

    // ── Control ─────────────────────────────────────────────────

    pub fn set_ending(&self, ending: Ending) {
        tracing::info!(part = self.part, step = self.step, %ending, "ending requested");
        self.control.set_ending(ending);
    }

    /// `Err(Interrupted)` once the run is aborted, stopped or cancelled.
    pub fn check_interrupted(&self) -> RunResult<()> {
        if self.listener.is_cancelled() && !self.control.is_cancelled() {
            self.control.cancel();
        }
        match self.control.interruption() {
            Some(ending) => Err(StepError::Interrupted(ending)),
            None => Ok(()),
        }
    }

    fn interrupted(&self) -> StepError {
        StepError::Interrupted(self.control.interruption().unwrap_or(Ending::Aborted))
    }

    /// Suspend for `duration`, waking at least every [`PAUSE_QUANTUM`] to
    /// check for an ending.
    pub async fn pause_for(&self, duration: Duration) -> RunResult<()> {
        let mut remaining = duration;
        loop {
            self.check_interrupted()?;
            if remaining.is_zero() {
                return Ok(());
            }
            let slice = remaining.min(PAUSE_QUANTUM);
            tokio::select! {
                biased;
                _ = self.control.cancel_token().cancelled() => {}
                _ = self.bus.clock().pause_for(slice) => {}
            }
            remaining -= slice;
        }
    }

    /// Count down `seconds`, reporting `"<text> <n> seconds"` each second.
    pub async fn wait_for(&self, seconds: u64, text: &str) -> RunResult<()> {
        for remaining in (1..=seconds).rev() {
            self.update_progress(&format!("{text} {remaining} seconds"));
            self.pause_for(Duration::from_secs(1)).await?;
        }
        self.check_interrupted()
    }

    /// Show an urgent message and wait for the operator.
    ///
    /// `Cancel` aborts the run.
    pub async fn urgent(&self, text: &str, title: &str, kind: MessageKind) -> RunResult<Answer> {
        self.check_interrupted()?;
        let answer = tokio::select! {
            biased;
            _ = self.control.cancel_token().cancelled() => Answer::Cancel,
            answer = self.listener.on_urgent_message(text, title, kind) => answer,
        };
        if answer == Answer::Cancel {
            self.control.set_ending(Ending::Aborted);
        }
        self.check_interrupted()?;
        Ok(answer)
    }

    // ── Engine state ────────────────────────────────────────────

    /// Sample Engine Speed from the engine for a short window.
    pub async fn engine_state(&self) -> RunResult<EngineState> {
        self.check_interrupted()?;
        let response = self.bus.listen::<EngineSpeed>(ENGINE_SPEED_WINDOW).await?;
        if response.cancelled {
            return Err(self.interrupted());
        }
        let latest = response.packets.iter().rev().find(|p| p.source() == ENGINE_ADDRESS);
        Ok(EngineState::from_engine_speed(latest))
    }

    pub async fn ensure_key_on_engine_on(&mut self) -> RunResult<()> {
        let result = self
            .ensure_engine_state(
                EngineState::Running,
                "Please turn the Engine ON with Key ON",
                "Waiting for Key ON, Engine ON...",
            )
            .await;
        self.abort_on_interrupt(result)
    }

    pub async fn ensure_key_on_engine_off(&mut self) -> RunResult<()> {
        let result = self
            .ensure_engine_state(
                EngineState::KeyOnEngineOff,
                "Please turn Key ON with Engine OFF",
                "Waiting for Key ON, Engine OFF...",
            )
            .await;
        self.abort_on_interrupt(result)
    }

    async fn ensure_engine_state(&self, wanted: EngineState, instruction: &str, waiting: &str) -> RunResult<()> {
        let mut state = self.engine_state().await?;
        if state == wanted {
            return Ok(());
        }
        tracing::info!(%state, %wanted, "waiting for operator to change key state");
        self.urgent(instruction, "Adjust Key Switch", MessageKind::Warning).await?;
        while state != wanted {
            self.update_progress(waiting);
            self.pause_for(KEY_STATE_POLL).await?;
            state = self.engine_state().await?;
        }
        tracing::info!(%state, "engine state reached");
        Ok(())
    }

    fn abort_on_interrupt<T>(&mut self, result: RunResult<T>) -> RunResult<T> {
        if matches!(result, Err(StepError::Interrupted(Ending::Aborted))) {
            self.add_outcome(Outcome::Abort, "User cancelled operation");
        }
        result
    }

    // ── Bus transactions ────────────────────────────────────────

    pub async fn request_global<T: TypedPacket>(&self) -> RunResult<GlobalResponse<T>> {
        self.check_interrupted()?;
        let response = self.bus.request_global::<T>().await?;
        if response.cancelled {
            return Err(self.interrupted());
        }
        self.check_interrupted()?;
        Ok(response)
    }

    pub async fn request_ds<T: TypedPacket>(&self, address: u8) -> RunResult<DsResponse<T>> {
        self.check_interrupted()?;
        let response = self.bus.request_ds::<T>(address).await?;
        if matches!(response, DsResponse::Cancelled) {
            return Err(self.interrupted());
        }
        self.check_interrupted()?;
        Ok(response)
    }

    /// DS request to each address in turn.
    pub async fn request_ds_each<T: TypedPacket>(&self, addresses: &[u8]) -> RunResult<DsCollection<T>> {
        let mut collection = DsCollection::default();
        for &address in addresses {
            match self.request_ds::<T>(address).await? {
                DsResponse::Packet(packet) => collection.packets.push(packet),
                DsResponse::Ack(ack) => collection.acks.push(ack),
                DsResponse::Invalid(failure) => collection.decode_errors.push(failure),
                DsResponse::Timeout => collection.timeouts.push(address),
                DsResponse::Cancelled => return Err(self.interrupted()),
            }
        }
        Ok(collection)
    }

    // ── Shared checks ───────────────────────────────────────────

    pub fn compare_request_packets<T: TypedPacket>(&mut self, global: &[T], ds: &[T], citation: &str) {
        for failure in checks::compare_request_packets(global, ds, citation) {
            self.add_failure(failure);
        }
    }

    pub fn check_for_nacks<T: TypedPacket>(
        &mut self,
        global: &[T],
        ds_acks: &[AcknowledgmentPacket],
        addresses: &[u8],
        citation: &str,
    ) {
        for failure in checks::check_for_nacks(global, ds_acks, addresses, citation) {
            self.add_failure(failure);
        }
    }

    /// NACK check against every known OBD module.
    pub fn check_for_nacks_ds<T: TypedPacket>(
        &mut self,
        ds_packets: &[T],
        ds_acks: &[AcknowledgmentPacket],
        citation: &str,
    ) {
        let addresses = self.repository.obd_module_addresses();
        for failure in checks::check_for_nacks_ds(ds_packets, ds_acks, &addresses, citation) {
            self.add_failure(failure);
        }
    }

    pub fn report_decode_errors(&mut self, failures: &[DecodeFailure], citation: &str) {
        for failure in checks::decode_failures(failures, citation) {
            self.add_failure(failure);
        }
    }

    // ── Repository ──────────────────────────────────────────────

    pub fn save<T: TypedPacket>(&mut self, packet: &T) -> bool {
        self.repository.save(packet)
    }

    pub fn get<T: TypedPacket>(&self, source: u8) -> Option<&T> {
        self.repository.get::<T>(source)
    }

    pub fn obd_module_addresses(&self) -> Vec<u8> {
        self.repository.obd_module_addresses()
    }

    pub fn module_name(&self, address: u8) -> String {
        address_name(address)
    }
}
