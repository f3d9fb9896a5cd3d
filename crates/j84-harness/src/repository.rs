//! Cross-step store of observed vehicle state.
//!
//! One repository lives for one run. It is owned by the orchestrator and lent
//! mutably to the step that is executing, so no locking is involved.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use j84_canbus::ParsedPacket;
use j84_canbus::TypedPacket;
use j84_canbus::addresses::function_name;
use j84_canbus::packets::Dm5;
use j84_protocol::{ActionOutcome, ExecutionState, PartResult, StepResult, VehicleInformation};

/// What the harness knows about one OBD module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObdModuleInformation {
    pub address: u8,
    pub function: String,
    /// DM5 OBD compliance byte (SPN 1220) as last reported.
    pub obd_compliance: Option<u8>,
    pub continuously_monitored_systems: Option<u8>,
    pub non_continuously_monitored_support: Option<u16>,
    /// PGNs this module has answered during the run.
    pub supported_pgns: BTreeSet<u32>,
}

impl ObdModuleInformation {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            function: function_name(address).to_string(),
            obd_compliance: None,
            continuously_monitored_systems: None,
            non_continuously_monitored_support: None,
            supported_pgns: BTreeSet::new(),
        }
    }

    /// Copy compliance and monitor support from a DM5 response.
    pub fn update_from_dm5(&mut self, dm5: &Dm5) {
        self.obd_compliance = Some(dm5.obd_compliance());
        self.continuously_monitored_systems = Some(dm5.continuously_monitored_systems());
        self.non_continuously_monitored_support = Some(dm5.non_continuously_monitored_support());
    }
}

/// Read-only view of the repository for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RepositorySnapshot {
    pub vehicle: VehicleInformation,
    pub obd_modules: Vec<ObdModuleInformation>,
    pub packets: Vec<PacketRecord>,
    pub part_results: Vec<PartResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    pub pgn: u32,
    pub source: u8,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct DataRepository {
    vehicle: VehicleInformation,
    obd_modules: BTreeMap<u8, ObdModuleInformation>,
    packets: BTreeMap<(u32, u8), ParsedPacket>,
    part_results: Vec<PartResult>,
}

impl DataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicle(vehicle: VehicleInformation) -> Self {
        Self {
            vehicle,
            ..Self::default()
        }
    }

    pub fn vehicle(&self) -> &VehicleInformation {
        &self.vehicle
    }

    pub fn vehicle_mut(&mut self) -> &mut VehicleInformation {
        &mut self.vehicle
    }

    // ── OBD modules ─────────────────────────────────────────────

    /// Insert the module if absent; an existing record is kept as is.
    pub fn put_obd_module(&mut self, address: u8) -> &mut ObdModuleInformation {
        self.obd_modules
            .entry(address)
            .or_insert_with(|| ObdModuleInformation::new(address))
    }

    pub fn obd_module(&self, address: u8) -> Option<&ObdModuleInformation> {
        self.obd_modules.get(&address)
    }

    pub fn is_obd_module(&self, address: u8) -> bool {
        self.obd_modules.contains_key(&address)
    }

    /// OBD module addresses in ascending order.
    pub fn obd_module_addresses(&self) -> Vec<u8> {
        self.obd_modules.keys().copied().collect()
    }

    // ── Packets ─────────────────────────────────────────────────

    /// Record `packet` as the latest of its PGN from its source.
    ///
    /// A packet older than the stored one is ignored. Returns whether the
    /// packet was stored.
    pub fn save<T: TypedPacket>(&mut self, packet: &T) -> bool {
        self.save_parsed(packet.clone().into_parsed())
    }

    pub fn save_parsed(&mut self, parsed: ParsedPacket) -> bool {
        let key = (parsed.pgn(), parsed.source());
        if let Some(existing) = self.packets.get(&key)
            && existing.packet().timestamp() > parsed.packet().timestamp()
        {
            return false;
        }
        if let Some(module) = self.obd_modules.get_mut(&key.1) {
            module.supported_pgns.insert(key.0);
        }
        self.packets.insert(key, parsed);
        true
    }

    /// Most recent packet of type `T` from `source`.
    pub fn get<T: TypedPacket>(&self, source: u8) -> Option<&T> {
        self.packets.get(&(T::PGN, source)).and_then(ParsedPacket::get::<T>)
    }

    pub fn get_parsed(&self, pgn: u32, source: u8) -> Option<&ParsedPacket> {
        self.packets.get(&(pgn, source))
    }

    // ── Results ─────────────────────────────────────────────────

    /// Start (or restart) the result of `part`.
    pub fn begin_part(&mut self, part: u8, name: &str) {
        self.part_results.retain(|p| p.part != part);
        let mut result = PartResult::new(part, name);
        result.state = ExecutionState::Running;
        self.part_results.push(result);
    }

    pub fn set_part_state(&mut self, part: u8, state: ExecutionState) {
        if let Some(result) = self.part_results.iter_mut().find(|p| p.part == part) {
            result.state = state;
        }
    }

    /// Start the result of a step, keeping the part's steps in run order.
    pub fn begin_step(&mut self, part: u8, step: u8, name: &str) {
        let part_result = self.part_result_entry(part);
        part_result.steps.retain(|s| s.step != step);
        let mut result = StepResult::new(part, step, name);
        result.state = ExecutionState::Running;
        part_result.steps.push(result);
    }

    pub fn set_step_state(&mut self, part: u8, step: u8, state: ExecutionState) {
        if let Some(result) = self.step_result_entry(part, step) {
            result.state = state;
        }
    }

    /// Append an outcome to its step, creating part and step records as needed.
    pub fn record_outcome(&mut self, outcome: ActionOutcome) {
        let (part, step) = (outcome.part, outcome.step);
        if self.step_result_entry(part, step).is_none() {
            self.part_result_entry(part)
                .steps
                .push(StepResult::new(part, step, format!("Part {part} Step {step}")));
        }
        if let Some(result) = self.step_result_entry(part, step) {
            result.outcomes.push(outcome);
        }
    }

    pub fn part_result(&self, part: u8) -> Option<&PartResult> {
        self.part_results.iter().find(|p| p.part == part)
    }

    pub fn step_result(&self, part: u8, step: u8) -> Option<&StepResult> {
        self.part_result(part).and_then(|p| p.step_result(step))
    }

    pub fn part_results(&self) -> &[PartResult] {
        &self.part_results
    }

    fn part_result_entry(&mut self, part: u8) -> &mut PartResult {
        let index = match self.part_results.iter().position(|p| p.part == part) {
            Some(index) => index,
            None => {
                self.part_results.push(PartResult::new(part, format!("Part {part} Test")));
                self.part_results.len() - 1
            }
        };
        &mut self.part_results[index]
    }

    fn step_result_entry(&mut self, part: u8, step: u8) -> Option<&mut StepResult> {
        self.part_results
            .iter_mut()
            .find(|p| p.part == part)
            .and_then(|p| p.step_result_mut(step))
    }

    pub fn snapshot(&self) -> RepositorySnapshot {
        RepositorySnapshot {
            vehicle: self.vehicle.clone(),
            obd_modules: self.obd_modules.values().cloned().collect(),
            packets: self
                .packets
                .values()
                .map(|p| PacketRecord {
                    pgn: p.pgn(),
                    source: p.source(),
                    received_at: p.packet().timestamp(),
                    text: p.to_string(),
                })
                .collect(),
            part_results: self.part_results.clone(),
        }
    }
}
