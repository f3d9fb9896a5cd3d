//! Concrete test steps and the default part layout.

mod dm21_readiness;
mod dm26_trip_readiness;
mod dm2_previously_active;
mod obd_discovery;
mod part_transition;

pub use dm21_readiness::Dm21Readiness;
pub use dm26_trip_readiness::Dm26TripReadiness;
pub use dm2_previously_active::Dm2PreviouslyActive;
pub use obd_discovery::ObdDiscovery;
pub use part_transition::PartTransition;

use crate::step::Step;

/// A part number, its display name and its step factory.
#[derive(Debug, Clone, Copy)]
pub struct PartDefinition {
    pub part: u8,
    pub name: &'static str,
    pub steps: fn() -> Vec<Box<dyn Step>>,
}

/// Every part the harness knows, in run order.
pub fn all_parts() -> Vec<PartDefinition> {
    vec![
        PartDefinition {
            part: 1,
            name: "Part 1 Test",
            steps: part1_steps,
        },
        PartDefinition {
            part: 3,
            name: "Part 3 Test",
            steps: part3_steps,
        },
        PartDefinition {
            part: 11,
            name: "Part 11 Test",
            steps: part11_steps,
        },
    ]
}

fn part1_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(ObdDiscovery),
        Box::new(Dm21Readiness),
        Box::new(PartTransition),
    ]
}

fn part3_steps() -> Vec<Box<dyn Step>> {
    vec![Box::new(Dm2PreviouslyActive)]
}

fn part11_steps() -> Vec<Box<dyn Step>> {
    vec![Box::new(Dm26TripReadiness)]
}
