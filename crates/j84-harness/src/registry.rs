//! Part registry.
//!
//! The harness uses this to turn the part numbers selected on the command
//! line into part controllers, in run order.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::part::PartController;
use crate::steps::{self, PartDefinition};

pub struct PartRegistry {
    parts: Vec<PartDefinition>,
    /// Map from part number to index into `parts`.
    index: HashMap<u8, usize>,
}

impl PartRegistry {
    /// Build a registry from part definitions. A later definition with the
    /// same number replaces an earlier one.
    pub fn new(parts: Vec<PartDefinition>) -> Self {
        let mut index = HashMap::new();
        for (i, definition) in parts.iter().enumerate() {
            index.insert(definition.part, i);
        }
        Self { parts, index }
    }

    /// Build with every part the harness ships.
    pub fn with_defaults() -> Self {
        Self::new(steps::all_parts())
    }

    pub fn lookup(&self, part: u8) -> Option<&PartDefinition> {
        self.index.get(&part).map(|&i| &self.parts[i])
    }

    /// Registered part numbers in ascending order.
    pub fn part_numbers(&self) -> Vec<u8> {
        let mut numbers: Vec<u8> = self.index.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn controller(&self, part: u8) -> Result<PartController, ConfigError> {
        let definition = self
            .lookup(part)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown part {part}")))?;
        PartController::new(definition.part, definition.name, (definition.steps)())
    }

    /// Controllers for `selection` in ascending part order, or for every
    /// registered part when `selection` is empty.
    pub fn controllers(&self, selection: &[u8]) -> Result<Vec<PartController>, ConfigError> {
        let mut parts = if selection.is_empty() {
            self.part_numbers()
        } else {
            selection.to_vec()
        };
        parts.sort_unstable();
        parts.dedup();
        parts.into_iter().map(|part| self.controller(part)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_with_defaults() {
        let registry = PartRegistry::with_defaults();
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
        assert_eq!(registry.part_numbers(), vec![1, 3, 11]);
        assert_eq!(registry.lookup(3).unwrap().name, "Part 3 Test");
    }

    #[test]
    fn lookup_unknown_returns_none() {
        let registry = PartRegistry::with_defaults();
        assert!(registry.lookup(2).is_none());
        assert!(matches!(registry.controller(2), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_selection_runs_everything() {
        let registry = PartRegistry::with_defaults();
        let parts: Vec<u8> = registry
            .controllers(&[])
            .unwrap()
            .iter()
            .map(PartController::part)
            .collect();
        assert_eq!(parts, vec![1, 3, 11]);
    }

    #[test]
    fn selection_is_ordered_and_deduplicated() {
        let registry = PartRegistry::with_defaults();
        let parts: Vec<u8> = registry
            .controllers(&[11, 1, 11])
            .unwrap()
            .iter()
            .map(PartController::part)
            .collect();
        assert_eq!(parts, vec![1, 11]);
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let registry = PartRegistry::with_defaults();
        assert!(registry.controllers(&[1, 4]).is_err());
    }

    #[test]
    fn default_controllers_have_steps() {
        let registry = PartRegistry::with_defaults();
        let part1 = registry.controller(1).unwrap();
        assert_eq!(part1.name(), "Part 1 Test");
        assert_eq!(part1.steps().len(), 3);
    }
}
