use serde::{Deserialize, Serialize};

/// Fuel type declared for the vehicle under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    #[default]
    Diesel,
    Gasoline,
    NaturalGas,
    Propane,
    Electric,
    HybridDiesel,
    HybridGasoline,
}

impl FuelType {
    /// Compression-ignition engines follow the diesel rule set.
    pub fn is_compression_ignition(&self) -> bool {
        matches!(self, FuelType::Diesel | FuelType::HybridDiesel)
    }
}

/// Vehicle-level facts entered by the operator or read from the vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInformation {
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub fuel_type: FuelType,
    #[serde(default)]
    pub engine_model_year: Option<u16>,
    #[serde(default)]
    pub calibration_ids: Vec<String>,
}
