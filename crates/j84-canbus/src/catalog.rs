//! Digital Annex catalog: table-driven PGN/SPN definitions.
//!
//! Every typed packet reads its parameters through an [`SpnDefinition`]:
//! the definition locates the raw bits in the payload, recognizes the
//! J1939-71 *error* and *not available* sentinels, and scales the rest as
//! `raw * resolution + offset`. The built-in table covers the PGNs the
//! harness decodes; further PGNs can be merged in from a TOML file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DecodeError;
use crate::types::*;

/// SPN numbers referenced by the typed packet accessors.
pub mod spns {
    pub const ENGINE_TORQUE_MODE: u32 = 899;
    pub const DRIVERS_DEMAND_TORQUE: u32 = 512;
    pub const ACTUAL_ENGINE_TORQUE: u32 = 513;
    pub const ENGINE_SPEED: u32 = 190;
    pub const CONTROLLING_DEVICE_ADDRESS: u32 = 1483;
    pub const ENGINE_STARTER_MODE: u32 = 1675;
    pub const ENGINE_DEMAND_TORQUE: u32 = 2432;

    pub const MALFUNCTION_INDICATOR_LAMP: u32 = 1213;
    pub const RED_STOP_LAMP: u32 = 623;
    pub const AMBER_WARNING_LAMP: u32 = 624;
    pub const PROTECT_LAMP: u32 = 987;
    pub const FLASH_MIL: u32 = 3038;
    pub const FLASH_RED_STOP_LAMP: u32 = 3039;
    pub const FLASH_AMBER_WARNING_LAMP: u32 = 3040;
    pub const FLASH_PROTECT_LAMP: u32 = 3041;

    pub const ACTIVE_DTC_COUNT: u32 = 1218;
    pub const PREVIOUSLY_ACTIVE_DTC_COUNT: u32 = 1219;
    pub const OBD_COMPLIANCE: u32 = 1220;
    pub const CONTINUOUSLY_MONITORED_SYSTEMS: u32 = 1221;
    pub const NON_CONTINUOUS_SUPPORT: u32 = 1222;
    pub const NON_CONTINUOUS_STATUS: u32 = 1223;

    pub const DISTANCE_WHILE_MIL_ACTIVATED: u32 = 3069;
    pub const DISTANCE_SINCE_DTCS_CLEARED: u32 = 3294;
    pub const MINUTES_WHILE_MIL_ACTIVATED: u32 = 3295;
    pub const MINUTES_SINCE_DTCS_CLEARED: u32 = 3296;

    pub const TIME_SINCE_ENGINE_START: u32 = 3301;
    pub const WARM_UPS_SINCE_DTCS_CLEARED: u32 = 3302;
    pub const CONTINUOUSLY_MONITORED_THIS_CYCLE: u32 = 3303;
    pub const NON_CONTINUOUS_ENABLED_THIS_CYCLE: u32 = 3304;
    pub const NON_CONTINUOUS_COMPLETE_THIS_CYCLE: u32 = 3305;

    pub const REQUESTED_PGN: u32 = 2540;
    pub const ACK_CONTROL_BYTE: u32 = 2541;
    pub const ACK_GROUP_FUNCTION: u32 = 2542;
    pub const ACK_ADDRESS: u32 = 2543;
    pub const ACK_PGN: u32 = 2544;
}

/// Byte order of a multi-byte parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Least significant byte first, the J1939 default.
    #[default]
    Little,
    Big,
}

/// A decoded parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpnValue {
    Value(f64),
    /// The sender reported an error indicator.
    Error,
    /// The sender reported the parameter as not available.
    NotAvailable,
}

impl SpnValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            SpnValue::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SpnValue::Error)
    }

    pub fn is_not_available(&self) -> bool {
        matches!(self, SpnValue::NotAvailable)
    }

    /// Human form with units, e.g. `1500.000 RPM` or `Not Available`.
    pub fn with_units(&self, units: &str) -> String {
        match self {
            SpnValue::Value(v) if units.is_empty() => format!("{v:.3}"),
            SpnValue::Value(v) => format!("{v:.3} {units}"),
            SpnValue::Error => "Error".to_string(),
            SpnValue::NotAvailable => "Not Available".to_string(),
        }
    }
}

impl fmt::Display for SpnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.with_units(""))
    }
}

fn default_resolution() -> f64 {
    1.0
}

/// Location and scaling of one SPN inside a PGN payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpnDefinition {
    pub spn: u32,
    pub label: String,
    /// Zero-based index of the first byte.
    pub start_byte: usize,
    /// Zero-based bit offset within the first byte, counted from the LSB.
    #[serde(default)]
    pub start_bit: u8,
    pub bit_length: u32,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub byte_order: ByteOrder,
}

impl SpnDefinition {
    #[allow(clippy::too_many_arguments)]
    fn new(
        spn: u32,
        label: &str,
        start_byte: usize,
        start_bit: u8,
        bit_length: u32,
        resolution: f64,
        offset: f64,
        units: &str,
    ) -> Self {
        Self {
            spn,
            label: label.to_string(),
            start_byte,
            start_bit,
            bit_length,
            resolution,
            offset,
            units: units.to_string(),
            byte_order: ByteOrder::Little,
        }
    }

    fn byte_span(&self) -> usize {
        (usize::from(self.start_bit) + self.bit_length as usize).div_ceil(8)
    }

    /// Minimum payload length that contains this SPN.
    pub fn required_bytes(&self) -> usize {
        self.start_byte + self.byte_span()
    }

    fn mask(&self) -> u64 {
        if self.bit_length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_length) - 1
        }
    }

    /// The field must fit the 64-bit window read by [`SpnDefinition::raw`].
    pub fn check_geometry(&self) -> Result<(), String> {
        if self.start_bit >= 8 {
            return Err(format!("start bit {} is outside the first byte", self.start_bit));
        }
        if self.bit_length == 0 || self.bit_length > 56 {
            return Err(format!("unsupported bit length {}", self.bit_length));
        }
        Ok(())
    }

    fn check_length(&self, pgn: u32, data: &[u8]) -> Result<(), DecodeError> {
        self.check_geometry()
            .map_err(|reason| DecodeError::InvalidSpn { spn: self.spn, reason })?;
        let needed = self.required_bytes();
        if data.len() < needed {
            return Err(DecodeError::TooShort {
                pgn,
                needed,
                actual: data.len(),
            });
        }
        Ok(())
    }

    fn window(&self, data: &[u8]) -> u64 {
        let bytes = &data[self.start_byte..self.start_byte + self.byte_span()];
        match self.byte_order {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            ByteOrder::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        }
    }

    /// Extract the unscaled bits of this SPN.
    pub fn raw(&self, pgn: u32, data: &[u8]) -> Result<u64, DecodeError> {
        self.check_length(pgn, data)?;
        Ok((self.window(data) >> self.start_bit) & self.mask())
    }

    /// Classify a raw value against the J1939-71 sentinel ranges for its width.
    pub fn classify(&self, raw: u64) -> SpnValue {
        let bits = self.bit_length;
        if bits >= 8 {
            // The most significant byte carries the indicator for 8/16/24/32-bit parameters.
            match raw >> (bits - 8) {
                0xFF => return SpnValue::NotAvailable,
                0xFE => return SpnValue::Error,
                _ => {}
            }
        } else if bits >= 2 {
            let mask = self.mask();
            if raw == mask {
                return SpnValue::NotAvailable;
            }
            if raw == mask - 1 {
                return SpnValue::Error;
            }
        }
        SpnValue::Value(raw as f64 * self.resolution + self.offset)
    }

    /// Decode and scale this SPN from a payload.
    pub fn decode(&self, pgn: u32, data: &[u8]) -> Result<SpnValue, DecodeError> {
        Ok(self.classify(self.raw(pgn, data)?))
    }

    /// Write raw bits into `data`, leaving surrounding bits untouched.
    pub fn encode_raw(&self, pgn: u32, raw: u64, data: &mut [u8]) -> Result<(), DecodeError> {
        self.check_length(pgn, data)?;
        let shifted_mask = self.mask() << self.start_bit;
        let window = (self.window(data) & !shifted_mask) | ((raw & self.mask()) << self.start_bit);
        let span = self.byte_span();
        for i in 0..span {
            let byte = match self.byte_order {
                ByteOrder::Little => (window >> (8 * i)) & 0xFF,
                ByteOrder::Big => (window >> (8 * (span - 1 - i))) & 0xFF,
            };
            data[self.start_byte + i] = byte as u8;
        }
        Ok(())
    }

    /// Scale a physical value back to raw bits and write it into `data`.
    pub fn encode(&self, pgn: u32, value: SpnValue, data: &mut [u8]) -> Result<(), DecodeError> {
        self.check_geometry()
            .map_err(|reason| DecodeError::InvalidSpn { spn: self.spn, reason })?;
        let bits = self.bit_length;
        let raw = match value {
            SpnValue::Value(v) => {
                let raw = ((v - self.offset) / self.resolution).round();
                if raw < 0.0 || raw > self.mask() as f64 {
                    return Err(DecodeError::InvalidSpn {
                        spn: self.spn,
                        reason: format!("value {v} out of range"),
                    });
                }
                raw as u64
            }
            SpnValue::NotAvailable => self.mask(),
            // 0xFE in the top byte, remaining bytes all ones.
            SpnValue::Error if bits >= 8 => (0xFE << (bits - 8)) | ((1 << (bits - 8)) - 1),
            SpnValue::Error => self.mask() - 1,
        };
        self.encode_raw(pgn, raw, data)
    }
}

/// A Parameter Group and the SPNs it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgnDefinition {
    pub pgn: u32,
    pub label: String,
    #[serde(default)]
    pub acronym: String,
    #[serde(rename = "spn", default)]
    pub spns: Vec<SpnDefinition>,
}

impl PgnDefinition {
    fn new(pgn: u32, label: &str, acronym: &str, spns: Vec<SpnDefinition>) -> Self {
        Self {
            pgn,
            label: label.to_string(),
            acronym: acronym.to_string(),
            spns,
        }
    }

    pub fn spn(&self, spn: u32) -> Option<&SpnDefinition> {
        self.spns.iter().find(|s| s.spn == spn)
    }

    /// Minimum payload length covering every fixed-position SPN.
    pub fn required_length(&self) -> usize {
        self.spns
            .iter()
            .map(SpnDefinition::required_bytes)
            .max()
            .unwrap_or(0)
    }

    /// Fail with `DecodeError` when `data` cannot hold every SPN.
    pub fn validate(&self, data: &[u8]) -> Result<(), DecodeError> {
        let needed = self.required_length();
        if data.len() < needed {
            return Err(DecodeError::TooShort {
                pgn: self.pgn,
                needed,
                actual: data.len(),
            });
        }
        Ok(())
    }
}

/// Errors loading a Digital Annex extension file.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid SPN {spn} in PGN {pgn}: {reason}")]
    InvalidSpn { pgn: u32, spn: u32, reason: String },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "pgn", default)]
    pgns: Vec<PgnDefinition>,
}

/// Read-only PGN/SPN lookup table.
#[derive(Debug, Clone, Default)]
pub struct DigitalAnnex {
    pgns: BTreeMap<u32, PgnDefinition>,
}

static BUILTIN: LazyLock<DigitalAnnex> = LazyLock::new(DigitalAnnex::builtin);

/// Shared instance of the built-in table.
pub fn builtin() -> &'static DigitalAnnex {
    &BUILTIN
}

impl DigitalAnnex {
    /// Definitions for every PGN the codec decodes.
    pub fn builtin() -> Self {
        use spns::*;

        let lamps = |flash: bool| {
            let (mil, rsl, awl, pl, byte) = if flash {
                (FLASH_MIL, FLASH_RED_STOP_LAMP, FLASH_AMBER_WARNING_LAMP, FLASH_PROTECT_LAMP, 1)
            } else {
                (MALFUNCTION_INDICATOR_LAMP, RED_STOP_LAMP, AMBER_WARNING_LAMP, PROTECT_LAMP, 0)
            };
            let prefix = if flash { "Flash " } else { "" };
            vec![
                SpnDefinition::new(mil, &format!("{prefix}Malfunction Indicator Lamp"), byte, 6, 2, 1.0, 0.0, "bit"),
                SpnDefinition::new(rsl, &format!("{prefix}Red Stop Lamp"), byte, 4, 2, 1.0, 0.0, "bit"),
                SpnDefinition::new(awl, &format!("{prefix}Amber Warning Lamp"), byte, 2, 2, 1.0, 0.0, "bit"),
                SpnDefinition::new(pl, &format!("{prefix}Protect Lamp"), byte, 0, 2, 1.0, 0.0, "bit"),
            ]
        };
        let mut dtc_lamps = lamps(false);
        dtc_lamps.extend(lamps(true));

        let entries = vec![
            PgnDefinition::new(PGN_DM21, "Diagnostic Readiness 2", "DM21", vec![
                SpnDefinition::new(DISTANCE_WHILE_MIL_ACTIVATED, "Distance Traveled While MIL is Activated", 0, 0, 16, 1.0, 0.0, "km"),
                SpnDefinition::new(DISTANCE_SINCE_DTCS_CLEARED, "Distance Since Diagnostic Trouble Codes Cleared", 2, 0, 16, 1.0, 0.0, "km"),
                SpnDefinition::new(MINUTES_WHILE_MIL_ACTIVATED, "Minutes Run by Engine While MIL is Activated", 4, 0, 16, 1.0, 0.0, "minutes"),
                SpnDefinition::new(MINUTES_SINCE_DTCS_CLEARED, "Time Since Diagnostic Trouble Codes Cleared", 6, 0, 16, 1.0, 0.0, "minutes"),
            ]),
            PgnDefinition::new(PGN_ACKNOWLEDGMENT, "Acknowledgment", "ACKM", vec![
                SpnDefinition::new(ACK_CONTROL_BYTE, "Control Byte", 0, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(ACK_GROUP_FUNCTION, "Group Function Value", 1, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(ACK_ADDRESS, "Address Acknowledged", 4, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(ACK_PGN, "Parameter Group Number of Requested Information", 5, 0, 24, 1.0, 0.0, ""),
            ]),
            PgnDefinition::new(PGN_REQUEST, "Request", "RQST", vec![
                SpnDefinition::new(REQUESTED_PGN, "Parameter Group Number (RQST)", 0, 0, 24, 1.0, 0.0, ""),
            ]),
            PgnDefinition::new(PGN_ENGINE_SPEED, "Electronic Engine Controller 1", "EEC1", vec![
                SpnDefinition::new(ENGINE_TORQUE_MODE, "Engine Torque Mode", 0, 0, 4, 1.0, 0.0, "bit"),
                SpnDefinition::new(DRIVERS_DEMAND_TORQUE, "Driver's Demand Engine - Percent Torque", 1, 0, 8, 1.0, -125.0, "%"),
                SpnDefinition::new(ACTUAL_ENGINE_TORQUE, "Actual Engine - Percent Torque", 2, 0, 8, 1.0, -125.0, "%"),
                SpnDefinition::new(ENGINE_SPEED, "Engine Speed", 3, 0, 16, 0.125, 0.0, "rpm"),
                SpnDefinition::new(CONTROLLING_DEVICE_ADDRESS, "Source Address of Controlling Device for Engine Control", 5, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(ENGINE_STARTER_MODE, "Engine Starter Mode", 6, 0, 4, 1.0, 0.0, "bit"),
                SpnDefinition::new(ENGINE_DEMAND_TORQUE, "Engine Demand - Percent Torque", 7, 0, 8, 1.0, -125.0, "%"),
            ]),
            PgnDefinition::new(PGN_DM26, "Diagnostic Readiness 3", "DM26", vec![
                SpnDefinition::new(TIME_SINCE_ENGINE_START, "Time Since Engine Start", 0, 0, 16, 1.0, 0.0, "s"),
                SpnDefinition::new(WARM_UPS_SINCE_DTCS_CLEARED, "Number of Warm-Ups Since DTCs Cleared", 2, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(CONTINUOUSLY_MONITORED_THIS_CYCLE, "Continuously Monitored Systems Enabled/Completed Status", 3, 0, 8, 1.0, 0.0, "bit"),
                SpnDefinition::new(NON_CONTINUOUS_ENABLED_THIS_CYCLE, "Non-continuously Monitored Systems Enabled Status", 4, 0, 16, 1.0, 0.0, "bit"),
                SpnDefinition::new(NON_CONTINUOUS_COMPLETE_THIS_CYCLE, "Non-continuously Monitored Systems Complete Status", 6, 0, 16, 1.0, 0.0, "bit"),
            ]),
            PgnDefinition::new(PGN_DM1, "Active Diagnostic Trouble Codes", "DM1", dtc_lamps.clone()),
            PgnDefinition::new(PGN_DM2, "Previously Active Diagnostic Trouble Codes", "DM2", dtc_lamps),
            PgnDefinition::new(PGN_DM5, "Diagnostic Readiness 1", "DM5", vec![
                SpnDefinition::new(ACTIVE_DTC_COUNT, "Active Trouble Code Count", 0, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(PREVIOUSLY_ACTIVE_DTC_COUNT, "Previously Active Trouble Code Count", 1, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(OBD_COMPLIANCE, "OBD Compliance", 2, 0, 8, 1.0, 0.0, ""),
                SpnDefinition::new(CONTINUOUSLY_MONITORED_SYSTEMS, "Continuously Monitored Systems Support/Status", 3, 0, 8, 1.0, 0.0, "bit"),
                SpnDefinition::new(NON_CONTINUOUS_SUPPORT, "Non-continuously Monitored Systems Support", 4, 0, 16, 1.0, 0.0, "bit"),
                SpnDefinition::new(NON_CONTINUOUS_STATUS, "Non-continuously Monitored Systems Status", 6, 0, 16, 1.0, 0.0, "bit"),
            ]),
        ];

        let mut annex = Self::default();
        for entry in entries {
            annex.insert(entry);
        }
        annex
    }

    /// Parse extension definitions from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text)?;
        let mut annex = Self::default();
        for pgn in file.pgns {
            for spn in &pgn.spns {
                spn.check_geometry().map_err(|reason| CatalogError::InvalidSpn {
                    pgn: pgn.pgn,
                    spn: spn.spn,
                    reason,
                })?;
            }
            annex.insert(pgn);
        }
        Ok(annex)
    }

    /// Built-in definitions merged with the entries of a TOML file.
    pub fn builtin_with_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut annex = Self::builtin();
        annex.merge(Self::from_toml_str(&text)?);
        Ok(annex)
    }

    /// Add or replace a PGN definition.
    pub fn insert(&mut self, definition: PgnDefinition) {
        self.pgns.insert(definition.pgn, definition);
    }

    /// Entries of `other` replace entries with the same PGN.
    pub fn merge(&mut self, other: DigitalAnnex) {
        self.pgns.extend(other.pgns);
    }

    pub fn find_pgn(&self, pgn: u32) -> Option<&PgnDefinition> {
        self.pgns.get(&pgn)
    }

    /// First definition of `spn` in any PGN.
    pub fn find_spn(&self, spn: u32) -> Option<(&PgnDefinition, &SpnDefinition)> {
        self.pgns
            .values()
            .find_map(|p| p.spn(spn).map(|s| (p, s)))
    }

    /// Definition of `spn` within `pgn`.
    pub fn spn(&self, pgn: u32, spn: u32) -> Option<&SpnDefinition> {
        self.find_pgn(pgn).and_then(|p| p.spn(spn))
    }

    /// Definitions in ascending PGN order.
    pub fn pgns(&self) -> impl Iterator<Item = &PgnDefinition> {
        self.pgns.values()
    }

    pub fn len(&self) -> usize {
        self.pgns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pgns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(bit_length: u32) -> SpnDefinition {
        SpnDefinition::new(1, "test", 0, 0, bit_length, 1.0, 0.0, "")
    }

    #[test]
    fn eight_bit_sentinels() {
        let d = def(8);
        assert_eq!(d.classify(0xFF), SpnValue::NotAvailable);
        assert_eq!(d.classify(0xFE), SpnValue::Error);
        assert_eq!(d.classify(0xFA), SpnValue::Value(250.0));
    }

    #[test]
    fn sixteen_bit_sentinels() {
        let d = def(16);
        assert_eq!(d.classify(0xFFFF), SpnValue::NotAvailable);
        assert_eq!(d.classify(0xFF00), SpnValue::NotAvailable);
        assert_eq!(d.classify(0xFEFF), SpnValue::Error);
        assert_eq!(d.classify(0xFE00), SpnValue::Error);
        assert_eq!(d.classify(0xFAFF), SpnValue::Value(64255.0));
    }

    #[test]
    fn thirty_two_bit_sentinels() {
        let d = SpnDefinition::new(1, "test", 0, 0, 32, 1.0, 0.0, "");
        assert_eq!(d.classify(0xFFFF_FFFF), SpnValue::NotAvailable);
        assert_eq!(d.classify(0xFE12_3456), SpnValue::Error);
        assert_eq!(d.classify(0x0000_0010), SpnValue::Value(16.0));
    }

    #[test]
    fn two_bit_sentinels() {
        let d = def(2);
        assert_eq!(d.classify(0b11), SpnValue::NotAvailable);
        assert_eq!(d.classify(0b10), SpnValue::Error);
        assert_eq!(d.classify(0b01), SpnValue::Value(1.0));
    }

    #[test]
    fn scaled_engine_speed() {
        let spn = builtin().spn(PGN_ENGINE_SPEED, spns::ENGINE_SPEED).unwrap();
        let data = [0xFF, 0xFF, 0xFF, 0xE0, 0x2E, 0xFF, 0xFF, 0xFF];
        // 0x2EE0 = 12000 * 0.125 = 1500 rpm
        assert_eq!(spn.decode(PGN_ENGINE_SPEED, &data).unwrap(), SpnValue::Value(1500.0));
    }

    #[test]
    fn offset_is_applied() {
        let spn = builtin().spn(PGN_ENGINE_SPEED, spns::ACTUAL_ENGINE_TORQUE).unwrap();
        let data = [0xFF, 0xFF, 125, 0, 0, 0xFF, 0xFF, 0xFF];
        assert_eq!(spn.decode(PGN_ENGINE_SPEED, &data).unwrap(), SpnValue::Value(0.0));
    }

    #[test]
    fn sub_byte_fields() {
        let mil = builtin().spn(PGN_DM2, spns::MALFUNCTION_INDICATOR_LAMP).unwrap();
        let awl = builtin().spn(PGN_DM2, spns::AMBER_WARNING_LAMP).unwrap();
        let data = [0b0100_1100, 0xFF];
        assert_eq!(mil.raw(PGN_DM2, &data).unwrap(), 0b01);
        assert_eq!(awl.raw(PGN_DM2, &data).unwrap(), 0b11);
    }

    #[test]
    fn short_payload_is_decode_error() {
        let spn = builtin().spn(PGN_DM21, spns::MINUTES_SINCE_DTCS_CLEARED).unwrap();
        let err = spn.decode(PGN_DM21, &[0; 7]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                pgn: PGN_DM21,
                needed: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn big_endian_window() {
        let mut d = def(16);
        d.byte_order = ByteOrder::Big;
        assert_eq!(d.raw(0, &[0x12, 0x34]).unwrap(), 0x1234);
        d.byte_order = ByteOrder::Little;
        assert_eq!(d.raw(0, &[0x12, 0x34]).unwrap(), 0x3412);
    }

    #[test]
    fn encode_preserves_neighbouring_bits() {
        let rsl = builtin().spn(PGN_DM1, spns::RED_STOP_LAMP).unwrap();
        let mut data = [0xFF, 0xFF];
        rsl.encode_raw(PGN_DM1, 0b00, &mut data).unwrap();
        assert_eq!(data[0], 0b1100_1111);
        assert_eq!(data[1], 0xFF);
    }

    #[test]
    fn encode_scaled_value() {
        let spn = builtin().spn(PGN_ENGINE_SPEED, spns::ENGINE_SPEED).unwrap();
        let mut data = [0xFF; 8];
        spn.encode(PGN_ENGINE_SPEED, SpnValue::Value(1500.0), &mut data).unwrap();
        assert_eq!(&data[3..5], &[0xE0, 0x2E]);
        spn.encode(PGN_ENGINE_SPEED, SpnValue::Error, &mut data).unwrap();
        assert_eq!(&data[3..5], &[0xFF, 0xFE]);
        assert_eq!(spn.decode(PGN_ENGINE_SPEED, &data).unwrap(), SpnValue::Error);
    }

    #[test]
    fn encode_rejects_out_of_range() {
        let spn = builtin().spn(PGN_DM26, spns::WARM_UPS_SINCE_DTCS_CLEARED).unwrap();
        let mut data = [0; 8];
        assert!(spn.encode(PGN_DM26, SpnValue::Value(-1.0), &mut data).is_err());
    }

    #[test]
    fn builtin_covers_minimum_pgn_set() {
        for pgn in [
            PGN_DM21,
            PGN_ACKNOWLEDGMENT,
            PGN_REQUEST,
            PGN_ENGINE_SPEED,
            PGN_DM26,
            PGN_DM1,
            PGN_DM2,
        ] {
            assert!(builtin().find_pgn(pgn).is_some(), "missing PGN {pgn}");
        }
        assert_eq!(builtin().find_pgn(PGN_DM21).unwrap().required_length(), 8);
    }

    #[test]
    fn toml_extension_merges() {
        let text = r#"
[[pgn]]
pgn = 65262
label = "Engine Temperature 1"
acronym = "ET1"

[[pgn.spn]]
spn = 110
label = "Engine Coolant Temperature"
start_byte = 0
bit_length = 8
offset = -40.0
units = "C"
"#;
        let mut annex = DigitalAnnex::builtin();
        let before = annex.len();
        annex.merge(DigitalAnnex::from_toml_str(text).unwrap());
        assert_eq!(annex.len(), before + 1);

        let (pgn, spn) = annex.find_spn(110).unwrap();
        assert_eq!(pgn.acronym, "ET1");
        assert_eq!(spn.resolution, 1.0);
        assert_eq!(spn.decode(65262, &[130]).unwrap(), SpnValue::Value(90.0));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(matches!(
            DigitalAnnex::from_toml_str("[[pgn]]\npgn = \"x\""),
            Err(CatalogError::Parse(_))
        ));
    }

    fn extension_with(start_bit: u8, bit_length: u32) -> String {
        format!(
            "[[pgn]]\npgn = 65262\nlabel = \"ET1\"\n\n[[pgn.spn]]\nspn = 110\nlabel = \"Coolant\"\nstart_byte = 0\nstart_bit = {start_bit}\nbit_length = {bit_length}\n"
        )
    }

    #[test]
    fn extension_geometry_is_checked() {
        for (start_bit, bit_length) in [(70, 8), (8, 8), (0, 0), (0, 57), (7, 60)] {
            let result = DigitalAnnex::from_toml_str(&extension_with(start_bit, bit_length));
            assert!(
                matches!(result, Err(CatalogError::InvalidSpn { pgn: 65262, spn: 110, .. })),
                "start_bit {start_bit}, bit_length {bit_length} accepted"
            );
        }
        assert!(DigitalAnnex::from_toml_str(&extension_with(7, 56)).is_ok());
    }

    #[test]
    fn bad_geometry_is_a_decode_error() {
        let mut spn = SpnDefinition::new(110, "Coolant", 0, 0, 8, 1.0, -40.0, "C");
        spn.start_bit = 70;
        assert!(matches!(
            spn.decode(65262, &[0x11; 16]),
            Err(DecodeError::InvalidSpn { spn: 110, .. })
        ));
        let mut data = [0u8; 16];
        assert!(spn.encode(65262, SpnValue::Value(0.0), &mut data).is_err());
        assert_eq!(data, [0u8; 16]);
    }

    #[test]
    fn value_display() {
        assert_eq!(SpnValue::Value(1500.0).with_units("RPM"), "1500.000 RPM");
        assert_eq!(SpnValue::NotAvailable.with_units("RPM"), "Not Available");
        assert_eq!(SpnValue::Error.to_string(), "Error");
    }
}
