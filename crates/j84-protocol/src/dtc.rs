use std::fmt;

use serde::{Deserialize, Serialize};

/// J1939-73 Diagnostic Trouble Code (conversion method version 4 layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiagnosticTroubleCode {
    /// Suspect Parameter Number (19 bits).
    pub spn: u32,
    /// Failure Mode Identifier (5 bits).
    pub fmi: u8,
    /// Occurrence count (7 bits, 0x7F = not available).
    pub occurrence_count: u8,
    /// SPN conversion method bit.
    pub conversion_method: u8,
}

impl DiagnosticTroubleCode {
    /// Encoded size on the wire.
    pub const LENGTH: usize = 4;

    pub const MAX_SPN: u32 = 0x7_FFFF;

    pub fn new(spn: u32, fmi: u8, occurrence_count: u8, conversion_method: u8) -> Self {
        Self {
            spn: spn & Self::MAX_SPN,
            fmi: fmi & 0x1F,
            occurrence_count: occurrence_count & 0x7F,
            conversion_method: conversion_method & 0x01,
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        let spn = u32::from(bytes[0])
            | (u32::from(bytes[1]) << 8)
            | (u32::from(bytes[2] & 0xE0) << 11);
        Self {
            spn,
            fmi: bytes[2] & 0x1F,
            occurrence_count: bytes[3] & 0x7F,
            conversion_method: (bytes[3] >> 7) & 0x01,
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.spn & 0xFF) as u8,
            ((self.spn >> 8) & 0xFF) as u8,
            (((self.spn >> 11) & 0xE0) as u8) | (self.fmi & 0x1F),
            ((self.conversion_method & 0x01) << 7) | (self.occurrence_count & 0x7F),
        ]
    }

    /// The filler DTC transmitted when no fault is present.
    pub fn is_empty_slot(bytes: &[u8]) -> bool {
        bytes.iter().all(|&b| b == 0x00) || bytes.iter().all(|&b| b == 0xFF)
    }
}

impl fmt::Display for DiagnosticTroubleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DTC {}:{} - {} times",
            self.spn, self.fmi, self.occurrence_count
        )
    }
}

/// Two-bit lamp indicator state from a DM1/DM2 lamp byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LampStatus {
    Off,
    On,
    Reserved,
    NotSupported,
}

impl LampStatus {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => LampStatus::Off,
            0b01 => LampStatus::On,
            0b10 => LampStatus::Reserved,
            _ => LampStatus::NotSupported,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            LampStatus::Off => 0b00,
            LampStatus::On => 0b01,
            LampStatus::Reserved => 0b10,
            LampStatus::NotSupported => 0b11,
        }
    }
}

impl fmt::Display for LampStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LampStatus::Off => "off",
            LampStatus::On => "on",
            LampStatus::Reserved => "reserved",
            LampStatus::NotSupported => "not supported",
        };
        f.write_str(s)
    }
}
