use std::fmt;

use super::{ParsedPacket, TypedPacket, put_spn, spn_raw, validate};
use crate::addresses::address_name;
use crate::catalog::{SpnValue, spns};
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// Compliance value of an ECU that does not claim OBD.
pub const NOT_INTENDED_FOR_OBD: u8 = 5;

/// DM5 Diagnostic Readiness 1.
#[derive(Debug, Clone)]
pub struct Dm5 {
    packet: Packet,
}

impl Dm5 {
    pub fn create(
        source: u8,
        active_count: u8,
        previously_active_count: u8,
        obd_compliance: u8,
    ) -> Result<Self, DecodeError> {
        let mut data = vec![0x00; 8];
        put_spn(PGN_DM5, spns::ACTIVE_DTC_COUNT, SpnValue::Value(active_count.into()), &mut data)?;
        put_spn(
            PGN_DM5,
            spns::PREVIOUSLY_ACTIVE_DTC_COUNT,
            SpnValue::Value(previously_active_count.into()),
            &mut data,
        )?;
        data[2] = obd_compliance;
        Self::decode(Packet::create(6, PGN_DM5, GLOBAL_ADDRESS, source, data))
    }

    fn raw(&self, spn: u32) -> u64 {
        spn_raw(PGN_DM5, spn, self.packet.data())
    }

    pub fn active_code_count(&self) -> u8 {
        self.raw(spns::ACTIVE_DTC_COUNT) as u8
    }

    pub fn previously_active_code_count(&self) -> u8 {
        self.raw(spns::PREVIOUSLY_ACTIVE_DTC_COUNT) as u8
    }

    /// Raw SPN 1220 value.
    pub fn obd_compliance(&self) -> u8 {
        self.raw(spns::OBD_COMPLIANCE) as u8
    }

    /// The ECU claims OBD: compliance is neither "not intended" nor
    /// reserved / not available.
    pub fn is_obd(&self) -> bool {
        let compliance = self.obd_compliance();
        compliance != NOT_INTENDED_FOR_OBD && compliance < 0xFB
    }

    pub fn continuously_monitored_systems(&self) -> u8 {
        self.raw(spns::CONTINUOUSLY_MONITORED_SYSTEMS) as u8
    }

    pub fn non_continuously_monitored_support(&self) -> u16 {
        self.raw(spns::NON_CONTINUOUS_SUPPORT) as u16
    }

    pub fn non_continuously_monitored_status(&self) -> u16 {
        self.raw(spns::NON_CONTINUOUS_STATUS) as u16
    }
}

/// Text for SPN 1220 values.
pub fn obd_compliance_name(value: u8) -> &'static str {
    match value {
        1 => "OBD II",
        2 => "OBD",
        3 => "OBD and OBD II",
        4 => "OBD I",
        5 => "Not intended to meet OBD II requirements",
        6 => "EOBD",
        7 => "EOBD and OBD II",
        8 => "EOBD and OBD",
        9 => "EOBD, OBD and OBD II",
        10 => "JOBD",
        11 => "JOBD and OBD II",
        12 => "JOBD and EOBD",
        13 => "JOBD, EOBD and OBD II",
        14 => "Heavy Duty Vehicles (EURO IV) B1",
        15 => "Heavy Duty Vehicles (EURO V) B2",
        16 => "Heavy Duty Vehicles (EURO EEC) C",
        17 => "Engine Manufacturer Diagnostics (EMD)",
        18 => "Engine Manufacturer Diagnostics Enhanced (EMD+)",
        19 => "Heavy Duty On-Board Diagnostics (Partial)",
        20 => "Heavy Duty On-Board Diagnostics",
        21 => "World Wide Harmonized Heavy Duty OBD",
        0xFB..=0xFD => "Reserved for SAE",
        0xFE => "Error",
        0xFF => "Not available",
        _ => "Reserved",
    }
}

impl TypedPacket for Dm5 {
    const PGN: u32 = PGN_DM5;
    const NAME: &'static str = "DM5";

    fn decode(packet: Packet) -> Result<Self, DecodeError> {
        validate(&packet, PGN_DM5)?;
        Ok(Self { packet })
    }

    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
        match parsed {
            ParsedPacket::Dm5(p) => Some(p),
            _ => None,
        }
    }

    fn into_parsed(self) -> ParsedPacket {
        ParsedPacket::Dm5(self)
    }
}

impl fmt::Display for Dm5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DM5 from {}: OBD Compliance: {} ({}), Active Codes: {}, Previously Active Codes: {}",
            address_name(self.packet.source()),
            obd_compliance_name(self.obd_compliance()),
            self.obd_compliance(),
            self.active_code_count(),
            self.previously_active_code_count(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn obd_classification() {
        assert!(Dm5::create(0, 0, 0, 20).unwrap().is_obd());
        assert!(Dm5::create(0, 0, 0, 1).unwrap().is_obd());
        assert!(!Dm5::create(0, 0, 0, NOT_INTENDED_FOR_OBD).unwrap().is_obd());
        assert!(!Dm5::create(0, 0, 0, 0xFB).unwrap().is_obd());
        assert!(!Dm5::create(0, 0, 0, 0xFF).unwrap().is_obd());
    }

    #[test]
    fn decode_fields() {
        let packet = Packet::new(
            0x18FECE01,
            vec![0x02, 0x01, 0x14, 0x37, 0xE0, 0x1E, 0xE0, 0x1E],
            Utc::now(),
        );
        let dm5 = Dm5::decode(packet).unwrap();
        assert_eq!(dm5.active_code_count(), 2);
        assert_eq!(dm5.previously_active_code_count(), 1);
        assert_eq!(dm5.obd_compliance(), 20);
        assert_eq!(dm5.continuously_monitored_systems(), 0x37);
        assert_eq!(dm5.non_continuously_monitored_support(), 0x1EE0);
        assert_eq!(dm5.source(), 1);
    }

    #[test]
    fn display_form() {
        let dm5 = Dm5::create(0, 0, 0, 20).unwrap();
        assert_eq!(
            dm5.to_string(),
            "DM5 from Engine #1 (0): OBD Compliance: Heavy Duty On-Board Diagnostics (20), Active Codes: 0, Previously Active Codes: 0"
        );
    }
}
