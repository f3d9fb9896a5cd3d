use std::fmt;

use super::{ParsedPacket, TypedPacket, distance_text, put_spn, spn_value, validate};
use crate::addresses::address_name;
use crate::catalog::{SpnValue, spns};
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// DM21 Diagnostic Readiness 2: distance and engine time with the MIL on and
/// since DTCs were last cleared.
#[derive(Debug, Clone)]
pub struct Dm21 {
    packet: Packet,
}

impl Dm21 {
    /// Packet from `source` to `destination` with the four values in
    /// kilometers and minutes.
    pub fn create(
        source: u8,
        destination: u8,
        km_while_mil_on: SpnValue,
        km_since_dtcs_cleared: SpnValue,
        minutes_while_mil_on: SpnValue,
        minutes_since_dtcs_cleared: SpnValue,
    ) -> Result<Self, DecodeError> {
        let mut data = vec![0xFF; 8];
        put_spn(PGN_DM21, spns::DISTANCE_WHILE_MIL_ACTIVATED, km_while_mil_on, &mut data)?;
        put_spn(PGN_DM21, spns::DISTANCE_SINCE_DTCS_CLEARED, km_since_dtcs_cleared, &mut data)?;
        put_spn(PGN_DM21, spns::MINUTES_WHILE_MIL_ACTIVATED, minutes_while_mil_on, &mut data)?;
        put_spn(PGN_DM21, spns::MINUTES_SINCE_DTCS_CLEARED, minutes_since_dtcs_cleared, &mut data)?;
        Self::decode(Packet::create(6, PGN_DM21, destination, source, data))
    }

    fn value(&self, spn: u32) -> SpnValue {
        spn_value(PGN_DM21, spn, self.packet.data())
    }

    /// SPN 3069.
    pub fn km_while_mil_on(&self) -> SpnValue {
        self.value(spns::DISTANCE_WHILE_MIL_ACTIVATED)
    }

    /// SPN 3294.
    pub fn km_since_dtcs_cleared(&self) -> SpnValue {
        self.value(spns::DISTANCE_SINCE_DTCS_CLEARED)
    }

    /// SPN 3295.
    pub fn minutes_while_mil_on(&self) -> SpnValue {
        self.value(spns::MINUTES_WHILE_MIL_ACTIVATED)
    }

    /// SPN 3296.
    pub fn minutes_since_dtcs_cleared(&self) -> SpnValue {
        self.value(spns::MINUTES_SINCE_DTCS_CLEARED)
    }

    pub fn miles_while_mil_on(&self) -> Option<f64> {
        self.km_while_mil_on().value().map(|km| km * KM_TO_MILES_FACTOR)
    }

    pub fn miles_since_dtcs_cleared(&self) -> Option<f64> {
        self.km_since_dtcs_cleared()
            .value()
            .map(|km| km * KM_TO_MILES_FACTOR)
    }
}

impl TypedPacket for Dm21 {
    const PGN: u32 = PGN_DM21;
    const NAME: &'static str = "DM21";

    fn decode(packet: Packet) -> Result<Self, DecodeError> {
        validate(&packet, PGN_DM21)?;
        Ok(Self { packet })
    }

    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
        match parsed {
            ParsedPacket::Dm21(p) => Some(p),
            _ => None,
        }
    }

    fn into_parsed(self) -> ParsedPacket {
        ParsedPacket::Dm21(self)
    }
}

impl fmt::Display for Dm21 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DM21 from {}: [", address_name(self.packet.source()))?;
        writeln!(
            f,
            "  Distance Traveled While MIL is Activated:     {}",
            distance_text(self.km_while_mil_on())
        )?;
        writeln!(
            f,
            "  Time Run by Engine While MIL is Activated:    {}",
            self.minutes_while_mil_on().with_units("minutes")
        )?;
        writeln!(
            f,
            "  Distance Since DTCs Cleared:                  {}",
            distance_text(self.km_since_dtcs_cleared())
        )?;
        writeln!(
            f,
            "  Time Since DTCs Cleared:                      {}",
            self.minutes_since_dtcs_cleared().with_units("minutes")
        )?;
        write!(f, "]")
    }
}
