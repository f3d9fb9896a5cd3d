use std::fmt;

use super::{ParsedPacket, TypedPacket, put_spn, spn_raw, spn_value, validate};
use crate::addresses::address_name;
use crate::catalog::{SpnValue, spns};
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// DM26 Diagnostic Readiness 3: monitor readiness for the current trip.
#[derive(Debug, Clone)]
pub struct Dm26 {
    packet: Packet,
}

impl Dm26 {
    pub fn create(
        source: u8,
        seconds_since_engine_start: SpnValue,
        warm_ups_since_dtcs_cleared: u8,
    ) -> Result<Self, DecodeError> {
        let mut data = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        put_spn(PGN_DM26, spns::TIME_SINCE_ENGINE_START, seconds_since_engine_start, &mut data)?;
        data[2] = warm_ups_since_dtcs_cleared;
        Self::decode(Packet::create(6, PGN_DM26, GLOBAL_ADDRESS, source, data))
    }

    /// SPN 3301 in seconds.
    pub fn time_since_engine_start(&self) -> SpnValue {
        spn_value(PGN_DM26, spns::TIME_SINCE_ENGINE_START, self.packet.data())
    }

    /// SPN 3302.
    pub fn warm_ups_since_dtcs_cleared(&self) -> SpnValue {
        spn_value(PGN_DM26, spns::WARM_UPS_SINCE_DTCS_CLEARED, self.packet.data())
    }

    pub fn continuously_monitored_this_cycle(&self) -> u8 {
        spn_raw(PGN_DM26, spns::CONTINUOUSLY_MONITORED_THIS_CYCLE, self.packet.data()) as u8
    }

    pub fn non_continuously_enabled_this_cycle(&self) -> u16 {
        spn_raw(PGN_DM26, spns::NON_CONTINUOUS_ENABLED_THIS_CYCLE, self.packet.data()) as u16
    }

    pub fn non_continuously_complete_this_cycle(&self) -> u16 {
        spn_raw(PGN_DM26, spns::NON_CONTINUOUS_COMPLETE_THIS_CYCLE, self.packet.data()) as u16
    }
}

impl TypedPacket for Dm26 {
    const PGN: u32 = PGN_DM26;
    const NAME: &'static str = "DM26";

    fn decode(packet: Packet) -> Result<Self, DecodeError> {
        validate(&packet, PGN_DM26)?;
        Ok(Self { packet })
    }

    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
        match parsed {
            ParsedPacket::Dm26(p) => Some(p),
            _ => None,
        }
    }

    fn into_parsed(self) -> ParsedPacket {
        ParsedPacket::Dm26(self)
    }
}

impl fmt::Display for Dm26 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DM26 from {}: Warm-ups: {}, Time Since Engine Start: {}",
            address_name(self.packet.source()),
            self.warm_ups_since_dtcs_cleared(),
            self.time_since_engine_start().with_units("seconds"),
        )
    }
}
