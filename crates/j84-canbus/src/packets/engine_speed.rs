use std::fmt;

use super::{ParsedPacket, TypedPacket, put_spn, spn_value, validate};
use crate::addresses::address_name;
use crate::catalog::{SpnValue, spns};
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// EEC1, read for Engine Speed (SPN 190).
#[derive(Debug, Clone)]
pub struct EngineSpeed {
    packet: Packet,
}

impl EngineSpeed {
    /// EEC1 broadcast from `source` with only the engine speed populated.
    pub fn create(source: u8, rpm: SpnValue) -> Result<Self, DecodeError> {
        let mut data = vec![0xFF; 8];
        put_spn(PGN_ENGINE_SPEED, spns::ENGINE_SPEED, rpm, &mut data)?;
        Self::decode(Packet::create(3, PGN_ENGINE_SPEED, GLOBAL_ADDRESS, source, data))
    }

    /// Engine speed in rpm.
    pub fn engine_speed(&self) -> SpnValue {
        spn_value(PGN_ENGINE_SPEED, spns::ENGINE_SPEED, self.packet.data())
    }

    pub fn is_error(&self) -> bool {
        self.engine_speed().is_error()
    }

    pub fn is_not_available(&self) -> bool {
        self.engine_speed().is_not_available()
    }
}

impl TypedPacket for EngineSpeed {
    const PGN: u32 = PGN_ENGINE_SPEED;
    const NAME: &'static str = "Engine Speed";

    fn decode(packet: Packet) -> Result<Self, DecodeError> {
        validate(&packet, PGN_ENGINE_SPEED)?;
        Ok(Self { packet })
    }

    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
        match parsed {
            ParsedPacket::EngineSpeed(p) => Some(p),
            _ => None,
        }
    }

    fn into_parsed(self) -> ParsedPacket {
        ParsedPacket::EngineSpeed(self)
    }
}

impl fmt::Display for EngineSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Engine Speed from {}: {}",
            address_name(self.packet.source()),
            self.engine_speed().with_units("RPM")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn decode_speed() {
        let packet = Packet::new(
            0x0CF00400,
            vec![0xF0, 0x7D, 0x7D, 0x00, 0x1A, 0xFF, 0xFF, 0xFF],
            Utc::now(),
        );
        let eec1 = EngineSpeed::decode(packet).unwrap();
        // 0x1A00 * 0.125
        assert_eq!(eec1.engine_speed(), SpnValue::Value(832.0));
        assert!(!eec1.is_error());
    }

    #[test]
    fn sentinels() {
        assert!(EngineSpeed::create(0, SpnValue::NotAvailable).unwrap().is_not_available());
        assert!(EngineSpeed::create(0, SpnValue::Error).unwrap().is_error());
    }

    #[test]
    fn create_and_display() {
        let eec1 = EngineSpeed::create(0, SpnValue::Value(650.5)).unwrap();
        assert_eq!(eec1.packet().id(), 0x0CF00400);
        assert_eq!(eec1.to_string(), "Engine Speed from Engine #1 (0): 650.500 RPM");
    }

    #[test]
    fn short_payload() {
        let packet = Packet::new(0x0CF00400, vec![0xF0, 0x7D, 0x7D, 0x00], Utc::now());
        assert!(EngineSpeed::decode(packet).is_err());
    }
}
