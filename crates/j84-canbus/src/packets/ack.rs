use std::fmt;

use super::{ParsedPacket, TypedPacket, spn_raw, validate};
use crate::addresses::address_name;
use crate::catalog::spns;
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// Acknowledgment control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResponse {
    Ack,
    Nack,
    Denied,
    Busy,
    Unknown(u8),
}

impl AckResponse {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => AckResponse::Ack,
            1 => AckResponse::Nack,
            2 => AckResponse::Denied,
            3 => AckResponse::Busy,
            other => AckResponse::Unknown(other),
        }
    }

    pub fn byte(&self) -> u8 {
        match self {
            AckResponse::Ack => 0,
            AckResponse::Nack => 1,
            AckResponse::Denied => 2,
            AckResponse::Busy => 3,
            AckResponse::Unknown(b) => *b,
        }
    }
}

impl fmt::Display for AckResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckResponse::Ack => f.write_str("ACK"),
            AckResponse::Nack => f.write_str("NACK"),
            AckResponse::Denied => f.write_str("Denied"),
            AckResponse::Busy => f.write_str("Busy"),
            AckResponse::Unknown(b) => write!(f, "Unknown({b})"),
        }
    }
}

/// Acknowledgment (PGN 59392).
#[derive(Debug, Clone)]
pub struct AcknowledgmentPacket {
    packet: Packet,
}

impl AcknowledgmentPacket {
    /// Response from `source` to `address` about `pgn`.
    pub fn create(source: u8, response: AckResponse, pgn: u32, address: u8) -> Result<Self, DecodeError> {
        let mut data = vec![response.byte(), 0xFF, 0xFF, 0xFF, address];
        data.extend_from_slice(&pgn_to_bytes(pgn));
        Self::decode(Packet::create(6, PGN_ACKNOWLEDGMENT, GLOBAL_ADDRESS, source, data))
    }

    pub fn response(&self) -> AckResponse {
        AckResponse::from_byte(spn_raw(PGN_ACKNOWLEDGMENT, spns::ACK_CONTROL_BYTE, self.packet.data()) as u8)
    }

    pub fn group_function(&self) -> u8 {
        spn_raw(PGN_ACKNOWLEDGMENT, spns::ACK_GROUP_FUNCTION, self.packet.data()) as u8
    }

    /// Address the acknowledgment is directed at.
    pub fn address(&self) -> u8 {
        spn_raw(PGN_ACKNOWLEDGMENT, spns::ACK_ADDRESS, self.packet.data()) as u8
    }

    /// PGN being acknowledged.
    pub fn acknowledged_pgn(&self) -> u32 {
        spn_raw(PGN_ACKNOWLEDGMENT, spns::ACK_PGN, self.packet.data()) as u32
    }

    pub fn is_nack(&self) -> bool {
        self.response() == AckResponse::Nack
    }
}

impl TypedPacket for AcknowledgmentPacket {
    const PGN: u32 = PGN_ACKNOWLEDGMENT;
    const NAME: &'static str = "Acknowledgment";

    fn decode(packet: Packet) -> Result<Self, DecodeError> {
        validate(&packet, PGN_ACKNOWLEDGMENT)?;
        Ok(Self { packet })
    }

    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
        match parsed {
            ParsedPacket::Acknowledgment(p) => Some(p),
            _ => None,
        }
    }

    fn into_parsed(self) -> ParsedPacket {
        ParsedPacket::Acknowledgment(self)
    }
}

impl fmt::Display for AcknowledgmentPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Acknowledgment from {}: Response: {}, Group Function: {}, Address Acknowledged: {}, PGN Requested: {}",
            address_name(self.packet.source()),
            self.response(),
            self.group_function(),
            self.address(),
            self.acknowledged_pgn(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn decode_nack() {
        let packet = Packet::new(
            0x18E8FF01,
            vec![0x01, 0xFF, 0xFF, 0xFF, 0xF9, 0xCB, 0xFE, 0x00],
            Utc::now(),
        );
        let ack = AcknowledgmentPacket::decode(packet).unwrap();
        assert_eq!(ack.response(), AckResponse::Nack);
        assert!(ack.is_nack());
        assert_eq!(ack.group_function(), 0xFF);
        assert_eq!(ack.address(), DEFAULT_TOOL_ADDRESS);
        assert_eq!(ack.acknowledged_pgn(), PGN_DM2);
        assert_eq!(ack.source(), 1);
    }

    #[test]
    fn control_bytes() {
        for (byte, expected) in [
            (0, AckResponse::Ack),
            (1, AckResponse::Nack),
            (2, AckResponse::Denied),
            (3, AckResponse::Busy),
            (9, AckResponse::Unknown(9)),
        ] {
            assert_eq!(AckResponse::from_byte(byte), expected);
            assert_eq!(expected.byte(), byte);
        }
    }

    #[test]
    fn create_layout() {
        let ack = AcknowledgmentPacket::create(1, AckResponse::Busy, PGN_DM21, DEFAULT_TOOL_ADDRESS).unwrap();
        assert_eq!(ack.packet().id(), 0x18E8FF01);
        assert_eq!(ack.packet().data(), &[0x03, 0xFF, 0xFF, 0xFF, 0xF9, 0x00, 0xC1, 0x00]);
        assert!(!ack.is_nack());
    }

    #[test]
    fn display_form() {
        let ack = AcknowledgmentPacket::create(1, AckResponse::Nack, PGN_DM2, DEFAULT_TOOL_ADDRESS).unwrap();
        assert_eq!(
            ack.to_string(),
            "Acknowledgment from Engine #2 (1): Response: NACK, Group Function: 255, Address Acknowledged: 249, PGN Requested: 65227"
        );
    }
}
