use std::fmt;

use super::{ParsedPacket, TypedPacket, spn_raw, validate};
use crate::addresses::address_name;
use crate::catalog::spns;
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// Request (PGN 59904) for another PGN.
#[derive(Debug, Clone)]
pub struct RequestPacket {
    packet: Packet,
}

impl RequestPacket {
    pub fn create(requested_pgn: u32, destination: u8, source: u8) -> Result<Self, DecodeError> {
        let frame = CanFrame::request(requested_pgn, destination, source);
        Self::decode(Packet::create(
            frame.priority(),
            PGN_REQUEST,
            destination,
            source,
            frame.data,
        ))
    }

    pub fn requested_pgn(&self) -> u32 {
        spn_raw(PGN_REQUEST, spns::REQUESTED_PGN, self.packet.data()) as u32
    }

    pub fn is_global(&self) -> bool {
        self.packet.destination() == GLOBAL_ADDRESS
    }
}

impl TypedPacket for RequestPacket {
    const PGN: u32 = PGN_REQUEST;
    const NAME: &'static str = "Request";

    fn decode(packet: Packet) -> Result<Self, DecodeError> {
        validate(&packet, PGN_REQUEST)?;
        Ok(Self { packet })
    }

    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
        match parsed {
            ParsedPacket::Request(p) => Some(p),
            _ => None,
        }
    }

    fn into_parsed(self) -> ParsedPacket {
        ParsedPacket::Request(self)
    }
}

impl fmt::Display for RequestPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request from {} to {} for PGN {}",
            address_name(self.packet.source()),
            address_name(self.packet.destination()),
            self.requested_pgn()
        )
    }
}
