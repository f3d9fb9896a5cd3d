//! Typed PGN views over [`Packet`] and the static PGN → decoder registry.
//!
//! Each typed packet keeps the original [`Packet`] and reads its SPNs through
//! the built-in Digital Annex, so re-encoding a decoded packet is simply its
//! payload. Payload length is validated once in `decode`; accessors after that
//! cannot fail.

mod ack;
mod diagnostic;
mod dm21;
mod dm26;
mod dm5;
mod engine_speed;
mod generic;
mod request;

use std::fmt;

pub use ack::{AckResponse, AcknowledgmentPacket};
pub use diagnostic::{DiagnosticTroubleCodePacket, Dm1, Dm2};
pub use dm21::Dm21;
pub use dm26::Dm26;
pub use dm5::{Dm5, NOT_INTENDED_FOR_OBD, obd_compliance_name};
pub use engine_speed::EngineSpeed;
pub use generic::GenericPacket;
pub use request::RequestPacket;

use crate::addresses::address_name;
use crate::catalog::{self, SpnValue};
use crate::error::DecodeError;
use crate::packet::Packet;

/// A PGN-specific view over a [`Packet`].
pub trait TypedPacket: Sized + Clone + fmt::Display + Send + Sync + 'static {
    const PGN: u32;
    /// Short name used in logs and report lines, e.g. `DM2`.
    const NAME: &'static str;

    /// Decode `packet`, failing when the PGN or the payload length is wrong.
    fn decode(packet: Packet) -> Result<Self, DecodeError>;

    fn packet(&self) -> &Packet;

    fn from_parsed(parsed: &ParsedPacket) -> Option<&Self>;

    fn into_parsed(self) -> ParsedPacket;

    fn source(&self) -> u8 {
        self.packet().source()
    }

    /// Report label of the sender, e.g. `Engine #1 (0)`.
    fn module_name(&self) -> String {
        address_name(self.source())
    }
}

/// Decoded packet tagged by PGN.
#[derive(Debug, Clone)]
pub enum ParsedPacket {
    Dm1(Dm1),
    Dm2(Dm2),
    Dm5(Dm5),
    Dm21(Dm21),
    Dm26(Dm26),
    EngineSpeed(EngineSpeed),
    Acknowledgment(AcknowledgmentPacket),
    Request(RequestPacket),
    Generic(GenericPacket),
}

impl ParsedPacket {
    pub fn packet(&self) -> &Packet {
        match self {
            ParsedPacket::Dm1(p) => p.packet(),
            ParsedPacket::Dm2(p) => p.packet(),
            ParsedPacket::Dm5(p) => p.packet(),
            ParsedPacket::Dm21(p) => p.packet(),
            ParsedPacket::Dm26(p) => p.packet(),
            ParsedPacket::EngineSpeed(p) => p.packet(),
            ParsedPacket::Acknowledgment(p) => p.packet(),
            ParsedPacket::Request(p) => p.packet(),
            ParsedPacket::Generic(p) => p.packet(),
        }
    }

    pub fn pgn(&self) -> u32 {
        self.packet().pgn()
    }

    pub fn source(&self) -> u8 {
        self.packet().source()
    }

    /// Typed view when this packet carries `T`.
    pub fn get<T: TypedPacket>(&self) -> Option<&T> {
        T::from_parsed(self)
    }
}

impl fmt::Display for ParsedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedPacket::Dm1(p) => p.fmt(f),
            ParsedPacket::Dm2(p) => p.fmt(f),
            ParsedPacket::Dm5(p) => p.fmt(f),
            ParsedPacket::Dm21(p) => p.fmt(f),
            ParsedPacket::Dm26(p) => p.fmt(f),
            ParsedPacket::EngineSpeed(p) => p.fmt(f),
            ParsedPacket::Acknowledgment(p) => p.fmt(f),
            ParsedPacket::Request(p) => p.fmt(f),
            ParsedPacket::Generic(p) => p.fmt(f),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────

type Decoder = fn(Packet) -> Result<ParsedPacket, DecodeError>;

fn decode_as<T: TypedPacket>(packet: Packet) -> Result<ParsedPacket, DecodeError> {
    T::decode(packet).map(T::into_parsed)
}

static REGISTRY: &[(u32, Decoder)] = &[
    (Dm1::PGN, decode_as::<Dm1>),
    (Dm2::PGN, decode_as::<Dm2>),
    (Dm5::PGN, decode_as::<Dm5>),
    (Dm21::PGN, decode_as::<Dm21>),
    (Dm26::PGN, decode_as::<Dm26>),
    (EngineSpeed::PGN, decode_as::<EngineSpeed>),
    (AcknowledgmentPacket::PGN, decode_as::<AcknowledgmentPacket>),
    (RequestPacket::PGN, decode_as::<RequestPacket>),
];

/// Whether `pgn` has a dedicated typed decoder.
pub fn is_registered(pgn: u32) -> bool {
    REGISTRY.iter().any(|(p, _)| *p == pgn)
}

/// Decode `packet` with the decoder registered for its PGN, falling back to
/// [`GenericPacket`] for any other PGN.
pub fn parse(packet: Packet) -> Result<ParsedPacket, DecodeError> {
    let pgn = packet.pgn();
    match REGISTRY.iter().find(|(p, _)| *p == pgn) {
        Some((_, decoder)) => decoder(packet),
        None => Ok(ParsedPacket::Generic(GenericPacket::new(packet))),
    }
}

// ── Shared helpers ──────────────────────────────────────────────

/// Verify PGN and minimum payload length against the built-in catalog.
fn validate(packet: &Packet, expected: u32) -> Result<(), DecodeError> {
    if packet.pgn() != expected {
        return Err(DecodeError::WrongPgn {
            expected,
            actual: packet.pgn(),
        });
    }
    match catalog::builtin().find_pgn(expected) {
        Some(definition) => definition.validate(packet.data()),
        None => Ok(()),
    }
}

/// Read `spn` of `pgn` through the built-in catalog.
fn spn_value(pgn: u32, spn: u32, data: &[u8]) -> SpnValue {
    catalog::builtin()
        .spn(pgn, spn)
        .and_then(|d| d.decode(pgn, data).ok())
        .unwrap_or(SpnValue::NotAvailable)
}

/// Raw bits of `spn`; zero when the SPN is undefined or out of range.
fn spn_raw(pgn: u32, spn: u32, data: &[u8]) -> u64 {
    catalog::builtin()
        .spn(pgn, spn)
        .and_then(|d| d.raw(pgn, data).ok())
        .unwrap_or(0)
}

/// Write `value` for `spn` into a payload being built.
fn put_spn(pgn: u32, spn: u32, value: SpnValue, data: &mut [u8]) -> Result<(), DecodeError> {
    let definition = catalog::builtin()
        .spn(pgn, spn)
        .ok_or_else(|| DecodeError::InvalidSpn {
            spn,
            reason: format!("not defined for PGN {pgn}"),
        })?;
    definition.encode(pgn, value, data)
}

/// `12.000 km (7.456 mi)` style distance text.
fn distance_text(km: SpnValue) -> String {
    match km {
        SpnValue::Value(v) => format!(
            "{v:.3} km ({:.3} mi)",
            v * crate::types::KM_TO_MILES_FACTOR
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::Utc;

    #[test]
    fn registry_covers_minimum_set() {
        for pgn in [
            PGN_DM21,
            PGN_ACKNOWLEDGMENT,
            PGN_REQUEST,
            PGN_ENGINE_SPEED,
            PGN_DM26,
            PGN_DM1,
            PGN_DM2,
            PGN_DM5,
        ] {
            assert!(is_registered(pgn), "PGN {pgn} not registered");
        }
    }

    #[test]
    fn parse_selects_typed_view() {
        let packet = Packet::new(0x18FECB00, vec![0x00, 0xFF, 0, 0, 0, 0, 0xFF, 0xFF], Utc::now());
        let parsed = parse(packet).unwrap();
        assert!(parsed.get::<Dm2>().is_some());
        assert!(parsed.get::<Dm1>().is_none());
        assert_eq!(parsed.source(), 0);
    }

    #[test]
    fn unknown_pgn_is_generic() {
        let packet = Packet::new(0x18FEEE00, vec![130, 0xFF, 0xFF, 0xFF], Utc::now());
        let parsed = parse(packet).unwrap();
        assert!(matches!(parsed, ParsedPacket::Generic(_)));
        assert_eq!(parsed.pgn(), 65262);
    }

    #[test]
    fn short_registered_payload_fails() {
        let packet = Packet::new(0x18C1F900, vec![0; 5], Utc::now());
        assert!(matches!(
            parse(packet),
            Err(DecodeError::TooShort { pgn: PGN_DM21, needed: 8, actual: 5 })
        ));
    }

    const ROUND_TRIP_PGNS: [u32; 8] = [
        PGN_DM1,
        PGN_DM2,
        PGN_DM5,
        PGN_DM21,
        PGN_DM26,
        PGN_ENGINE_SPEED,
        PGN_ACKNOWLEDGMENT,
        PGN_REQUEST,
    ];

    /// Payloads of the declared length for `pgn`, including sentinel patterns.
    fn sample_payloads(pgn: u32) -> Vec<Vec<u8>> {
        let definition = catalog::builtin().find_pgn(pgn).unwrap();
        let len = definition.required_length();
        let mut errors = vec![0xFF; len];
        for spn in &definition.spns {
            spn.encode(pgn, SpnValue::Error, &mut errors).unwrap();
        }
        vec![
            vec![0x00; len],
            (1..=len as u8).collect(),
            vec![0xFF; len],
            errors,
        ]
    }

    #[test]
    fn every_spn_reencodes_to_its_payload() {
        for pgn in ROUND_TRIP_PGNS {
            let definition = catalog::builtin().find_pgn(pgn).unwrap();
            for data in sample_payloads(pgn) {
                for spn in &definition.spns {
                    let value = spn.decode(pgn, &data).unwrap();
                    let mut rebuilt = data.clone();
                    spn.encode(pgn, value, &mut rebuilt).unwrap();
                    assert_eq!(rebuilt, data, "PGN {pgn} SPN {} value {value}", spn.spn);
                }
            }
        }
    }

    fn dtc_payload(lamps: u8, dtcs: &[[u8; 4]]) -> Vec<u8> {
        let mut data = vec![lamps, 0xFF];
        if dtcs.is_empty() {
            data.extend_from_slice(&[0x00; 4]);
        }
        for dtc in dtcs {
            data.extend_from_slice(dtc);
        }
        data.resize(data.len().max(8), 0xFF);
        data
    }

    #[test]
    fn dtc_packets_recreate_their_payload() {
        let codes = [[0x66, 0x00, 0x04, 0x01], [0xFE, 0xFF, 0xFF, 0x7F], [0x9D, 0x0D, 0xE3, 0x80]];
        let payloads = [
            dtc_payload(0x00, &[]),
            dtc_payload(0b0100_0000, &codes[..1]),
            dtc_payload(0xFF, &codes[..2]),
            dtc_payload(0b1001_0110, &codes),
        ];
        for data in payloads {
            let dm1 = Dm1::decode(Packet::new(0x18FECA00, data.clone(), Utc::now())).unwrap();
            let rebuilt = Dm1::create(
                dm1.source(),
                dm1.mil_status(),
                dm1.red_stop_lamp_status(),
                dm1.amber_warning_lamp_status(),
                dm1.protect_lamp_status(),
                dm1.dtcs(),
            )
            .unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());

            let dm2 = Dm2::decode(Packet::new(0x18FECB00, data.clone(), Utc::now())).unwrap();
            let rebuilt = Dm2::create(
                dm2.source(),
                dm2.mil_status(),
                dm2.red_stop_lamp_status(),
                dm2.amber_warning_lamp_status(),
                dm2.protect_lamp_status(),
                dm2.dtcs(),
            )
            .unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());
        }
    }

    #[test]
    fn readiness_packets_recreate_their_payload() {
        for counts in [[0x00, 0x00, 0x13], [0x03, 0x01, 0x05], [0xFE, 0xFF, 0xFF]] {
            let mut data = counts.to_vec();
            data.resize(8, 0x00);
            let dm5 = Dm5::decode(Packet::new(0x18FECE00, data.clone(), Utc::now())).unwrap();
            let rebuilt = Dm5::create(
                dm5.source(),
                dm5.active_code_count(),
                dm5.previously_active_code_count(),
                dm5.obd_compliance(),
            )
            .unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());
        }

        for data in [
            vec![0x0A, 0x00, 0x14, 0x00, 0x1E, 0x00, 0x28, 0x00],
            vec![0xFF, 0xFF, 0xFF, 0xFE, 0x34, 0x12, 0x00, 0x00],
            vec![0xFF, 0xFD, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFE],
        ] {
            let dm21 = Dm21::decode(Packet::new(0x18C1F900, data.clone(), Utc::now())).unwrap();
            let rebuilt = Dm21::create(
                dm21.source(),
                dm21.packet().destination(),
                dm21.km_while_mil_on(),
                dm21.km_since_dtcs_cleared(),
                dm21.minutes_while_mil_on(),
                dm21.minutes_since_dtcs_cleared(),
            )
            .unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());
            assert_eq!(rebuilt.packet().id(), 0x18C1F900);
        }

        for data in [
            vec![0x6A, 0x01, 0x05, 0, 0, 0, 0, 0],
            vec![0xFF, 0xFF, 0x00, 0, 0, 0, 0, 0],
            vec![0xFF, 0xFE, 0xFD, 0, 0, 0, 0, 0],
        ] {
            let dm26 = Dm26::decode(Packet::new(0x18FDB800, data.clone(), Utc::now())).unwrap();
            let SpnValue::Value(warm_ups) = dm26.warm_ups_since_dtcs_cleared() else {
                panic!("warm-ups not a value: {data:02X?}");
            };
            let rebuilt = Dm26::create(dm26.source(), dm26.time_since_engine_start(), warm_ups as u8).unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());
        }
    }

    #[test]
    fn engine_speed_recreates_its_payload() {
        for speed in [[0x00, 0x00], [0xE0, 0x2E], [0xFF, 0xFA], [0xFF, 0xFE], [0xFF, 0xFF]] {
            let mut data = vec![0xFF; 8];
            data[3..5].copy_from_slice(&speed);
            let eec1 = EngineSpeed::decode(Packet::new(0x0CF00400, data.clone(), Utc::now())).unwrap();
            let rebuilt = EngineSpeed::create(eec1.source(), eec1.engine_speed()).unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());
        }
    }

    #[test]
    fn ack_and_request_recreate_their_payload() {
        for (control, address, pgn) in [(0x00, 0xF9, [0xCB, 0xFE, 0x00]), (0x01, 0x00, [0xB8, 0xFD, 0x00]), (0xFE, 0xFF, [0xFF, 0xFF, 0x03])] {
            let mut data = vec![control, 0xFF, 0xFF, 0xFF, address];
            data.extend_from_slice(&pgn);
            let ack = AcknowledgmentPacket::decode(Packet::new(0x18E8FF00, data.clone(), Utc::now())).unwrap();
            assert_eq!(ack.group_function(), 0xFF);
            let rebuilt =
                AcknowledgmentPacket::create(ack.source(), ack.response(), ack.acknowledged_pgn(), ack.address()).unwrap();
            assert_eq!(rebuilt.packet().data(), data.as_slice());
        }

        for data in [[0xCB, 0xFE, 0x00], [0x00, 0xEE, 0x00], [0xFE, 0xFF, 0x03]] {
            let request = RequestPacket::decode(Packet::new(0x18EA00F9, data.to_vec(), Utc::now())).unwrap();
            let rebuilt =
                RequestPacket::create(request.requested_pgn(), request.packet().destination(), request.source()).unwrap();
            assert_eq!(rebuilt.packet().data(), &data);
            assert_eq!(rebuilt.packet().destination(), 0x00);
        }
    }

    #[test]
    fn wrong_pgn_is_rejected() {
        let packet = Packet::new(0x18FECA00, vec![0; 8], Utc::now());
        assert!(matches!(
            Dm2::decode(packet),
            Err(DecodeError::WrongPgn { expected: PGN_DM2, actual: PGN_DM1 })
        ));
    }
}
