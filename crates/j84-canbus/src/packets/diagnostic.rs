//! DM1 / DM2: lamp status followed by a list of DTCs.

use std::fmt;
use std::ops::Deref;

use j84_protocol::{DiagnosticTroubleCode, LampStatus};

use super::{ParsedPacket, TypedPacket, spn_raw, validate};
use crate::catalog::spns;
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::*;

/// Lamp byte plus flash byte.
const HEADER_LENGTH: usize = 2;

/// Shared layout of DM1 and DM2.
#[derive(Debug, Clone)]
pub struct DiagnosticTroubleCodePacket {
    packet: Packet,
    dtcs: Vec<DiagnosticTroubleCode>,
}

impl DiagnosticTroubleCodePacket {
    fn decode(packet: Packet, pgn: u32) -> Result<Self, DecodeError> {
        validate(&packet, pgn)?;
        let needed = HEADER_LENGTH + DiagnosticTroubleCode::LENGTH;
        if packet.len() < needed {
            return Err(DecodeError::TooShort {
                pgn,
                needed,
                actual: packet.len(),
            });
        }
        let dtcs = packet.data()[HEADER_LENGTH..]
            .chunks_exact(DiagnosticTroubleCode::LENGTH)
            .filter(|slot| !DiagnosticTroubleCode::is_empty_slot(slot))
            .map(|slot| DiagnosticTroubleCode::from_bytes([slot[0], slot[1], slot[2], slot[3]]))
            .collect();
        Ok(Self { packet, dtcs })
    }

    fn build(
        pgn: u32,
        source: u8,
        lamps: [LampStatus; 4],
        dtcs: &[DiagnosticTroubleCode],
    ) -> Result<Self, DecodeError> {
        let mut data = vec![0x00, 0xFF];
        let lamp_spns = [
            spns::MALFUNCTION_INDICATOR_LAMP,
            spns::RED_STOP_LAMP,
            spns::AMBER_WARNING_LAMP,
            spns::PROTECT_LAMP,
        ];
        for (spn, lamp) in lamp_spns.into_iter().zip(lamps) {
            let definition = crate::catalog::builtin()
                .spn(pgn, spn)
                .ok_or_else(|| DecodeError::InvalidSpn {
                    spn,
                    reason: "lamp not defined".into(),
                })?;
            definition.encode_raw(pgn, u64::from(lamp.bits()), &mut data)?;
        }
        if dtcs.is_empty() {
            data.extend_from_slice(&[0x00; DiagnosticTroubleCode::LENGTH]);
        } else {
            for dtc in dtcs {
                data.extend_from_slice(&dtc.to_bytes());
            }
        }
        if data.len() < 8 {
            data.resize(8, 0xFF);
        }
        Self::decode(Packet::create(6, pgn, GLOBAL_ADDRESS, source, data), pgn)
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    fn lamp(&self, spn: u32) -> LampStatus {
        LampStatus::from_bits(spn_raw(self.packet.pgn(), spn, self.packet.data()) as u8)
    }

    pub fn mil_status(&self) -> LampStatus {
        self.lamp(spns::MALFUNCTION_INDICATOR_LAMP)
    }

    pub fn red_stop_lamp_status(&self) -> LampStatus {
        self.lamp(spns::RED_STOP_LAMP)
    }

    pub fn amber_warning_lamp_status(&self) -> LampStatus {
        self.lamp(spns::AMBER_WARNING_LAMP)
    }

    pub fn protect_lamp_status(&self) -> LampStatus {
        self.lamp(spns::PROTECT_LAMP)
    }

    /// Reported DTCs, filler slots excluded.
    pub fn dtcs(&self) -> &[DiagnosticTroubleCode] {
        &self.dtcs
    }

    fn fmt_with_name(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{name} from {}: MIL: {}, RSL: {}, AWL: {}, PL: {}",
            crate::addresses::address_name(self.packet.source()),
            self.mil_status(),
            self.red_stop_lamp_status(),
            self.amber_warning_lamp_status(),
            self.protect_lamp_status(),
        )?;
        if self.dtcs.is_empty() {
            write!(f, ", No DTCs")
        } else {
            for dtc in &self.dtcs {
                write!(f, "\n{dtc}")?;
            }
            Ok(())
        }
    }
}

macro_rules! dtc_packet {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $pgn:expr, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(DiagnosticTroubleCodePacket);

        impl $name {
            /// Broadcast packet from `source` with the given lamps
            /// (MIL, RSL, AWL, PL) and DTCs.
            pub fn create(
                source: u8,
                mil: LampStatus,
                red_stop: LampStatus,
                amber_warning: LampStatus,
                protect: LampStatus,
                dtcs: &[DiagnosticTroubleCode],
            ) -> Result<Self, DecodeError> {
                DiagnosticTroubleCodePacket::build(
                    $pgn,
                    source,
                    [mil, red_stop, amber_warning, protect],
                    dtcs,
                )
                .map(Self)
            }
        }

        impl Deref for $name {
            type Target = DiagnosticTroubleCodePacket;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl TypedPacket for $name {
            const PGN: u32 = $pgn;
            const NAME: &'static str = $label;

            fn decode(packet: Packet) -> Result<Self, DecodeError> {
                DiagnosticTroubleCodePacket::decode(packet, $pgn).map(Self)
            }

            fn packet(&self) -> &Packet {
                &self.0.packet
            }

            fn from_parsed(parsed: &ParsedPacket) -> Option<&Self> {
                match parsed {
                    ParsedPacket::$variant(p) => Some(p),
                    _ => None,
                }
            }

            fn into_parsed(self) -> ParsedPacket {
                ParsedPacket::$variant(self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt_with_name($label, f)
            }
        }
    };
}

dtc_packet!(
    /// DM1 Active Diagnostic Trouble Codes.
    Dm1, Dm1, PGN_DM1, "DM1"
);
dtc_packet!(
    /// DM2 Previously Active Diagnostic Trouble Codes.
    Dm2, Dm2, PGN_DM2, "DM2"
);
