//! Core CAN frame type, J1939 identifier layout and well-known constants.

// ── Parameter Group Numbers ─────────────────────────────────────

/// DM21 Diagnostic Readiness 2.
pub const PGN_DM21: u32 = 49408;
/// Acknowledgment.
pub const PGN_ACKNOWLEDGMENT: u32 = 59392;
/// Request.
pub const PGN_REQUEST: u32 = 59904;
/// TP.DT transport data transfer.
pub const PGN_TP_DT: u32 = 60160;
/// TP.CM transport connection management.
pub const PGN_TP_CM: u32 = 60416;
/// EEC1 Electronic Engine Controller 1 (engine speed).
pub const PGN_ENGINE_SPEED: u32 = 61444;
/// DM26 Diagnostic Readiness 3.
pub const PGN_DM26: u32 = 64952;
/// DM1 Active Diagnostic Trouble Codes.
pub const PGN_DM1: u32 = 65226;
/// DM2 Previously Active Diagnostic Trouble Codes.
pub const PGN_DM2: u32 = 65227;
/// DM5 Diagnostic Readiness 1.
pub const PGN_DM5: u32 = 65230;

// ── Addresses ───────────────────────────────────────────────────

/// Destination address for broadcast (global) traffic.
pub const GLOBAL_ADDRESS: u8 = 0xFF;
/// Off-board diagnostic service tool #1, the harness' default address.
pub const DEFAULT_TOOL_ADDRESS: u8 = 0xF9;
/// Engine #1.
pub const ENGINE_ADDRESS: u8 = 0x00;

/// Default priority for requests.
pub const REQUEST_PRIORITY: u8 = 6;

/// Largest payload J1939-21 transport can carry (255 packets x 7 bytes).
pub const MAX_PAYLOAD: usize = 1785;

/// Multiply kilometers by this to get miles.
pub const KM_TO_MILES_FACTOR: f64 = 0.6213712;

/// PDU1 (destination-specific) PGNs have a PDU format below 240.
pub fn is_pdu1(pgn: u32) -> bool {
    ((pgn >> 8) & 0xFF) < 240
}

/// Build a 29-bit identifier: priority(3) | EDP(1) | DP(1) | PF(8) | PS(8) | SA(8).
///
/// For PDU1 PGNs the PS field carries `destination`; for PDU2 it is part of
/// the PGN and `destination` is ignored.
pub fn build_id(priority: u8, pgn: u32, destination: u8, source: u8) -> u32 {
    let mut id = (u32::from(priority & 0x07) << 26) | ((pgn & 0x3_FFFF) << 8) | u32::from(source);
    if is_pdu1(pgn) {
        id = (id & !0xFF00) | (u32::from(destination) << 8);
    }
    id
}

// ── CAN Frame ───────────────────────────────────────────────────

/// A CAN 2.0B frame with a 29-bit identifier.
///
/// Frames handed to the bus layer by the transport reassembler may carry up
/// to [`MAX_PAYLOAD`] bytes; frames on the wire carry at most 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// 29-bit extended identifier.
    pub id: u32,
    pub data: Vec<u8>,
}

impl CanFrame {
    pub fn new(id: u32, data: Vec<u8>) -> Self {
        Self {
            id: id & 0x1FFF_FFFF,
            data,
        }
    }

    /// Build a frame from its J1939 fields.
    pub fn j1939(priority: u8, pgn: u32, destination: u8, source: u8, data: Vec<u8>) -> Self {
        Self::new(build_id(priority, pgn, destination, source), data)
    }

    /// Request PG (59904) asking `destination` for `pgn`.
    pub fn request(pgn: u32, destination: u8, source: u8) -> Self {
        Self::j1939(
            REQUEST_PRIORITY,
            PGN_REQUEST,
            destination,
            source,
            pgn_to_bytes(pgn).to_vec(),
        )
    }

    pub fn priority(&self) -> u8 {
        ((self.id >> 26) & 0x07) as u8
    }

    pub fn pdu_format(&self) -> u8 {
        ((self.id >> 16) & 0xFF) as u8
    }

    pub fn pdu_specific(&self) -> u8 {
        ((self.id >> 8) & 0xFF) as u8
    }

    pub fn pgn(&self) -> u32 {
        let pgn = (self.id >> 8) & 0x3_FFFF;
        if self.pdu_format() < 240 {
            pgn & 0x3_FF00
        } else {
            pgn
        }
    }

    pub fn source(&self) -> u8 {
        (self.id & 0xFF) as u8
    }

    /// Destination address, `GLOBAL_ADDRESS` for PDU2 frames.
    pub fn destination(&self) -> u8 {
        if self.pdu_format() < 240 {
            self.pdu_specific()
        } else {
            GLOBAL_ADDRESS
        }
    }
}

/// Little-endian 24-bit PGN encoding used by Request, Acknowledgment and TP.CM.
pub fn pgn_to_bytes(pgn: u32) -> [u8; 3] {
    [
        (pgn & 0xFF) as u8,
        ((pgn >> 8) & 0xFF) as u8,
        ((pgn >> 16) & 0xFF) as u8,
    ]
}

pub fn pgn_from_bytes(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(3)
        .enumerate()
        .fold(0, |acc, (i, &b)| acc | (u32::from(b) << (8 * i)))
}

/// Space-separated upper-case hex, e.g. `00 FF 1A`.
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_identifier_fields() {
        // DM2 from engine #1 at priority 6
        let frame = CanFrame::new(0x18FECB00, vec![0; 8]);
        assert_eq!(frame.priority(), 6);
        assert_eq!(frame.pgn(), PGN_DM2);
        assert_eq!(frame.source(), 0x00);
        assert_eq!(frame.destination(), GLOBAL_ADDRESS);
    }

    #[test]
    fn destination_specific_identifier_fields() {
        // Request from the tool to engine #2
        let frame = CanFrame::new(0x18EA01F9, vec![0xCB, 0xFE, 0x00]);
        assert_eq!(frame.pgn(), PGN_REQUEST);
        assert_eq!(frame.destination(), 0x01);
        assert_eq!(frame.source(), 0xF9);
    }

    #[test]
    fn build_request_frame() {
        let frame = CanFrame::request(PGN_DM2, 0xFF, DEFAULT_TOOL_ADDRESS);
        assert_eq!(frame.id, 0x18EAFFF9);
        assert_eq!(frame.data, vec![0xCB, 0xFE, 0x00]);
    }

    #[test]
    fn pdu2_ignores_destination() {
        assert_eq!(build_id(6, PGN_DM1, 0x17, 0x00), 0x18FECA00);
    }

    #[test]
    fn pdu_classification() {
        assert!(is_pdu1(PGN_REQUEST));
        assert!(is_pdu1(PGN_ACKNOWLEDGMENT));
        assert!(is_pdu1(PGN_DM21));
        assert!(!is_pdu1(PGN_DM1));
        assert!(!is_pdu1(PGN_ENGINE_SPEED));
    }

    #[test]
    fn pgn_byte_encoding() {
        assert_eq!(pgn_to_bytes(PGN_DM21), [0x00, 0xC1, 0x00]);
        assert_eq!(pgn_from_bytes(&[0x00, 0xC1, 0x00]), PGN_DM21);
        assert_eq!(pgn_from_bytes(&pgn_to_bytes(0x3_FFFF)), 0x3_FFFF);
    }

    #[test]
    fn masks_to_29_bits() {
        assert_eq!(CanFrame::new(0xFFFF_FFFF, vec![]).id, 0x1FFF_FFFF);
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(hex_bytes(&[0x00, 0xFF, 0x1A]), "00 FF 1A");
        assert_eq!(hex_bytes(&[]), "");
    }
}
