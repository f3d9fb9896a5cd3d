use std::fmt;

use crate::addresses::address_name;
use crate::catalog::{DigitalAnnex, SpnValue};
use crate::packet::Packet;

/// Packet of a PGN without a dedicated decoder. SPNs are sliced on demand
/// through a [`DigitalAnnex`].
#[derive(Debug, Clone)]
pub struct GenericPacket {
    packet: Packet,
}

impl GenericPacket {
    pub fn new(packet: Packet) -> Self {
        Self { packet }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Value of `spn`, `None` when the catalog has no definition for it in
    /// this PGN or the payload is too short.
    pub fn spn_value(&self, catalog: &DigitalAnnex, spn: u32) -> Option<SpnValue> {
        let pgn = self.packet.pgn();
        catalog
            .spn(pgn, spn)
            .and_then(|d| d.decode(pgn, self.packet.data()).ok())
    }

    /// Every cataloged SPN of this PGN with its label, value and units.
    pub fn spn_values(&self, catalog: &DigitalAnnex) -> Vec<(u32, String, Option<SpnValue>, String)> {
        let pgn = self.packet.pgn();
        catalog
            .find_pgn(pgn)
            .map(|definition| {
                definition
                    .spns
                    .iter()
                    .map(|d| {
                        (
                            d.spn,
                            d.label.clone(),
                            d.decode(pgn, self.packet.data()).ok(),
                            d.units.clone(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for GenericPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PGN {} from {}: {}",
            self.packet.pgn(),
            address_name(self.packet.source()),
            self.packet
        )
    }
}
