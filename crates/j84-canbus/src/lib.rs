//! J1939 bus access for the J1939-84 compliance harness.
//!
//! Layers, leaves first: raw frames and identifiers ([`types`]), the Digital
//! Annex SPN catalog ([`catalog`]), immutable received packets ([`packet`])
//! and their typed PGN views ([`packets`]), J1939-21 transport reassembly
//! ([`transport`]), the adapter seam ([`interface`]) and finally the
//! request/response transactions of [`bus::J1939Bus`].

pub mod addresses;
pub mod bus;
pub mod cancel;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod interface;
pub mod mock;
pub mod packet;
pub mod packets;
pub mod transport;
pub mod types;

pub use bus::{BusTiming, DecodeFailure, DsResponse, GlobalResponse, J1939Bus};
pub use cancel::CancelToken;
pub use catalog::{CatalogError, DigitalAnnex, PgnDefinition, SpnDefinition, SpnValue};
pub use clock::{Clock, SystemClock, TestClock};
pub use error::{BusError, BusResult, DecodeError};
pub use interface::CanInterface;
pub use mock::MockCanInterface;
pub use packet::Packet;
pub use packets::{ParsedPacket, TypedPacket};
pub use types::CanFrame;

#[cfg(target_os = "linux")]
pub use interface::SocketCanInterface;
