//! Immutable received (or about-to-be-sent) J1939 packet.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::types::{CanFrame, build_id, hex_bytes};

/// A complete J1939 message: identifier, reassembled payload and the time it
/// was received. Fields are private; a packet never changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    id: u32,
    data: Vec<u8>,
    timestamp: DateTime<Utc>,
}

impl Packet {
    pub fn new(id: u32, data: Vec<u8>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id & 0x1FFF_FFFF,
            data,
            timestamp,
        }
    }

    /// Build from J1939 fields, stamped with the current time.
    pub fn create(priority: u8, pgn: u32, destination: u8, source: u8, data: Vec<u8>) -> Self {
        Self::new(build_id(priority, pgn, destination, source), data, Utc::now())
    }

    /// Same identifier and payload, different receive time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn from_frame(frame: CanFrame, timestamp: DateTime<Utc>) -> Self {
        Self::new(frame.id, frame.data, timestamp)
    }

    /// Frame view of this packet (payload may exceed 8 bytes).
    pub fn to_frame(&self) -> CanFrame {
        CanFrame::new(self.id, self.data.clone())
    }

    fn frame_view(&self) -> CanFrame {
        CanFrame::new(self.id, Vec::new())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn priority(&self) -> u8 {
        self.frame_view().priority()
    }

    pub fn pgn(&self) -> u32 {
        self.frame_view().pgn()
    }

    pub fn source(&self) -> u8 {
        self.frame_view().source()
    }

    pub fn destination(&self) -> u8 {
        self.frame_view().destination()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn bytes_at(&self, index: usize, width: usize) -> Result<&[u8], DecodeError> {
        self.data
            .get(index..index + width)
            .ok_or(DecodeError::TooShort {
                pgn: self.pgn(),
                needed: index + width,
                actual: self.data.len(),
            })
    }

    fn le_at(&self, index: usize, width: usize) -> Result<u32, DecodeError> {
        Ok(self
            .bytes_at(index, width)?
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    pub fn get_u8(&self, index: usize) -> Result<u8, DecodeError> {
        Ok(self.bytes_at(index, 1)?[0])
    }

    /// Little-endian 16-bit value at `index`.
    pub fn get_u16(&self, index: usize) -> Result<u16, DecodeError> {
        Ok(self.le_at(index, 2)? as u16)
    }

    /// Little-endian 24-bit value at `index`.
    pub fn get_u24(&self, index: usize) -> Result<u32, DecodeError> {
        self.le_at(index, 3)
    }

    /// Little-endian 32-bit value at `index`.
    pub fn get_u32(&self, index: usize) -> Result<u32, DecodeError> {
        self.le_at(index, 4)
    }

    /// Equal identifier and payload, ignoring the receive timestamp.
    pub fn same_content(&self, other: &Packet) -> bool {
        self.id == other.id && self.data == other.data
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X} [{}] {}", self.id, self.data.len(), hex_bytes(&self.data))
    }
}
