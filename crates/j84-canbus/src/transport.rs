//! J1939-21 transport protocol, receive side.
//!
//! Messages longer than 8 bytes arrive as a TP.CM announcement (BAM for
//! broadcast, RTS for destination-specific) followed by numbered TP.DT
//! frames carrying 7 bytes each. [`TransportReassembler`] tracks one session
//! per (source, destination) pair and hands back the complete message as a
//! single [`CanFrame`] whose identifier is that of the transported PGN.
//!
//! For RTS sessions addressed to the harness it also produces the replies the
//! sender is waiting for: a CTS for each batch of at most the RTS "maximum
//! packets per CTS", then an End-of-Message acknowledgment.
//!
//! A session that sees no frame within [`T1`] (or [`T2`] after a CTS) is
//! dropped; RTS senders get a timeout abort.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::*;

// ── TP.CM control bytes ─────────────────────────────────────────

pub const CM_RTS: u8 = 0x10;
pub const CM_CTS: u8 = 0x11;
pub const CM_END_OF_MESSAGE_ACK: u8 = 0x13;
pub const CM_BAM: u8 = 0x20;
pub const CM_ABORT: u8 = 0xFF;

/// Longest gap allowed between frames of one session.
pub const T1: Duration = Duration::from_millis(750);

/// Longest wait for the first TP.DT after a CTS.
pub const T2: Duration = Duration::from_millis(1250);

/// Connection abort reasons sent by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AbortReason {
    Timeout = 3,
    BadSequenceNumber = 7,
    MessageTooLarge = 9,
    Unknown = 250,
}

/// Priority of TP.CM frames sent by the harness.
const CM_PRIORITY: u8 = 7;

/// Bytes carried by one TP.DT frame.
const DT_PAYLOAD: usize = 7;

/// View over a TP.CM frame.
struct ConnectionManagement<'a>(&'a CanFrame);

impl ConnectionManagement<'_> {
    fn control(&self) -> u8 {
        self.0.data[0]
    }

    fn total_bytes(&self) -> usize {
        usize::from(self.0.data[1]) | (usize::from(self.0.data[2]) << 8)
    }

    fn total_packets(&self) -> u8 {
        self.0.data[3]
    }

    /// RTS limit on packets per CTS; 0xFF means the sender sets none.
    fn max_packets_per_cts(&self) -> u8 {
        match self.0.data[4] {
            0 | 0xFF => u8::MAX,
            n => n,
        }
    }

    fn message_pgn(&self) -> u32 {
        pgn_from_bytes(&self.0.data[5..8])
    }
}

struct Session {
    pgn: u32,
    priority: u8,
    needs_ack: bool,
    expected_bytes: usize,
    expected_packets: u8,
    next_sequence: u8,
    /// Packets granted per CTS.
    batch: u8,
    /// Last sequence number covered by the latest CTS.
    window_end: u8,
    deadline: Instant,
    data: Vec<u8>,
}

impl Session {
    /// Grant the next batch starting at `next_sequence`.
    fn grant(&mut self, now: Instant) -> u8 {
        let remaining = self.expected_packets - (self.next_sequence - 1);
        let count = remaining.min(self.batch);
        self.window_end = self.next_sequence - 1 + count;
        self.deadline = now + T2;
        count
    }
}

/// Result of feeding one frame to the reassembler.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TpOutput {
    /// Frames the harness must transmit (CTS, EOM ACK, abort).
    pub replies: Vec<CanFrame>,
    /// A complete message, either a non-TP frame passed through or a
    /// reassembled one.
    pub message: Option<CanFrame>,
}

impl TpOutput {
    fn message(frame: CanFrame) -> Self {
        Self {
            replies: Vec::new(),
            message: Some(frame),
        }
    }

    fn reply(frame: CanFrame) -> Self {
        Self {
            replies: vec![frame],
            message: None,
        }
    }
}

/// Reassembles BAM and RTS/CTS sessions from a stream of frames.
pub struct TransportReassembler {
    local_address: u8,
    sessions: HashMap<(u8, u8), Session>,
}

impl TransportReassembler {
    pub fn new(local_address: u8) -> Self {
        Self {
            local_address,
            sessions: HashMap::new(),
        }
    }

    /// Number of sessions awaiting data.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Feed one frame received now.
    pub fn accept(&mut self, frame: CanFrame) -> TpOutput {
        self.accept_at(frame, Instant::now())
    }

    /// Feed one frame received at `now`, expiring stale sessions first.
    pub fn accept_at(&mut self, frame: CanFrame, now: Instant) -> TpOutput {
        let timeouts = self.expire(now);
        let mut output = match frame.pgn() {
            PGN_TP_CM => self.connection_management(&frame, now),
            PGN_TP_DT => self.data_transfer(&frame, now),
            _ => TpOutput::message(frame),
        };
        if !timeouts.is_empty() {
            let mut replies = timeouts;
            replies.append(&mut output.replies);
            output.replies = replies;
        }
        output
    }

    /// Drop sessions past their deadline, returning aborts for RTS senders.
    fn expire(&mut self, now: Instant) -> Vec<CanFrame> {
        let expired: Vec<(u8, u8)> = self
            .sessions
            .iter()
            .filter(|(_, session)| now >= session.deadline)
            .map(|(&key, _)| key)
            .collect();
        let mut aborts = Vec::new();
        for key in expired {
            let Some(session) = self.sessions.remove(&key) else {
                continue;
            };
            tracing::warn!(
                source = key.0,
                pgn = session.pgn,
                received = session.data.len(),
                expected = session.expected_bytes,
                "TP session timed out"
            );
            if session.needs_ack {
                aborts.push(self.abort_frame(key.0, AbortReason::Timeout, session.pgn));
            }
        }
        aborts
    }

    fn control_frame(&self, destination: u8, data: [u8; 8]) -> CanFrame {
        CanFrame::j1939(CM_PRIORITY, PGN_TP_CM, destination, self.local_address, data.to_vec())
    }

    fn abort_frame(&self, destination: u8, reason: AbortReason, pgn: u32) -> CanFrame {
        let p = pgn_to_bytes(pgn);
        self.control_frame(destination, [CM_ABORT, reason as u8, 0xFF, 0xFF, 0xFF, p[0], p[1], p[2]])
    }

    fn connection_management(&mut self, frame: &CanFrame, now: Instant) -> TpOutput {
        if frame.data.len() < 8 {
            tracing::trace!(id = format_args!("{:08X}", frame.id), "short TP.CM ignored");
            return TpOutput::default();
        }
        let cm = ConnectionManagement(frame);
        let key = (frame.source(), frame.destination());
        match cm.control() {
            CM_BAM if frame.destination() == GLOBAL_ADDRESS => self.open(frame, &cm, false, now),
            CM_RTS if frame.destination() == self.local_address => self.open(frame, &cm, true, now),
            CM_ABORT => {
                if self.sessions.remove(&key).is_some() {
                    tracing::debug!(
                        source = frame.source(),
                        reason = frame.data[1],
                        pgn = cm.message_pgn(),
                        "TP session aborted by sender"
                    );
                }
                TpOutput::default()
            }
            _ => TpOutput::default(),
        }
    }

    fn open(&mut self, frame: &CanFrame, cm: &ConnectionManagement<'_>, needs_ack: bool, now: Instant) -> TpOutput {
        let source = frame.source();
        let pgn = cm.message_pgn();
        let bytes = cm.total_bytes();
        let packets = cm.total_packets();

        tracing::debug!(
            source,
            destination = frame.destination(),
            pgn,
            bytes,
            packets,
            kind = if needs_ack { "RTS" } else { "BAM" },
            "TP session announced"
        );

        let reject = if bytes > MAX_PAYLOAD {
            Some(AbortReason::MessageTooLarge)
        } else if packets == 0 || usize::from(packets) * DT_PAYLOAD < bytes {
            Some(AbortReason::Unknown)
        } else {
            None
        };
        if let Some(reason) = reject {
            tracing::warn!(source, pgn, bytes, packets, "rejecting TP session");
            self.sessions.remove(&(source, frame.destination()));
            return if needs_ack {
                TpOutput::reply(self.abort_frame(source, reason, pgn))
            } else {
                TpOutput::default()
            };
        }

        let mut session = Session {
            pgn,
            priority: frame.priority(),
            needs_ack,
            expected_bytes: bytes,
            expected_packets: packets,
            next_sequence: 1,
            batch: if needs_ack { cm.max_packets_per_cts() } else { packets },
            window_end: packets,
            deadline: now + T1,
            data: Vec::with_capacity(bytes),
        };
        let cts = needs_ack.then(|| {
            let count = session.grant(now);
            self.clear_to_send(source, &session, count)
        });
        if self.sessions.insert((source, frame.destination()), session).is_some() {
            tracing::warn!(source, pgn, "TP session restarted before completion");
        }

        match cts {
            Some(cts) => TpOutput::reply(cts),
            None => TpOutput::default(),
        }
    }

    fn clear_to_send(&self, destination: u8, session: &Session, count: u8) -> CanFrame {
        let p = pgn_to_bytes(session.pgn);
        self.control_frame(
            destination,
            [CM_CTS, count, session.next_sequence, 0xFF, 0xFF, p[0], p[1], p[2]],
        )
    }

    fn data_transfer(&mut self, frame: &CanFrame, now: Instant) -> TpOutput {
        let source = frame.source();
        let key = (source, frame.destination());
        let Some(session) = self.sessions.get_mut(&key) else {
            tracing::trace!(source, "TP.DT without session ignored");
            return TpOutput::default();
        };
        let Some((&sequence, payload)) = frame.data.split_first() else {
            return TpOutput::default();
        };

        if sequence != session.next_sequence {
            let pgn = session.pgn;
            let needs_ack = session.needs_ack;
            tracing::warn!(
                source,
                pgn,
                expected = session.next_sequence,
                got = sequence,
                "TP.DT out of sequence, dropping session"
            );
            self.sessions.remove(&key);
            return if needs_ack {
                TpOutput::reply(self.abort_frame(source, AbortReason::BadSequenceNumber, pgn))
            } else {
                TpOutput::default()
            };
        }

        // The last TP.DT is padded with 0xFF past the message end.
        let remaining = session.expected_bytes - session.data.len();
        let take = remaining.min(payload.len()).min(DT_PAYLOAD);
        session.data.extend_from_slice(&payload[..take]);
        session.next_sequence = session.next_sequence.wrapping_add(1);

        tracing::trace!(
            source,
            sequence,
            received = session.data.len(),
            expected = session.expected_bytes,
            "TP.DT"
        );

        let complete = session.data.len() >= session.expected_bytes
            || sequence >= session.expected_packets;
        if !complete {
            if session.needs_ack && sequence == session.window_end {
                let count = session.grant(now);
                tracing::trace!(source, next = session.next_sequence, count, "TP batch complete");
                let session = &self.sessions[&key];
                return TpOutput::reply(self.clear_to_send(source, session, count));
            }
            session.deadline = now + T1;
            return TpOutput::default();
        }

        let Some(session) = self.sessions.remove(&key) else {
            return TpOutput::default();
        };
        let destination = frame.destination();
        let message = CanFrame::j1939(session.priority, session.pgn, destination, source, session.data);
        tracing::debug!(
            source,
            pgn = session.pgn,
            bytes = message.data.len(),
            "TP message reassembled"
        );

        let mut output = TpOutput::message(message);
        if session.needs_ack {
            let b = session.expected_bytes;
            let p = pgn_to_bytes(session.pgn);
            output.replies.push(self.control_frame(
                source,
                [
                    CM_END_OF_MESSAGE_ACK,
                    (b & 0xFF) as u8,
                    (b >> 8) as u8,
                    session.expected_packets,
                    0xFF,
                    p[0],
                    p[1],
                    p[2],
                ],
            ));
        }
        output
    }
}
