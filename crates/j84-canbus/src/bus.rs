//! J1939 request/response transactions.
//!
//! [`J1939Bus`] sends Request PGs and collects the answers inside the
//! J1939-21 timing windows. Received frames pass through the transport
//! reassembler first, so multi-frame responses arrive as single packets.
//! Every wait is raced against the run-wide [`CancelToken`]; a cancelled
//! transaction reports `cancelled` instead of a timeout.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::error::{BusError, BusResult, DecodeError};
use crate::interface::CanInterface;
use crate::packet::Packet;
use crate::packets::{AcknowledgmentPacket, TypedPacket};
use crate::transport::TransportReassembler;
use crate::types::*;

/// Protocol timing used by the transaction primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTiming {
    /// How long responses to a global request are collected.
    pub global_window: Duration,
    /// Wait per destination-specific attempt.
    pub ds_timeout: Duration,
    /// Extra destination-specific attempts when nothing arrives.
    pub ds_retries: u32,
}

impl Default for BusTiming {
    fn default() -> Self {
        Self {
            global_window: Duration::from_millis(1250),
            ds_timeout: Duration::from_millis(220),
            ds_retries: 2,
        }
    }
}

/// A response that matched the transaction but could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub source: u8,
    pub pgn: u32,
    pub error: DecodeError,
}

/// Everything collected during one global request (or listen) window.
#[derive(Debug, Clone)]
pub struct GlobalResponse<T> {
    /// Decoded packets in receive order.
    pub packets: Vec<T>,
    /// Acknowledgments about the requested PGN.
    pub acks: Vec<AcknowledgmentPacket>,
    pub decode_errors: Vec<DecodeFailure>,
    /// The window was cut short by cancellation.
    pub cancelled: bool,
}

impl<T> Default for GlobalResponse<T> {
    fn default() -> Self {
        Self {
            packets: Vec::new(),
            acks: Vec::new(),
            decode_errors: Vec::new(),
            cancelled: false,
        }
    }
}

/// Outcome of one destination-specific request.
#[derive(Debug, Clone)]
pub enum DsResponse<T> {
    Packet(T),
    /// An Acknowledgment (ACK, NACK, Denied or Busy) for the requested PGN.
    Ack(AcknowledgmentPacket),
    /// The module answered with a payload that does not decode.
    Invalid(DecodeFailure),
    /// Nothing arrived in any attempt.
    Timeout,
    Cancelled,
}

impl<T> DsResponse<T> {
    pub fn packet(&self) -> Option<&T> {
        match self {
            DsResponse::Packet(p) => Some(p),
            _ => None,
        }
    }

    pub fn ack(&self) -> Option<&AcknowledgmentPacket> {
        match self {
            DsResponse::Ack(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_nack(&self) -> bool {
        self.ack().is_some_and(AcknowledgmentPacket::is_nack)
    }
}

/// Longest single wait on the adapter, so frames queued mid-wait are seen promptly.
const POLL_SLICE: Duration = Duration::from_millis(50);

enum Next {
    Packet(Packet),
    Deadline,
    Cancelled,
}

/// Serial J1939 transaction engine over a [`CanInterface`].
pub struct J1939Bus {
    interface: Arc<dyn CanInterface>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    tool_address: u8,
    timing: BusTiming,
    reassembler: Mutex<TransportReassembler>,
}

impl J1939Bus {
    pub fn new(
        interface: Arc<dyn CanInterface>,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
        tool_address: u8,
    ) -> Self {
        Self {
            interface,
            clock,
            cancel,
            tool_address,
            timing: BusTiming::default(),
            reassembler: Mutex::new(TransportReassembler::new(tool_address)),
        }
    }

    pub fn with_timing(mut self, timing: BusTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn tool_address(&self) -> u8 {
        self.tool_address
    }

    pub fn timing(&self) -> BusTiming {
        self.timing
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn send(&self, frame: &CanFrame) -> BusResult<()> {
        tracing::debug!(
            id = %format_args!("{:08X}", frame.id),
            data = %hex_bytes(&frame.data),
            "TX"
        );
        self.interface.send_frame(frame).await
    }

    /// Next complete packet before `deadline`.
    async fn next_packet(&self, deadline: Instant) -> BusResult<Next> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Next::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Next::Deadline);
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Next::Cancelled),
                r = self.interface.recv_frame((deadline - now).min(POLL_SLICE)) => r,
            };

            let frame = match received {
                Ok(frame) => frame,
                Err(BusError::Timeout { .. }) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "CAN receive failed");
                    return Err(e);
                }
            };
            tracing::debug!(
                id = %format_args!("{:08X}", frame.id),
                data = %hex_bytes(&frame.data),
                "RX"
            );

            let output = self
                .reassembler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .accept(frame);
            for reply in &output.replies {
                self.send(reply).await?;
            }
            if let Some(message) = output.message {
                return Ok(Next::Packet(Packet::from_frame(message, self.clock.now())));
            }
        }
    }

    fn addressed_to_us(&self, packet: &Packet) -> bool {
        let destination = packet.destination();
        destination == GLOBAL_ADDRESS || destination == self.tool_address
    }

    /// Collect packets of `T::PGN` (and acknowledgments for it when
    /// `with_acks`) until `deadline`.
    async fn collect<T: TypedPacket>(
        &self,
        deadline: Instant,
        with_acks: bool,
    ) -> BusResult<GlobalResponse<T>> {
        let mut response = GlobalResponse::default();
        loop {
            let packet = match self.next_packet(deadline).await? {
                Next::Packet(packet) => packet,
                Next::Deadline => break,
                Next::Cancelled => {
                    response.cancelled = true;
                    break;
                }
            };
            if !self.addressed_to_us(&packet) {
                continue;
            }
            let source = packet.source();
            let pgn = packet.pgn();
            if pgn == T::PGN {
                match T::decode(packet) {
                    Ok(p) => response.packets.push(p),
                    Err(error) => response.decode_errors.push(DecodeFailure { source, pgn, error }),
                }
            } else if with_acks && pgn == PGN_ACKNOWLEDGMENT {
                match AcknowledgmentPacket::decode(packet) {
                    Ok(ack) if ack.acknowledged_pgn() == T::PGN => response.acks.push(ack),
                    Ok(_) => {}
                    Err(error) => response.decode_errors.push(DecodeFailure { source, pgn, error }),
                }
            }
        }
        Ok(response)
    }

    /// Request `T::PGN` from every node and collect answers for the global window.
    pub async fn request_global<T: TypedPacket>(&self) -> BusResult<GlobalResponse<T>> {
        let request = CanFrame::request(T::PGN, GLOBAL_ADDRESS, self.tool_address);
        self.send(&request).await?;
        let deadline = Instant::now() + self.timing.global_window;
        let response = self.collect::<T>(deadline, true).await?;
        tracing::debug!(
            pgn = T::PGN,
            name = T::NAME,
            packets = response.packets.len(),
            acks = response.acks.len(),
            decode_errors = response.decode_errors.len(),
            cancelled = response.cancelled,
            "global request complete"
        );
        Ok(response)
    }

    /// Request `T::PGN` from `address`, retrying when nothing arrives.
    pub async fn request_ds<T: TypedPacket>(&self, address: u8) -> BusResult<DsResponse<T>> {
        let request = CanFrame::request(T::PGN, address, self.tool_address);
        for attempt in 0..=self.timing.ds_retries {
            self.send(&request).await?;
            let deadline = Instant::now() + self.timing.ds_timeout;
            loop {
                let packet = match self.next_packet(deadline).await? {
                    Next::Packet(packet) => packet,
                    Next::Deadline => break,
                    Next::Cancelled => return Ok(DsResponse::Cancelled),
                };
                if packet.source() != address || !self.addressed_to_us(&packet) {
                    continue;
                }
                let pgn = packet.pgn();
                let result = if pgn == T::PGN {
                    match T::decode(packet) {
                        Ok(p) => DsResponse::Packet(p),
                        Err(error) => DsResponse::Invalid(DecodeFailure {
                            source: address,
                            pgn,
                            error,
                        }),
                    }
                } else if pgn == PGN_ACKNOWLEDGMENT {
                    match AcknowledgmentPacket::decode(packet) {
                        Ok(ack) if ack.acknowledged_pgn() == T::PGN => DsResponse::Ack(ack),
                        _ => continue,
                    }
                } else {
                    continue;
                };
                tracing::debug!(pgn = T::PGN, name = T::NAME, address, attempt, "DS request answered");
                return Ok(result);
            }
            tracing::debug!(pgn = T::PGN, name = T::NAME, address, attempt, "DS request timed out");
        }
        Ok(DsResponse::Timeout)
    }

    /// Collect broadcasts of `T::PGN` for `window` without sending a request.
    pub async fn listen<T: TypedPacket>(&self, window: Duration) -> BusResult<GlobalResponse<T>> {
        let deadline = Instant::now() + window;
        self.collect::<T>(deadline, false).await
    }
}
