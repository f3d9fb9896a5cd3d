//! Mock CAN interface for testing.
//!
//! Supports a scripted FIFO of frames, request → response rules, periodic
//! broadcasts and frame recording. All tests use this instead of real CAN hardware so the suite
//! runs in CI on any platform.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{BusError, BusResult};
use crate::interface::CanInterface;
use crate::types::{CanFrame, PGN_REQUEST, pgn_from_bytes};

/// Frames queued whenever a Request for `pgn` addressed to `destination` is sent.
struct Rule {
    pgn: u32,
    destination: u8,
    frames: Vec<CanFrame>,
    /// `None` answers every matching request.
    remaining: Option<usize>,
}

/// A frame repeated on the bus every `period`, like EEC1.
struct Periodic {
    frame: CanFrame,
    period: Duration,
    next_due: Instant,
}

/// Mock CAN interface with scripted responses and frame recording.
///
/// `recv_frame` on an empty queue waits out the full timeout on the tokio
/// clock, so timing tests should run with `start_paused = true`.
pub struct MockCanInterface {
    /// Frames returned by `recv_frame` (FIFO order).
    responses: Mutex<VecDeque<CanFrame>>,
    rules: Mutex<Vec<Rule>>,
    periodic: Mutex<Vec<Periodic>>,
    /// All frames passed to `send_frame` (for test assertions).
    sent_frames: Mutex<Vec<CanFrame>>,
    link_down: AtomicBool,
}

impl MockCanInterface {
    /// Create a new mock with no queued responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            rules: Mutex::new(Vec::new()),
            periodic: Mutex::new(Vec::new()),
            sent_frames: Mutex::new(Vec::new()),
            link_down: AtomicBool::new(false),
        }
    }

    /// Create a mock pre-loaded with frames.
    pub fn with_responses(responses: Vec<CanFrame>) -> Self {
        let mock = Self::new();
        mock.responses.lock().unwrap_or_else(PoisonError::into_inner).extend(responses);
        mock
    }

    /// Queue an additional frame.
    pub fn queue_response(&self, frame: CanFrame) {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner).push_back(frame);
    }

    /// Answer every Request for `pgn` sent to `destination` with `frames`.
    pub fn respond_to(&self, pgn: u32, destination: u8, frames: Vec<CanFrame>) {
        self.add_rule(pgn, destination, frames, None);
    }

    /// Answer only the next Request for `pgn` sent to `destination`.
    pub fn respond_once(&self, pgn: u32, destination: u8, frames: Vec<CanFrame>) {
        self.add_rule(pgn, destination, frames, Some(1));
    }

    fn add_rule(&self, pgn: u32, destination: u8, frames: Vec<CanFrame>, remaining: Option<usize>) {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner).push(Rule {
            pgn,
            destination,
            frames,
            remaining,
        });
    }

    /// Broadcast `frame` every `period`, starting now. Queued frames are
    /// delivered first.
    pub fn broadcast_every(&self, frame: CanFrame, period: Duration) {
        self.periodic.lock().unwrap_or_else(PoisonError::into_inner).push(Periodic {
            frame,
            period,
            next_due: Instant::now(),
        });
    }

    pub fn stop_broadcasts(&self) {
        self.periodic.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Index and due time of the next periodic frame.
    fn next_periodic(&self) -> Option<(usize, Instant)> {
        self.periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.next_due)
            .map(|(i, p)| (i, p.next_due))
    }

    /// Make every subsequent call fail with `BusError::Closed`.
    pub fn set_link_down(&self, down: bool) {
        self.link_down.store(down, Ordering::SeqCst);
    }

    /// Get copies of all frames that were sent.
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent_frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Get the last sent frame, if any.
    pub fn last_sent(&self) -> Option<CanFrame> {
        self.sent_frames.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    /// `(requested PGN, destination)` of every Request sent, in order.
    pub fn requests_sent(&self) -> Vec<(u32, u8)> {
        self.sent_frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|f| f.pgn() == PGN_REQUEST)
            .map(|f| (pgn_from_bytes(&f.data), f.destination()))
            .collect()
    }

    fn check_link(&self) -> BusResult<()> {
        if self.link_down.load(Ordering::SeqCst) {
            return Err(BusError::Closed("mock link down".into()));
        }
        Ok(())
    }
}

impl Default for MockCanInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanInterface for MockCanInterface {
    async fn send_frame(&self, frame: &CanFrame) -> BusResult<()> {
        self.check_link()?;
        self.sent_frames.lock().unwrap_or_else(PoisonError::into_inner).push(frame.clone());

        if frame.pgn() == PGN_REQUEST {
            let pgn = pgn_from_bytes(&frame.data);
            let destination = frame.destination();
            let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
            let rule = rules
                .iter_mut()
                .find(|r| r.pgn == pgn && r.destination == destination && r.remaining != Some(0));
            if let Some(rule) = rule {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                self.responses
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(rule.frames.iter().cloned());
            }
        }
        Ok(())
    }

    async fn recv_frame(&self, timeout: Duration) -> BusResult<CanFrame> {
        self.check_link()?;
        let next = self.responses.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        if let Some(frame) = next {
            return Ok(frame);
        }

        let deadline = Instant::now() + timeout;
        if let Some((index, due)) = self.next_periodic()
            && due <= deadline
        {
            tokio::time::sleep_until(due).await;
            let mut periodic = self.periodic.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = periodic.get_mut(index) {
                entry.next_due = due + entry.period;
                return Ok(entry.frame.clone());
            }
        }
        tokio::time::sleep_until(deadline).await;
        Err(BusError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}
