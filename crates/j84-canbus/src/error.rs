//! CAN bus and codec error types.

use thiserror::Error;

/// Errors raised while decoding a packet payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("PGN {pgn}: payload too short, need {needed} bytes, got {actual}")]
    TooShort {
        pgn: u32,
        needed: usize,
        actual: usize,
    },

    #[error("PGN {actual} cannot be decoded as PGN {expected}")]
    WrongPgn { expected: u32, actual: u32 },

    #[error("SPN {spn}: {reason}")]
    InvalidSpn { spn: u32, reason: String },
}

/// Errors that can occur during CAN bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("CAN interface error: {0}")]
    Interface(String),

    /// The adapter is gone; no further traffic is possible.
    #[error("CAN adapter closed: {0}")]
    Closed(String),

    /// Raised by [`crate::CanInterface::recv_frame`] when nothing arrives.
    /// Transactions translate it into a timeout result rather than failing.
    #[error("Response timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport protocol error: {0}")]
    Transport(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl BusError {
    /// Whether the adapter can no longer be used for this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BusError::Closed(_))
    }
}

/// Convenience alias for CAN bus results.
pub type BusResult<T> = Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_message() {
        let err = DecodeError::TooShort {
            pgn: 49408,
            needed: 8,
            actual: 3,
        };
        assert_eq!(err.to_string(), "PGN 49408: payload too short, need 8 bytes, got 3");
    }

    #[test]
    fn only_closed_is_fatal() {
        assert!(BusError::Closed("can0".into()).is_fatal());
        assert!(!BusError::Interface("bus-off".into()).is_fatal());
        assert!(!BusError::Timeout { timeout_ms: 220 }.is_fatal());
    }

    #[test]
    fn decode_converts_into_bus_error() {
        let err: BusError = DecodeError::WrongPgn {
            expected: 65227,
            actual: 65226,
        }
        .into();
        assert!(matches!(err, BusError::Decode(_)));
    }
}
