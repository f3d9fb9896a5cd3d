//! CAN adapter abstraction.
//!
//! `CanInterface` trait with `send_frame`/`recv_frame`. Two impls:
//! - `SocketCanInterface`: Linux-only, wraps `socketcan::CanSocket`
//! - `MockCanInterface`: all platforms, scripted responses (in `mock.rs`)

use async_trait::async_trait;
use std::time::Duration;

use crate::error::BusResult;
use crate::types::CanFrame;

/// A CAN adapter carrying 29-bit J1939 traffic.
#[async_trait]
pub trait CanInterface: Send + Sync {
    /// Transmit one frame (at most 8 data bytes).
    async fn send_frame(&self, frame: &CanFrame) -> BusResult<()>;

    /// Receive the next frame, waiting up to `timeout`.
    ///
    /// Returns `BusError::Timeout` when nothing arrives and
    /// `BusError::Closed` once the link is gone.
    async fn recv_frame(&self, timeout: Duration) -> BusResult<CanFrame>;
}

// ── SocketCAN (Linux-only) ──────────────────────────────────────

#[cfg(target_os = "linux")]
pub use socket::SocketCanInterface;

#[cfg(target_os = "linux")]
mod socket {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use socketcan::{CanSocket, EmbeddedFrame, ExtendedId, Id, Socket};

    use super::CanInterface;
    use crate::error::{BusError, BusResult};
    use crate::types::CanFrame;

    /// ENODEV: the interface was removed.
    const NO_SUCH_DEVICE: i32 = 19;

    /// SocketCAN raw socket. Blocking socket calls run on the blocking pool.
    pub struct SocketCanInterface {
        name: String,
        socket: Arc<CanSocket>,
    }

    impl SocketCanInterface {
        /// Open `interface_name` (e.g. `can0`).
        pub fn open(interface_name: &str) -> BusResult<Self> {
            let socket = CanSocket::open(interface_name)
                .map_err(|e| BusError::Interface(format!("{interface_name}: {e}")))?;
            tracing::info!(interface = interface_name, "SocketCAN interface opened");
            Ok(Self {
                name: interface_name.to_string(),
                socket: Arc::new(socket),
            })
        }

        fn map_io(&self, err: io::Error, timeout: Duration) -> BusError {
            match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => BusError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                },
                io::ErrorKind::NetworkDown | io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => {
                    BusError::Closed(format!("{}: {err}", self.name))
                }
                _ if err.raw_os_error() == Some(NO_SUCH_DEVICE) => {
                    BusError::Closed(format!("{}: {err}", self.name))
                }
                _ => BusError::Interface(format!("{}: {err}", self.name)),
            }
        }
    }

    #[async_trait]
    impl CanInterface for SocketCanInterface {
        async fn send_frame(&self, frame: &CanFrame) -> BusResult<()> {
            let id = ExtendedId::new(frame.id)
                .ok_or_else(|| BusError::Interface(format!("invalid identifier {:08X}", frame.id)))?;
            let raw = socketcan::CanFrame::new(id, &frame.data).ok_or_else(|| {
                BusError::Interface(format!("frame payload of {} bytes", frame.data.len()))
            })?;

            let socket = Arc::clone(&self.socket);
            tokio::task::spawn_blocking(move || socket.write_frame(&raw))
                .await
                .map_err(|e| BusError::Interface(e.to_string()))?
                .map_err(|e| self.map_io(e, Duration::ZERO))
        }

        async fn recv_frame(&self, timeout: Duration) -> BusResult<CanFrame> {
            let socket = Arc::clone(&self.socket);
            let received = tokio::task::spawn_blocking(move || socket.read_frame_timeout(timeout))
                .await
                .map_err(|e| BusError::Interface(e.to_string()))?
                .map_err(|e| self.map_io(e, timeout))?;

            match received {
                socketcan::CanFrame::Data(frame) => match frame.id() {
                    Id::Extended(id) => Ok(CanFrame::new(id.as_raw(), frame.data().to_vec())),
                    // 11-bit traffic is not J1939; let the caller keep waiting.
                    Id::Standard(_) => Err(BusError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                },
                socketcan::CanFrame::Remote(_) => Err(BusError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
                socketcan::CanFrame::Error(_) => Err(BusError::Interface(format!(
                    "{}: error frame received",
                    self.name
                ))),
            }
        }
    }
}
