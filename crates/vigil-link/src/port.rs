//! Port abstraction and the real `serialport`-backed implementation.
//!
//! The gateway only reads from the device, so a port is just an async
//! source of byte chunks. The real implementation keeps the blocking
//! `serialport` reads on a dedicated thread and hands chunks to the async
//! side over a bounded channel; dropping the port handle closes the
//! channel, which stops the thread and releases the device on its next
//! read timeout.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vigil_core::LinkError;

/// Read timeout for the blocking serial thread. Short enough that a
/// dropped handle releases the device promptly.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Chunk buffer size for serial reads.
const READ_BUF_LEN: usize = 256;

/// Capacity of the thread→async chunk channel.
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// An open, readable link to the device.
#[async_trait]
pub trait LinkPort: Send {
    /// Await the next chunk of bytes.
    ///
    /// Returns [`LinkError::Disconnected`] when the device reached
    /// end-of-stream, or [`LinkError::Read`] on a driver error. Either
    /// way the port is dead and must be reopened.
    async fn read_chunk(&mut self) -> Result<Bytes, LinkError>;
}

/// Opens a [`LinkPort`] at a device path. The seam the link manager is
/// tested through.
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Attempt to acquire the device.
    ///
    /// Fails with [`LinkError::Unavailable`] when the path does not exist
    /// or the device is held by another process.
    async fn open(&self, path: &str, baud_rate: u32) -> Result<Box<dyn LinkPort>, LinkError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Real serial implementation
// ─────────────────────────────────────────────────────────────────────────────

/// [`PortOpener`] over the `serialport` crate (8N1, no flow control).
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialOpener;

#[async_trait]
impl PortOpener for SerialOpener {
    async fn open(&self, path: &str, baud_rate: u32) -> Result<Box<dyn LinkPort>, LinkError> {
        let path_owned = path.to_owned();
        let open_result = tokio::task::spawn_blocking(move || {
            serialport::new(&path_owned, baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(READ_TIMEOUT)
                .open()
        })
        .await;

        let port = match open_result {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => {
                return Err(LinkError::Unavailable {
                    path: path.to_owned(),
                    reason: e.to_string(),
                });
            }
            Err(join_err) => {
                return Err(LinkError::Unavailable {
                    path: path.to_owned(),
                    reason: join_err.to_string(),
                });
            }
        };

        debug!(path, baud_rate, "serial port opened");
        Ok(Box::new(SerialStream::spawn(port, path.to_owned())))
    }
}

/// Async view over the blocking reader thread.
struct SerialStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl SerialStream {
    fn spawn(mut port: Box<dyn serialport::SerialPort>, path: String) -> Self {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        // Not a tokio task: serialport reads block, and the thread must
        // keep the device handle alive until the async side drops it.
        let _ = std::thread::Builder::new()
            .name("vigil-serial-read".into())
            .spawn(move || {
                let mut buf = [0u8; READ_BUF_LEN];
                loop {
                    match port.read(&mut buf) {
                        Ok(0) => {
                            // End-of-stream: device unplugged.
                            let _ = tx.blocking_send(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "serial end-of-stream",
                            )));
                            break;
                        }
                        Ok(n) => {
                            if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                                // Async side dropped the port; release the device.
                                debug!(path, "serial reader stopping, handle dropped");
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                            if tx.is_closed() {
                                debug!(path, "serial reader stopping, handle dropped");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(path, error = %e, "serial read error");
                            let _ = tx.blocking_send(Err(e));
                            break;
                        }
                    }
                }
            });
        Self { rx }
    }
}

#[async_trait]
impl LinkPort for SerialStream {
    async fn read_chunk(&mut self) -> Result<Bytes, LinkError> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(chunk),
            Some(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(LinkError::Disconnected)
            }
            Some(Err(e)) => Err(LinkError::Read(e)),
            // Reader thread exited without an error in flight.
            None => Err(LinkError::Disconnected),
        }
    }
}
