//! # Connection Lifecycle
//!
//! Owns the single serial connection. The state is one tagged value that also
//! owns the resources of that state: the probe task while scanning, the write
//! half and the reader task while connected. Reader and prober therefore never
//! run at the same time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::data::Sink;
use super::encoding::{LineEnding, Utf8Decoder, encode_line};
use super::port::{CONNECT_TIMEOUT, PortHandle, SerialBackend};
use super::probe::BaudProber;
use crate::error::{ConnectionError, ReadFault, SendError};

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Outcome of a baud scan, delivered to the control side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanReport {
    pub port: String,
    pub baud_rate: Option<u32>,
}

enum Link {
    Disconnected,
    Scanning {
        port: String,
        cancel: Arc<AtomicBool>,
        task: JoinHandle<()>,
    },
    Connected {
        port: String,
        baud_rate: u32,
        writer: WriteHalf<PortHandle>,
        reader: JoinHandle<()>,
    },
}

/// The serial connection and its background task.
pub struct Connection {
    backend: Arc<dyn SerialBackend>,
    sink: Sink,
    link: Link,
    scan_tx: mpsc::UnboundedSender<ScanReport>,
}

impl Connection {
    /// Creates a disconnected connection and the receiver for scan reports.
    ///
    /// Every report must be handed back through [`Connection::finish_scan`].
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        sink: Sink,
    ) -> (Connection, mpsc::UnboundedReceiver<ScanReport>) {
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            backend,
            sink,
            link: Link::Disconnected,
            scan_tx,
        };
        (connection, scan_rx)
    }

    pub fn state(&self) -> ConnectionState {
        match self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Scanning { .. } => ConnectionState::Scanning,
            Link::Connected { .. } => ConnectionState::Connected,
        }
    }

    /// Port in use while scanning or connected.
    pub fn port(&self) -> Option<&str> {
        match &self.link {
            Link::Disconnected => None,
            Link::Scanning { port, .. } | Link::Connected { port, .. } => Some(port),
        }
    }

    /// Baud rate of the open connection.
    pub fn baud_rate(&self) -> Option<u32> {
        match self.link {
            Link::Connected { baud_rate, .. } => Some(baud_rate),
            _ => None,
        }
    }

    /// Opens `port` and starts the background reader.
    ///
    /// Only valid while disconnected. On failure the state is unchanged.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), ConnectionError> {
        if port.is_empty() {
            return Err(ConnectionError::NoPort);
        }
        if !matches!(self.link, Link::Disconnected) {
            return Err(ConnectionError::busy(format!("already {}", self.state())));
        }

        let handle = self
            .backend
            .open(port, baud_rate, CONNECT_TIMEOUT)
            .map_err(|e| ConnectionError::open(port, e.to_string()))?;
        let (read_half, writer) = tokio::io::split(handle);

        info!("connected to {port} at {baud_rate} baud");
        self.sink
            .notice(format!("--- Connected to {port} at {baud_rate} baud ---\n"));
        let reader = tokio::spawn(read_loop(read_half, self.sink.clone()));

        self.link = Link::Connected {
            port: port.to_string(),
            baud_rate,
            writer,
            reader,
        };
        Ok(())
    }

    /// Closes the connection. A no-op unless connected.
    pub async fn disconnect(&mut self) {
        match std::mem::replace(&mut self.link, Link::Disconnected) {
            Link::Connected {
                port,
                mut writer,
                reader,
                ..
            } => {
                reader.abort();
                let _ = reader.await;
                if let Err(e) = writer.shutdown().await {
                    debug!("ignoring error while closing {port}: {e}");
                }
                drop(writer);
                info!("disconnected from {port}");
                self.sink.notice("--- Disconnected ---\n");
            }
            other => self.link = other,
        }
    }

    /// Transmits `text` followed by the line ending.
    ///
    /// Does nothing when not connected or when `text` is empty. A failed
    /// write leaves the connection as it is.
    pub async fn send(&mut self, text: &str, line_ending: LineEnding) -> Result<(), SendError> {
        let Link::Connected { port, writer, .. } = &mut self.link else {
            return Ok(());
        };
        if text.is_empty() {
            return Ok(());
        }

        let bytes = encode_line(text, line_ending);
        if let Err(e) = write_frame(writer, &bytes).await {
            warn!("write to {port} failed: {e}");
            return Err(SendError::Write(e));
        }
        debug!("sent {} bytes to {port}", bytes.len());
        self.sink.append(format!("{text}\n"), true);
        Ok(())
    }

    /// Starts an auto-baud scan of `port` in the background.
    ///
    /// The result arrives as a [`ScanReport`] on the receiver returned by
    /// [`Connection::new`].
    pub fn start_scan(&mut self, port: &str) -> Result<(), ConnectionError> {
        if port.is_empty() {
            return Err(ConnectionError::NoPort);
        }
        if !matches!(self.link, Link::Disconnected) {
            return Err(ConnectionError::busy(format!("already {}", self.state())));
        }

        info!("scanning {port} for baud rate");
        self.sink
            .notice(format!("--- Scanning {port} for baud rate... ---\n"));

        let cancel = Arc::new(AtomicBool::new(false));
        let prober = BaudProber::new(Arc::clone(&self.backend), self.sink.clone());
        let flag = Arc::clone(&cancel);
        let scan_tx = self.scan_tx.clone();
        let name = port.to_string();
        let task = tokio::spawn(async move {
            let baud_rate = prober.probe(&name, &flag).await;
            let _ = scan_tx.send(ScanReport {
                port: name,
                baud_rate,
            });
        });

        self.link = Link::Scanning {
            port: port.to_string(),
            cancel,
            task,
        };
        Ok(())
    }

    /// Requests the running scan to stop. Returns false if none is running.
    ///
    /// The scan stops before its next candidate; the state stays `Scanning`
    /// until its report is passed to [`Connection::finish_scan`].
    pub fn cancel_scan(&mut self) -> bool {
        let Link::Scanning { port, cancel, .. } = &self.link else {
            return false;
        };
        if !cancel.swap(true, Ordering::AcqRel) {
            info!("cancelling baud scan of {port}");
            self.sink.notice("--- Scan Cancelled ---\n");
        }
        true
    }

    /// Ends the scan that produced `report` and connects at the detected rate.
    ///
    /// Returns the rate connected at, or `None` when nothing was detected or
    /// the scan was cancelled.
    pub async fn finish_scan(&mut self, report: ScanReport) -> Result<Option<u32>, ConnectionError> {
        let (cancel, task) = match std::mem::replace(&mut self.link, Link::Disconnected) {
            Link::Scanning { cancel, task, .. } => (cancel, task),
            other => {
                debug!("ignoring stale scan report for {}", report.port);
                self.link = other;
                return Ok(None);
            }
        };
        let _ = task.await;

        if cancel.load(Ordering::Acquire) {
            return Ok(None);
        }
        match report.baud_rate {
            Some(baud_rate) => {
                self.sink
                    .notice(format!("--- FOUND: {baud_rate} baud. Connecting... ---\n"));
                self.connect(&report.port, baud_rate)?;
                Ok(Some(baud_rate))
            }
            None => {
                self.sink
                    .notice("--- Failed: Could not detect baud rate. ---\n");
                Ok(None)
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        match &self.link {
            Link::Connected { reader, .. } => reader.abort(),
            Link::Scanning { cancel, task, .. } => {
                cancel.store(true, Ordering::Release);
                task.abort();
            }
            Link::Disconnected => {}
        }
    }
}

async fn write_frame(writer: &mut WriteHalf<PortHandle>, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Background reader: forwards received text to the sink until the port fails.
///
/// A fault ends the reader only; the connection stays `Connected` until it is
/// explicitly disconnected.
async fn read_loop<R>(mut reader: R, sink: Sink)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8Decoder::new();
    let mut buffer = [0u8; 1024];
    let fault = loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break ReadFault::Closed,
            Ok(n) => {
                let text = decoder.decode(&buffer[..n]);
                if !text.is_empty() {
                    sink.append(text, false);
                }
            }
            Err(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ) => {}
            Err(e) => break ReadFault::from(e),
        }
    };

    match fault {
        ReadFault::Closed => {
            warn!("serial port closed by device");
            sink.notice("\n--- Port closed by device ---\n");
        }
        ReadFault::Io(e) => {
            error!("serial read failed: {e}");
            sink.notice(format!("\nError reading: {e}\n"));
        }
    }
}
