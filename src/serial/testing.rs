//! In-memory serial device for tests.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::port::PortHandle;

/// Simulated device: replays canned output, records what the host wrote.
///
/// Once its output is exhausted a read stays pending, like an idle line.
#[derive(Debug, Default)]
pub struct SimulatedDevice {
    output: VecDeque<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_reads: bool,
    fail_writes: bool,
    hang_up: bool,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device that has already sent `bytes`.
    pub fn with_output(bytes: &[u8]) -> Self {
        SimulatedDevice {
            output: bytes.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Every read fails.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Every write fails.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// End-of-stream once the output is drained.
    pub fn hanging_up(mut self) -> Self {
        self.hang_up = true;
        self
    }

    /// Bytes the host wrote, shared with the test.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    pub fn into_handle(self) -> PortHandle {
        Box::new(self)
    }
}

impl AsyncRead for SimulatedDevice {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.fail_reads {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }
        if self.output.is_empty() {
            return if self.hang_up {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            };
        }
        let n = buf.remaining().min(self.output.len());
        let chunk: Vec<u8> = self.output.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for SimulatedDevice {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail_writes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }
        match self.written.lock() {
            Ok(mut written) => {
                written.extend_from_slice(data);
                Poll::Ready(Ok(data.len()))
            }
            Err(_) => Poll::Ready(Err(io::Error::other("write log poisoned"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
