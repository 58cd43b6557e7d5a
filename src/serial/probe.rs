//! # Baud Probe
//!
//! Guesses the baud rate of a port by listening at each candidate rate and
//! checking whether what arrives reads as text. The probe is passive: nothing
//! is transmitted to provoke a response.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::time::Duration;

use super::data::Sink;
use super::encoding::printable_ratio;
use super::port::SerialBackend;
use crate::error::ProbeCandidateFailure;

/// Candidate rates, most common first.
pub const BAUD_CANDIDATES: &[u32] = &[115200, 9600, 38400, 57600, 19200, 4800, 2400, 1200];

/// Read timeout of the short-lived probe connection.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Time the device gets to talk before we read.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Printable fraction a sample must strictly exceed.
pub const TEXT_THRESHOLD: f64 = 0.8;

/// Upper bound on the bytes sampled per candidate.
pub const SAMPLE_LIMIT: usize = 4096;

/// Whether a raw sample is plausible text.
///
/// The sample must be valid UTF-8, non-empty, and more than
/// [`TEXT_THRESHOLD`] of its characters printable or tab/CR/LF.
#[must_use]
pub fn looks_like_text(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(text) => !text.is_empty() && printable_ratio(text) > TEXT_THRESHOLD,
        Err(_) => false,
    }
}

/// Reads what is already buffered, without waiting for more.
///
/// Stops at the first read that would block, at end-of-stream, or at
/// `limit` bytes.
pub async fn read_available<R>(reader: &mut R, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut sample = Vec::new();
    let mut chunk = [0u8; 256];
    while sample.len() < limit {
        match poll_once(reader, &mut chunk).await {
            None | Some(Ok(0)) => break,
            Some(Ok(n)) => sample.extend_from_slice(&chunk[..n]),
            Some(Err(e)) => return Err(e),
        }
    }
    sample.truncate(limit);
    Ok(sample)
}

/// Polls a single read; `None` when it would block.
async fn poll_once<R>(reader: &mut R, chunk: &mut [u8]) -> Option<std::io::Result<usize>>
where
    R: AsyncRead + Unpin,
{
    std::future::poll_fn(|cx| {
        let mut buf = ReadBuf::new(&mut *chunk);
        Poll::Ready(match Pin::new(&mut *reader).poll_read(cx, &mut buf) {
            Poll::Pending => None,
            Poll::Ready(result) => Some(result.map(|()| buf.filled().len())),
        })
    })
    .await
}

/// Sequential auto-baud scanner.
pub struct BaudProber {
    backend: Arc<dyn SerialBackend>,
    sink: Sink,
}

impl BaudProber {
    pub fn new(backend: Arc<dyn SerialBackend>, sink: Sink) -> Self {
        BaudProber { backend, sink }
    }

    /// Tries each candidate in order and returns the first that yields text.
    ///
    /// `cancel` is checked before every candidate; once set, no further
    /// candidate is opened and `None` is returned.
    pub async fn probe(&self, port: &str, cancel: &AtomicBool) -> Option<u32> {
        for &baud_rate in BAUD_CANDIDATES {
            if cancel.load(Ordering::Acquire) {
                info!("baud scan of {port} cancelled");
                return None;
            }
            self.sink.notice(format!("Checking {baud_rate}...\n"));
            match self.try_candidate(port, baud_rate).await {
                Ok(true) => {
                    info!("detected {baud_rate} baud on {port}");
                    return Some(baud_rate);
                }
                Ok(false) => debug!("{port}: no text at {baud_rate} baud"),
                Err(e) => debug!("{port}: candidate {baud_rate} failed: {e}"),
            }
        }
        info!("baud scan of {port} found nothing");
        None
    }

    async fn try_candidate(&self, port: &str, baud_rate: u32) -> Result<bool, ProbeCandidateFailure> {
        let mut handle = self.backend.open(port, baud_rate, PROBE_TIMEOUT)?;
        tokio::time::sleep(SETTLE_DELAY).await;
        let sample = read_available(&mut handle, SAMPLE_LIMIT).await;
        // close before the next candidate opens the port again
        let _ = handle.shutdown().await;
        drop(handle);

        let sample = sample?;
        debug!(
            "{port} @ {baud_rate}: {} bytes sampled: {}",
            sample.len(),
            hex::encode(&sample)
        );
        Ok(looks_like_text(&sample))
    }
}
