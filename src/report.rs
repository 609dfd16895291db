//! Completion reporting.
//!
//! Completed requests arrive over a channel from whatever thread the camera
//! stack completes them on. A single reporter thread drains that channel and
//! writes one line per frame buffer, in completion order.

use crate::traits::{CameraError, CompletedRequest, FrameMetadata, RequestStatus, Result};
use crossbeam_channel::Receiver;
use std::io::Write;
use std::thread::JoinHandle;
use tracing::{debug, trace};

/// Format one frame line: `seq: 000042 bytesused: 614400` with one
/// slash-separated entry per plane.
pub fn format_frame(metadata: &FrameMetadata) -> String {
    let planes: Vec<String> = metadata.planes.iter().map(ToString::to_string).collect();
    format!(
        "seq: {:06} bytesused: {}",
        metadata.sequence,
        planes.join("/")
    )
}

/// Lines for a completed request. Cancelled requests produce none.
pub fn format_completion(request: &CompletedRequest) -> Vec<String> {
    if request.status == RequestStatus::Cancelled {
        return Vec::new();
    }

    request
        .buffers
        .iter()
        .map(|(_, metadata)| format_frame(metadata))
        .collect()
}

/// What the reporter saw over a capture run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Requests reported as completed.
    pub completed: usize,
    /// Requests skipped because they were cancelled.
    pub cancelled: usize,
    /// Frame sequence numbers in completion order.
    pub sequences: Vec<u32>,
}

/// Background thread writing completion lines to `W`.
pub struct Reporter<W> {
    handle: JoinHandle<std::io::Result<(W, ReportSummary)>>,
}

impl<W> Reporter<W>
where
    W: Write + Send + 'static,
{
    /// Start reporting completions received on `rx` into `out`.
    ///
    /// The thread exits once every sender of the channel is dropped.
    pub fn spawn(rx: Receiver<CompletedRequest>, out: W) -> Result<Self> {
        let handle = std::thread::Builder::new()
            .name("frame-reporter".to_owned())
            .spawn(move || report_loop(&rx, out))?;
        Ok(Self { handle })
    }

    /// Wait for the channel to close and return the writer and summary.
    pub fn finish(self) -> Result<(W, ReportSummary)> {
        let (out, summary) = self
            .handle
            .join()
            .map_err(|_| CameraError::InvalidState("reporter thread panicked"))??;
        debug!(
            completed = summary.completed,
            cancelled = summary.cancelled,
            "reporter finished"
        );
        Ok((out, summary))
    }
}

fn report_loop<W: Write>(
    rx: &Receiver<CompletedRequest>,
    mut out: W,
) -> std::io::Result<(W, ReportSummary)> {
    let mut summary = ReportSummary::default();

    for request in rx {
        if request.status == RequestStatus::Cancelled {
            trace!(cookie = request.cookie, "skipping cancelled request");
            summary.cancelled += 1;
            continue;
        }

        summary.completed += 1;
        for (_, metadata) in &request.buffers {
            writeln!(out, "{}", format_frame(metadata))?;
            summary.sequences.push(metadata.sequence);
        }
        out.flush()?;
    }

    Ok((out, summary))
}
