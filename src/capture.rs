//! End-to-end capture run: enumerate, acquire, configure, allocate, queue,
//! wait, tear down.

use crate::config::CaptureOptions;
use crate::report::{ReportSummary, Reporter};
use crate::session;
use crate::traits::{CameraError, CameraManager, Result};
use crate::validation::{analyze_sequences, validate_frame_sequence};
use std::io::Write;
use tracing::{info, warn};

/// Run one capture against `manager`, writing program output to `out`.
///
/// Camera ids, the default and validated stream configuration and the
/// buffer count are written first; frame lines follow as requests complete.
/// The writer is handed back together with the reporter's summary.
pub fn run_capture<M, W>(
    manager: &M,
    options: &CaptureOptions,
    mut out: W,
) -> Result<(W, ReportSummary)>
where
    M: CameraManager,
    W: Write + Send + 'static,
{
    options.validate()?;

    let ids = session::enumerate(manager)?;
    for id in &ids {
        writeln!(out, "{id}")?;
    }

    let id = match &options.camera {
        Some(wanted) => ids
            .iter()
            .find(|id| *id == wanted)
            .ok_or_else(|| CameraError::CameraNotFound(wanted.clone()))?,
        None => ids.first().ok_or(CameraError::NoCameras)?,
    };

    let mut session = session::acquire(manager, id)?;

    let outcome = session.configure(options)?;
    writeln!(
        out,
        "Default {} configuration is: {}",
        options.role, outcome.default
    )?;
    writeln!(
        out,
        "Validated {} configuration is: {}",
        options.role, outcome.validated
    )?;

    let allocations = session.allocate_buffers()?;
    for (_, buffers) in &allocations {
        writeln!(out, "Allocated {} buffers for stream", buffers.len())?;
    }

    // Requests are only built for the first stream.
    let (stream, buffers) = allocations
        .into_iter()
        .next()
        .ok_or(CameraError::InvalidState("no stream was allocated"))?;
    let requests = session.build_requests(stream, buffers)?;

    out.flush()?;
    let (tx, rx) = crossbeam_channel::unbounded();
    let reporter = Reporter::spawn(rx, out)?;

    // Teardown drops the last completion sender, so the reporter can be
    // joined even when the run failed part way.
    let run = session.run(requests, options.window, tx);
    let teardown = session.teardown();
    let report = reporter.finish();
    run?;
    teardown?;

    let (out, summary) = report?;
    log_summary(&summary);
    Ok((out, summary))
}

fn log_summary(summary: &ReportSummary) {
    let analysis = analyze_sequences(&summary.sequences);
    if !summary.sequences.is_empty() {
        if let Err(err) = validate_frame_sequence(&summary.sequences) {
            warn!(dropped = analysis.dropped, %err, "frame sequence is not contiguous");
        }
    }
    info!(
        completed = summary.completed,
        cancelled = summary.cancelled,
        reordered = analysis.reordered,
        "capture finished"
    );
}
