//! Drives a [`StepRecorder`] from a trace.

use std::io::BufRead;

use steptrace_core::{CommandOutcome, RunSummary, StepRecorder};
use steptrace_types::VolumeRef;
use tracing::{info, warn};

use crate::error::ReplayError;
use crate::trace::{TraceEntry, TraceReader};

/// What a replay produced.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// One summary per completed run, in order.
    pub runs: Vec<RunSummary>,
    /// Command lines that were rejected.
    pub rejected_commands: usize,
    /// Trace lines consumed.
    pub lines: usize,
}

/// Feed every entry of `trace` through `recorder`.
///
/// A run still open at end of input is closed. If the trace never ended a
/// run, one is ended anyway so the output file exists.
pub fn replay<R: BufRead>(
    recorder: &mut StepRecorder,
    mut trace: TraceReader<R>,
) -> Result<ReplayReport, ReplayError> {
    let mut report = ReplayReport::default();

    for entry in trace.by_ref() {
        match entry? {
            TraceEntry::Volume { handle, name } => {
                recorder.register_volume(&VolumeRef::new(handle, name));
            }
            TraceEntry::Step(step) => recorder.record_step(&step)?,
            TraceEntry::Command { line } => match recorder.execute(&line) {
                Ok(Some(CommandOutcome::Volumes(volumes))) => {
                    info!(count = volumes.len(), "volumes listed");
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(command = line.trim(), %error, "trace command rejected");
                    report.rejected_commands = report.rejected_commands.saturating_add(1);
                }
            },
            TraceEntry::EndRun => report.runs.push(recorder.end_run()?),
        }
    }

    if recorder.is_open() || report.runs.is_empty() {
        report.runs.push(recorder.end_run()?);
    }
    report.lines = trace.lines_read();
    Ok(report)
}
