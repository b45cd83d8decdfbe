//! Trace replay binary for the steptrace recorder.
//!
//! Reads a JSON-lines step trace and pushes every entry through a
//! [`StepRecorder`], exactly as a transport engine would during a run.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line
//! 2. Load configuration (`--config`, else `steptrace-config.yaml`, else defaults)
//! 3. Initialize structured logging (tracing)
//! 4. Build the recorder and apply the macro file, if any
//! 5. Stream the trace and log one summary per run

mod error;
mod replay;
mod trace;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use steptrace_core::{RecorderConfig, StepRecorder};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ReplayError;
use crate::trace::TraceReader;

/// Default configuration file looked up in the working directory.
const DEFAULT_CONFIG: &str = "steptrace-config.yaml";

#[derive(Parser, Debug)]
#[command(name = "steptrace-replay", about = "Replay a step trace through the recorder")]
struct Args {
    /// JSON-lines trace to replay.
    trace: PathBuf,

    /// Macro file of `/steptrace/` commands applied before the trace.
    #[arg(long = "macro", short = 'm')]
    macro_file: Option<PathBuf>,

    /// Configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration or trace cannot be read, a trace
/// line is malformed, or the output cannot be written.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        trace = %args.trace.display(),
        file_name = config.output.file_name,
        format = ?config.output.format,
        layout = ?config.output.layout,
        record_all_steps = config.recording.record_all_steps,
        volume_rules = config.volume_rules.len(),
        "steptrace-replay starting"
    );

    let mut recorder = StepRecorder::new(&config);

    if let Some(path) = &args.macro_file {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.clone(),
            source,
        })?;
        let rejected = recorder.apply_macro(&text);
        if !rejected.is_empty() {
            warn!(
                macro_file = %path.display(),
                rejected = rejected.len(),
                "macro applied with rejected lines"
            );
        }
    }

    let file = File::open(&args.trace).map_err(|source| ReplayError::Io {
        path: args.trace.clone(),
        source,
    })?;
    let trace = TraceReader::new(BufReader::new(file), args.trace.clone());
    let report = replay::replay(&mut recorder, trace)?;

    for (index, run) in report.runs.iter().enumerate() {
        info!(
            run = index,
            run_id = %run.output.run_id,
            path = %run.output.path.display(),
            rows = run.output.rows,
            steps = run.steps,
            records = run.records,
            events = run.events,
            "run written"
        );
    }
    info!(
        lines = report.lines,
        runs = report.runs.len(),
        rejected_commands = report.rejected_commands,
        "replay complete"
    );

    Ok(())
}

/// Load configuration from an explicit path, or from
/// `steptrace-config.yaml` when it exists, or fall back to defaults.
fn load_config(explicit: Option<&Path>) -> Result<RecorderConfig, ReplayError> {
    if let Some(path) = explicit {
        return Ok(RecorderConfig::from_file(path)?);
    }
    let config_path = Path::new(DEFAULT_CONFIG);
    if config_path.exists() {
        Ok(RecorderConfig::from_file(config_path)?)
    } else {
        Ok(RecorderConfig::parse("")?)
    }
}
