//! Error types for the replay binary.
//!
//! [`ReplayError`] wraps every failure mode between reading the command
//! line and closing the last run, so `main` can propagate with `?`.

use std::path::PathBuf;

/// Top-level error for the replay binary.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: steptrace_core::ConfigError,
    },

    /// The recorder could not write its output.
    #[error("recorder error: {source}")]
    Recorder {
        /// The underlying recorder error.
        #[from]
        source: steptrace_core::RecorderError,
    },

    /// An input file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A trace line is not a valid entry.
    #[error("trace line {line}: {source}")]
    Trace {
        /// 1-based line number.
        line: usize,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}
