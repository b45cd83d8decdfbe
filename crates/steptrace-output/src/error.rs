//! Error types for the output layer.
//!
//! All errors are propagated via [`OutputError`], which wraps the
//! underlying I/O and encoder errors with context about which backend
//! operation failed.

use std::path::PathBuf;

/// Errors that can occur while opening, writing, or closing an output sink.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The output file could not be created.
    #[error("cannot open output file {}: {source}", path.display())]
    Open {
        /// The requested output path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A plain I/O operation failed after the file was opened.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The delimited-text encoder failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The markup encoder or decoder failed.
    #[error("XML error: {0}")]
    Markup(String),

    /// The binary encoder or decoder failed.
    #[error("binary encoding error: {0}")]
    Binary(#[from] bincode::Error),

    /// A file did not start with the expected magic bytes.
    #[error("not a {expected} file")]
    BadMagic {
        /// Human-readable format name.
        expected: &'static str,
    },

    /// A backend call arrived in the wrong lifecycle state.
    #[error("backend is {state}, cannot {operation}")]
    Lifecycle {
        /// Current state, e.g. "not open".
        state: &'static str,
        /// Attempted operation.
        operation: &'static str,
    },

    /// A column index outside the declared schema.
    #[error("column index {0} out of range")]
    UnknownColumn(usize),

    /// A value whose kind or shape does not match its column.
    #[error("value does not match column {column}")]
    TypeMismatch {
        /// Name of the column.
        column: String,
    },

    /// A row was committed before every column was filled.
    #[error("row committed with unfilled column {column}")]
    IncompleteRow {
        /// Name of the first unfilled column.
        column: String,
    },

    /// A column needed to read the file back is not in it.
    #[error("column {column} not found")]
    MissingColumn {
        /// Name of the missing column or group.
        column: String,
    },

    /// Only the binary encodings can be read back.
    #[error("{format} output cannot be read back")]
    UnreadableFormat {
        /// Configuration name of the encoding.
        format: &'static str,
    },

    /// A count or offset exceeded the encodable range.
    #[error("row or value count overflow")]
    CountOverflow,
}
