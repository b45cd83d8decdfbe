//! Output layer for the steptrace step recorder.
//!
//! Turns normalized [`StepRecord`](steptrace_types::StepRecord)s into rows
//! of a single ntuple named `g4sntuple`, encoded by one of four backends.
//!
//! # Architecture
//!
//! ```text
//! StepRecord batch
//!     |
//!     +-- Sink::write / Sink::end_event
//!         |-- OutputSchema    (frozen column list, layout)
//!         +-- Backend         (NtupleBackend capability set)
//!             |-- delimited     .csv
//!             |-- markup        .xml
//!             |-- columnar      .ntc
//!             +-- hierarchical  .nth
//! ```
//!
//! # Modules
//!
//! - [`schema`] -- Column definitions derived from field groups and layout
//! - [`sink`] -- Owns one open file for the duration of a run
//! - [`backend`] -- The capability trait and its four encodings
//! - [`hits`] -- Per-event detector hits summed from a binary ntuple
//! - [`error`] -- Shared error type

pub mod backend;
pub mod error;
pub mod hits;
pub mod schema;
pub mod sink;

// Re-export primary types for convenience.
pub use backend::{Backend, NtupleBackend, Value, create_backend, default_extension};
pub use error::OutputError;
pub use hits::{Deposit, Hit, HitOptions, build_hits, read_deposits, write_hits};
pub use schema::{Column, ColumnKind, ColumnShape, NTUPLE_NAME, OutputSchema};
pub use sink::{DEFAULT_FILE_NAME, Sink, SinkConfig, SinkSummary, output_path};
