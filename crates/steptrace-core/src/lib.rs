//! Step-recording pipeline for the steptrace recorder.
//!
//! This crate owns the decisions made for every step the transport engine
//! delivers: which volume the step is in, whether it is worth keeping,
//! and which event it belongs to. Serialization is delegated to
//! `steptrace-output`.
//!
//! # Modules
//!
//! - [`classifier`] -- Rule-based volume classification with a per-volume
//!   cache.
//! - [`policy`] -- [`RecordingPolicy`]: zero to two records per step.
//! - [`accumulator`] -- Event boundary detection and per-event buffering.
//! - [`command`] -- Parser for the `/steptrace/` command language.
//! - [`config`] -- Configuration loading from `steptrace-config.yaml`.
//! - [`recorder`] -- [`StepRecorder`], the pipeline the engine drives.
//!
//! [`RecordingPolicy`]: policy::RecordingPolicy
//! [`StepRecorder`]: recorder::StepRecorder

pub mod accumulator;
pub mod classifier;
pub mod command;
pub mod config;
pub mod policy;
pub mod recorder;

// Re-export primary types for convenience.
pub use accumulator::{EventAccumulator, EventBatch};
pub use classifier::{ClassifierError, RuleChange, VolumeClassifier, VolumeRule};
pub use command::{Command, CommandError, parse_command};
pub use config::{ConfigError, RecorderConfig};
pub use policy::{RecordingMode, RecordingPolicy};
pub use recorder::{CommandOutcome, RecorderError, RejectedLine, RunSummary, StepRecorder};
