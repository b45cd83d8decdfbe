//! Shared type definitions for the steptrace step recorder.
//!
//! This crate is the single source of truth for the values that flow
//! between the transport engine, the recording pipeline, and the output
//! backends.
//!
//! # Modules
//!
//! - [`ids`] -- Run identifiers and interned volume handles
//! - [`enums`] -- Field groups, layout modes, output formats, point kinds
//! - [`structs`] -- Step notifications from the engine and the normalized
//!   [`StepRecord`] the pipeline emits
//!
//! [`StepRecord`]: structs::StepRecord

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{FieldGroup, LayoutMode, OutputFormat, StepPointKind};
pub use ids::{RunId, VolumeHandle};
pub use structs::{
    AffineTransform, RunMeta, StepNotification, StepPoint, StepRecord, ThreeVector, VolumeRef,
};
