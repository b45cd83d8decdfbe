//! The output sink: owns the backend and the frozen schema for one run.
//!
//! A [`Sink`] is created with [`Sink::open`], which creates the file,
//! declares every schema column and freezes the schema. Records are then
//! written with [`Sink::write`]; in per-event layout they are held until
//! [`Sink::end_event`] emits them as one row of sequences. [`Sink::close`]
//! finalizes the file. A sink dropped without being closed is closed by
//! its `Drop` impl and any error is logged.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use steptrace_types::{FieldGroup, LayoutMode, OutputFormat, RunId, RunMeta, StepRecord};
use tracing::{debug, info, warn};

use crate::backend::{Backend, NtupleBackend, Value, create_backend, default_extension};
use crate::error::OutputError;
use crate::schema::{Cell, Column, ColumnKind, ColumnShape, OutputSchema};

/// Default output base name.
pub const DEFAULT_FILE_NAME: &str = "g4simpleout";

/// Everything the sink needs to know before it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Output base name. The format's extension is appended when missing.
    pub file_name: String,
    /// Backend encoding.
    pub format: OutputFormat,
    /// Row layout.
    pub layout: LayoutMode,
    /// Enabled field groups.
    pub fields: BTreeSet<FieldGroup>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_owned(),
            format: OutputFormat::default(),
            layout: LayoutMode::default(),
            fields: FieldGroup::ALL.into_iter().collect(),
        }
    }
}

impl SinkConfig {
    /// The path the sink will write to.
    pub fn path(&self) -> PathBuf {
        output_path(&self.file_name, self.format)
    }
}

/// Append the format's default extension to `base` unless `base` already
/// ends with it. Any other dotted suffix is part of the name.
pub fn output_path(base: &str, format: OutputFormat) -> PathBuf {
    let extension = default_extension(format);
    let path = Path::new(base);
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
    if has_extension {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// What a closed sink reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    /// File that was written.
    pub path: PathBuf,
    /// Encoding used.
    pub format: OutputFormat,
    /// Layout used.
    pub layout: LayoutMode,
    /// Run the file belongs to.
    pub run_id: RunId,
    /// Rows committed.
    pub rows: u64,
}

/// An open output file with a frozen schema.
pub struct Sink {
    backend: Backend,
    schema: OutputSchema,
    path: PathBuf,
    meta: RunMeta,
    event_records: Vec<StepRecord>,
    rows: u64,
    closed: bool,
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("format", &self.backend.format())
            .field("path", &self.path)
            .field("rows", &self.rows)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn cell_value(cell: Cell) -> Value {
    match cell {
        Cell::Int(v) => Value::Int(v),
        Cell::Real(v) => Value::Real(v),
    }
}

/// Gather one column's values across an event's records.
fn sequence_value(column: &Column, records: &[StepRecord]) -> Value {
    let cells = records.iter().map(|r| column.field.cell(r));
    match column.kind {
        ColumnKind::Int => Value::Ints(
            cells
                .filter_map(|c| match c {
                    Cell::Int(v) => Some(v),
                    Cell::Real(_) => None,
                })
                .collect(),
        ),
        ColumnKind::Real => Value::Reals(
            cells
                .filter_map(|c| match c {
                    Cell::Real(v) => Some(v),
                    Cell::Int(_) => None,
                })
                .collect(),
        ),
    }
}

impl Sink {
    /// Create the output file and freeze the schema.
    pub fn open(config: &SinkConfig) -> Result<Self, OutputError> {
        let schema = OutputSchema::new(config.layout, &config.fields);
        let path = config.path();
        let meta = RunMeta::now();
        let mut backend = create_backend(config.format);

        backend.open(&path, &meta, config.layout)?;
        for column in schema.columns() {
            backend.declare_column(column)?;
        }

        info!(
            path = %path.display(),
            format = %config.format,
            layout = %config.layout,
            columns = schema.columns().len(),
            run_id = %meta.run_id,
            "output sink opened"
        );
        Ok(Self {
            backend,
            schema,
            path,
            meta,
            event_records: Vec::new(),
            rows: 0,
            closed: false,
        })
    }

    /// The frozen schema.
    pub const fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// The file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows committed so far.
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Write records. In per-step layout each record becomes a row; in
    /// per-event layout they are held for the next [`Sink::end_event`].
    pub fn write(&mut self, records: &[StepRecord]) -> Result<(), OutputError> {
        self.ensure_open("write")?;
        match self.schema.layout() {
            LayoutMode::PerStep => {
                for record in records {
                    for (index, column) in self.schema.columns().iter().enumerate() {
                        self.backend
                            .fill_column(index, cell_value(column.field.cell(record)))?;
                    }
                    self.commit()?;
                }
            }
            LayoutMode::PerEvent => self.event_records.extend_from_slice(records),
        }
        Ok(())
    }

    /// Emit the held records as one row. No-op in per-step layout or when
    /// nothing is held.
    pub fn end_event(&mut self) -> Result<(), OutputError> {
        self.ensure_open("end an event")?;
        let Some(first) = self.event_records.first().copied() else {
            return Ok(());
        };
        let records = std::mem::take(&mut self.event_records);
        for (index, column) in self.schema.columns().iter().enumerate() {
            let value = match column.shape {
                ColumnShape::Scalar => cell_value(column.field.cell(&first)),
                ColumnShape::Sequence => sequence_value(column, &records),
            };
            self.backend.fill_column(index, value)?;
        }
        self.commit()?;
        debug!(event = first.event_index, records = records.len(), "event row written");
        Ok(())
    }

    /// Emit any held event and finalize the file.
    pub fn close(&mut self) -> Result<SinkSummary, OutputError> {
        self.ensure_open("close")?;
        let flushed = self.end_event();
        self.closed = true;
        let closed = self.backend.close();
        flushed?;
        closed?;

        info!(path = %self.path.display(), rows = self.rows, "output sink closed");
        Ok(SinkSummary {
            path: self.path.clone(),
            format: self.backend.format(),
            layout: self.schema.layout(),
            run_id: self.meta.run_id,
            rows: self.rows,
        })
    }

    fn commit(&mut self) -> Result<(), OutputError> {
        self.backend.commit_row()?;
        self.rows = self.rows.checked_add(1).ok_or(OutputError::CountOverflow)?;
        Ok(())
    }

    const fn ensure_open(&self, operation: &'static str) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Lifecycle {
                state: "closed",
                operation,
            });
        }
        Ok(())
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close output sink on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_appended_only_when_missing() {
        assert_eq!(
            output_path("g4simpleout", OutputFormat::Markup),
            PathBuf::from("g4simpleout.xml")
        );
        assert_eq!(
            output_path("trace.ntc", OutputFormat::Columnar),
            PathBuf::from("trace.ntc")
        );
        assert_eq!(
            output_path("TRACE.CSV", OutputFormat::Delimited),
            PathBuf::from("TRACE.CSV")
        );
        assert_eq!(
            output_path("out/trace", OutputFormat::Hierarchical),
            PathBuf::from("out/trace.nth")
        );
    }

    #[test]
    fn dotted_names_still_get_the_format_extension() {
        assert_eq!(
            output_path("run.v2", OutputFormat::Columnar),
            PathBuf::from("run.v2.ntc")
        );
        assert_eq!(
            output_path("sim_1.5MeV", OutputFormat::Hierarchical),
            PathBuf::from("sim_1.5MeV.nth")
        );
        assert_eq!(
            output_path("out.csv", OutputFormat::Hierarchical),
            PathBuf::from("out.csv.nth")
        );
    }

    #[test]
    fn default_config_enables_every_group() {
        let config = SinkConfig::default();
        assert_eq!(config.fields.len(), FieldGroup::ALL.len());
        assert_eq!(config.path(), PathBuf::from("g4simpleout.csv"));
    }
}
