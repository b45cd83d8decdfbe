//! Plain delimited-text backend.
//!
//! Writes one CSV record per committed row, preceded by a header record of
//! column names. Sequence columns are rendered as space-separated values in
//! a single field, so every row has the same number of fields.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use steptrace_types::{LayoutMode, RunMeta};
use tracing::debug;

use crate::backend::{NtupleBackend, RowBuffer, Value};
use crate::error::OutputError;
use crate::schema::Column;

/// CSV encoder.
#[derive(Default)]
pub struct DelimitedBackend {
    writer: Option<csv::Writer<BufWriter<File>>>,
    buffer: RowBuffer,
    header_written: bool,
}

impl DelimitedBackend {
    /// Create an unopened backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn writer(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut csv::Writer<BufWriter<File>>, OutputError> {
        self.writer.as_mut().ok_or(OutputError::Lifecycle {
            state: "not open",
            operation,
        })
    }

    fn ensure_header(&mut self) -> Result<(), OutputError> {
        if self.header_written {
            return Ok(());
        }
        let names: Vec<String> = self
            .buffer
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        self.writer("write the header")?.write_record(&names)?;
        self.header_written = true;
        Ok(())
    }
}

impl NtupleBackend for DelimitedBackend {
    fn open(
        &mut self,
        path: &Path,
        meta: &RunMeta,
        layout: LayoutMode,
    ) -> Result<(), OutputError> {
        let file = File::create(path).map_err(|source| OutputError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.writer = Some(csv::Writer::from_writer(BufWriter::new(file)));
        debug!(path = %path.display(), run_id = %meta.run_id, %layout, "CSV output opened");
        Ok(())
    }

    fn declare_column(&mut self, column: &Column) -> Result<(), OutputError> {
        self.buffer.declare(column)
    }

    fn fill_column(&mut self, index: usize, value: Value) -> Result<(), OutputError> {
        self.buffer.fill(index, value)
    }

    fn commit_row(&mut self) -> Result<(), OutputError> {
        self.ensure_header()?;
        let row = self.buffer.take_row()?;
        self.writer("commit a row")?
            .write_record(row.iter().map(Value::to_text))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.ensure_header()?;
        self.writer("close")?.flush()?;
        self.writer = None;
        Ok(())
    }
}
