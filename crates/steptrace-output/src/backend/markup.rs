//! Tagged-markup backend.
//!
//! Document shape:
//!
//! ```text
//! <ntuples run=".." created="..">
//!   <ntuple name="g4sntuple" layout="stepwise">
//!     <columns>
//!       <column name="event" type="int" shape="scalar"/>
//!       ...
//!     </columns>
//!     <row><event>0</event>...</row>
//!     ...
//!   </ntuple>
//! </ntuples>
//! ```
//!
//! The `<columns>` block is emitted lazily (first row or close) because
//! columns are declared after the file is opened.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use steptrace_types::{LayoutMode, RunMeta};
use tracing::debug;

use crate::backend::{NtupleBackend, RowBuffer, Value};
use crate::error::OutputError;
use crate::schema::{Column, NTUPLE_NAME};

/// XML encoder.
#[derive(Default)]
pub struct MarkupBackend {
    writer: Option<Writer<BufWriter<File>>>,
    buffer: RowBuffer,
    columns_written: bool,
}

impl MarkupBackend {
    /// Create an unopened backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), OutputError> {
        let writer = self.writer.as_mut().ok_or(OutputError::Lifecycle {
            state: "not open",
            operation: "write markup",
        })?;
        writer
            .write_event(event)
            .map_err(|e| OutputError::Markup(e.to_string()))
    }

    fn ensure_columns(&mut self) -> Result<(), OutputError> {
        if self.columns_written {
            return Ok(());
        }
        self.emit(Event::Start(BytesStart::new("columns")))?;
        let declared: Vec<Column> = self.buffer.columns().to_vec();
        for column in &declared {
            self.emit(Event::Empty(BytesStart::new("column").with_attributes([
                ("name", column.name.as_str()),
                ("type", column.kind.as_str()),
                ("shape", column.shape.as_str()),
            ])))?;
        }
        self.emit(Event::End(BytesEnd::new("columns")))?;
        self.columns_written = true;
        Ok(())
    }
}

impl NtupleBackend for MarkupBackend {
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
        self.writer = Some(Writer::new_with_indent(BufWriter::new(file), b' ', 2));

        let run_id = meta.run_id.to_string();
        let created = meta.created_at.to_rfc3339();
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.emit(Event::Start(
            BytesStart::new("ntuples")
                .with_attributes([("run", run_id.as_str()), ("created", created.as_str())]),
        ))?;
        self.emit(Event::Start(
            BytesStart::new("ntuple")
                .with_attributes([("name", NTUPLE_NAME), ("layout", layout.as_str())]),
        ))?;
        debug!(path = %path.display(), run_id = %meta.run_id, %layout, "XML output opened");
        Ok(())
    }

    fn declare_column(&mut self, column: &Column) -> Result<(), OutputError> {
        self.buffer.declare(column)
    }

    fn fill_column(&mut self, index: usize, value: Value) -> Result<(), OutputError> {
        self.buffer.fill(index, value)
    }

    fn commit_row(&mut self) -> Result<(), OutputError> {
        self.ensure_columns()?;
        let row = self.buffer.take_row()?;
        let names: Vec<String> = self
            .buffer
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();

        self.emit(Event::Start(BytesStart::new("row")))?;
        for (name, value) in names.iter().zip(&row) {
            let text = value.to_text();
            self.emit(Event::Start(BytesStart::new(name.as_str())))?;
            self.emit(Event::Text(BytesText::new(&text)))?;
            self.emit(Event::End(BytesEnd::new(name.as_str())))?;
        }
        self.emit(Event::End(BytesEnd::new("row")))
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.ensure_columns()?;
        self.emit(Event::End(BytesEnd::new("ntuple")))?;
        self.emit(Event::End(BytesEnd::new("ntuples")))?;
        if let Some(writer) = self.writer.take() {
            let mut inner = writer.into_inner();
            inner.write_all(b"\n")?;
            inner.flush()?;
        }
        Ok(())
    }
}
