//! Backend abstraction and implementations.
//!
//! Every encoding implements the same capability set, [`NtupleBackend`]:
//! open a file, declare columns, fill column values for the current row,
//! commit the row, and close. The [`Sink`](crate::sink::Sink) drives these
//! calls; nothing above the sink knows which encoding is in use.
//!
//! Concrete backends are collected in the [`Backend`] enum and built by
//! [`create_backend`] from the configured [`OutputFormat`].

pub mod columnar;
pub mod delimited;
pub mod hierarchical;
pub mod markup;
pub mod page;

use std::path::Path;

use steptrace_types::{LayoutMode, OutputFormat, RunMeta};

use crate::error::OutputError;
use crate::schema::{Column, ColumnKind, ColumnShape};

pub use columnar::ColumnarBackend;
pub use delimited::DelimitedBackend;
pub use hierarchical::HierarchicalBackend;
pub use markup::MarkupBackend;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A filled column value for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Scalar integer.
    Int(i32),
    /// Scalar real.
    Real(f64),
    /// Integer sequence.
    Ints(Vec<i32>),
    /// Real sequence.
    Reals(Vec<f64>),
}

impl Value {
    /// Whether this value can be stored in `column`.
    pub const fn fits(&self, column: &Column) -> bool {
        matches!(
            (self, column.kind, column.shape),
            (Self::Int(_), ColumnKind::Int, ColumnShape::Scalar)
                | (Self::Real(_), ColumnKind::Real, ColumnShape::Scalar)
                | (Self::Ints(_), ColumnKind::Int, ColumnShape::Sequence)
                | (Self::Reals(_), ColumnKind::Real, ColumnShape::Sequence)
        )
    }

    /// Text rendering used by the text-based encodings. Sequences are
    /// space-separated.
    pub fn to_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Ints(vs) => join(vs),
            Self::Reals(vs) => join(vs),
        }
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Capability set
// ---------------------------------------------------------------------------

/// The operations every output encoding supports.
///
/// Call order is `open`, `declare_column` for every column, then any
/// number of (`fill_column` for every column, `commit_row`), then `close`.
pub trait NtupleBackend {
    /// Create the output file.
    fn open(&mut self, path: &Path, meta: &RunMeta, layout: LayoutMode)
    -> Result<(), OutputError>;

    /// Declare the next column. Only valid before the first row.
    fn declare_column(&mut self, column: &Column) -> Result<(), OutputError>;

    /// Set the value of column `index` for the row being built.
    fn fill_column(&mut self, index: usize, value: Value) -> Result<(), OutputError>;

    /// Write the row being built.
    fn commit_row(&mut self) -> Result<(), OutputError>;

    /// Finalize and flush the file. A file with zero rows is still valid.
    fn close(&mut self) -> Result<(), OutputError>;
}

/// A concrete output backend.
pub enum Backend {
    /// Plain delimited text.
    Delimited(DelimitedBackend),
    /// Tagged markup.
    Markup(MarkupBackend),
    /// Self-describing columnar binary.
    Columnar(ColumnarBackend),
    /// Hierarchical binary tree.
    Hierarchical(HierarchicalBackend),
}

impl Backend {
    /// The format this backend writes.
    pub const fn format(&self) -> OutputFormat {
        match self {
            Self::Delimited(_) => OutputFormat::Delimited,
            Self::Markup(_) => OutputFormat::Markup,
            Self::Columnar(_) => OutputFormat::Columnar,
            Self::Hierarchical(_) => OutputFormat::Hierarchical,
        }
    }

    fn inner(&mut self) -> &mut dyn NtupleBackend {
        match self {
            Self::Delimited(b) => b,
            Self::Markup(b) => b,
            Self::Columnar(b) => b,
            Self::Hierarchical(b) => b,
        }
    }
}

impl NtupleBackend for Backend {
    fn open(
        &mut self,
        path: &Path,
        meta: &RunMeta,
        layout: LayoutMode,
    ) -> Result<(), OutputError> {
        self.inner().open(path, meta, layout)
    }

    fn declare_column(&mut self, column: &Column) -> Result<(), OutputError> {
        self.inner().declare_column(column)
    }

    fn fill_column(&mut self, index: usize, value: Value) -> Result<(), OutputError> {
        self.inner().fill_column(index, value)
    }

    fn commit_row(&mut self) -> Result<(), OutputError> {
        self.inner().commit_row()
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.inner().close()
    }
}

/// Create a backend for the configured format.
pub fn create_backend(format: OutputFormat) -> Backend {
    match format {
        OutputFormat::Delimited => Backend::Delimited(DelimitedBackend::new()),
        OutputFormat::Markup => Backend::Markup(MarkupBackend::new()),
        OutputFormat::Columnar => Backend::Columnar(ColumnarBackend::new()),
        OutputFormat::Hierarchical => Backend::Hierarchical(HierarchicalBackend::new()),
    }
}

/// File extension appended to output names that lack one.
pub const fn default_extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Delimited => "csv",
        OutputFormat::Markup => "xml",
        OutputFormat::Columnar => "ntc",
        OutputFormat::Hierarchical => "nth",
    }
}

// ---------------------------------------------------------------------------
// Shared row assembly
// ---------------------------------------------------------------------------

/// Declared columns plus the row currently being filled.
///
/// Every backend embeds one of these so column declaration, type checks,
/// and completeness checks behave identically across encodings.
#[derive(Debug, Default)]
pub struct RowBuffer {
    columns: Vec<Column>,
    pending: Vec<Option<Value>>,
    rows: u64,
}

impl RowBuffer {
    /// Declare a column. Fails once rows have been committed.
    pub fn declare(&mut self, column: &Column) -> Result<(), OutputError> {
        if self.rows > 0 {
            return Err(OutputError::Lifecycle {
                state: "writing rows",
                operation: "declare a column",
            });
        }
        self.columns.push(column.clone());
        self.pending.push(None);
        Ok(())
    }

    /// Declared columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows committed so far.
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Store a value for the current row after checking its type.
    pub fn fill(&mut self, index: usize, value: Value) -> Result<(), OutputError> {
        let column = self
            .columns
            .get(index)
            .ok_or(OutputError::UnknownColumn(index))?;
        if !value.fits(column) {
            return Err(OutputError::TypeMismatch {
                column: column.name.clone(),
            });
        }
        let slot = self
            .pending
            .get_mut(index)
            .ok_or(OutputError::UnknownColumn(index))?;
        *slot = Some(value);
        Ok(())
    }

    /// Take the completed row, leaving every slot empty.
    pub fn take_row(&mut self) -> Result<Vec<Value>, OutputError> {
        if let Some(missing) = self
            .pending
            .iter()
            .zip(&self.columns)
            .find_map(|(slot, column)| slot.is_none().then_some(column))
        {
            return Err(OutputError::IncompleteRow {
                column: missing.name.clone(),
            });
        }
        let row = self.pending.iter_mut().filter_map(Option::take).collect();
        self.rows = self.rows.checked_add(1).ok_or(OutputError::CountOverflow)?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use steptrace_types::FieldGroup;

    use super::*;
    use crate::schema::RecordField;

    fn int_column(name: &str) -> Column {
        Column {
            name: name.to_owned(),
            kind: ColumnKind::Int,
            shape: ColumnShape::Scalar,
            group: FieldGroup::Volume,
            field: RecordField::VolumeId,
        }
    }

    #[test]
    fn row_buffer_rejects_wrong_kind() {
        let mut buffer = RowBuffer::default();
        assert!(buffer.declare(&int_column("volID")).is_ok());
        let result = buffer.fill(0, Value::Real(1.5));
        assert!(matches!(result, Err(OutputError::TypeMismatch { .. })));
    }

    #[test]
    fn row_buffer_requires_every_column() {
        let mut buffer = RowBuffer::default();
        assert!(buffer.declare(&int_column("volID")).is_ok());
        assert!(buffer.declare(&int_column("iRep")).is_ok());
        assert!(buffer.fill(0, Value::Int(1)).is_ok());
        let result = buffer.take_row();
        assert!(matches!(result, Err(OutputError::IncompleteRow { column }) if column == "iRep"));
    }

    #[test]
    fn row_buffer_blocks_late_declarations() {
        let mut buffer = RowBuffer::default();
        assert!(buffer.declare(&int_column("volID")).is_ok());
        assert!(buffer.fill(0, Value::Int(2)).is_ok());
        assert_eq!(buffer.take_row().ok(), Some(vec![Value::Int(2)]));
        assert!(buffer.declare(&int_column("iRep")).is_err());
    }

    #[test]
    fn sequence_text_is_space_separated() {
        assert_eq!(Value::Ints(vec![1, 2, 3]).to_text(), "1 2 3");
        assert_eq!(Value::Reals(vec![0.5, 2.0]).to_text(), "0.5 2");
        assert_eq!(Value::Reals(Vec::new()).to_text(), "");
    }
}
