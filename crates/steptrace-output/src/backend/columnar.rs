//! Self-describing columnar binary backend.
//!
//! File layout:
//!
//! ```text
//! MAGIC ("STNTCOL1")
//! bincode(ColumnarHeader)          run metadata, layout, column list
//! bincode(Frame::Basket) ...       up to BASKET_ROWS rows, stored column-wise
//! bincode(Frame::End)              total row count
//! ```
//!
//! Rows are buffered column-wise and written out in baskets so memory stays
//! bounded no matter how long the run is. [`read_file`] reassembles the
//! baskets into one page per column.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use steptrace_types::{LayoutMode, RunMeta};
use tracing::debug;

use crate::backend::page::{ColumnPage, PageSet};
use crate::backend::{NtupleBackend, RowBuffer, Value};
use crate::error::OutputError;
use crate::schema::{Column, NTUPLE_NAME};

/// Magic bytes at the start of every columnar file.
pub const MAGIC: &[u8; 8] = b"STNTCOL1";

/// Maximum rows per basket.
pub const BASKET_ROWS: usize = 1024;

/// Header written once, before the first basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnarHeader {
    /// Ntuple name.
    pub ntuple: String,
    /// Run metadata.
    pub meta: RunMeta,
    /// Row layout.
    pub layout: LayoutMode,
    /// Declared columns, in order.
    pub columns: Vec<Column>,
}

/// One framed block after the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// A block of rows, one page per column.
    Basket {
        /// Rows in this basket.
        rows: u32,
        /// Column pages, in declaration order.
        pages: Vec<ColumnPage>,
    },
    /// Trailer written on close.
    End {
        /// Rows in the whole file.
        total_rows: u64,
    },
}

/// Columnar encoder.
#[derive(Default)]
pub struct ColumnarBackend {
    out: Option<BufWriter<File>>,
    meta: Option<RunMeta>,
    layout: LayoutMode,
    buffer: RowBuffer,
    pages: PageSet,
    header_written: bool,
}

impl ColumnarBackend {
    /// Create an unopened backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn out(&mut self, operation: &'static str) -> Result<&mut BufWriter<File>, OutputError> {
        self.out.as_mut().ok_or(OutputError::Lifecycle {
            state: "not open",
            operation,
        })
    }

    fn ensure_header(&mut self) -> Result<(), OutputError> {
        if self.header_written {
            return Ok(());
        }
        let meta = self.meta.clone().ok_or(OutputError::Lifecycle {
            state: "not open",
            operation: "write the header",
        })?;
        let header = ColumnarHeader {
            ntuple: NTUPLE_NAME.to_owned(),
            meta,
            layout: self.layout,
            columns: self.buffer.columns().to_vec(),
        };
        self.pages = PageSet::for_columns(&header.columns);
        bincode::serialize_into(self.out("write the header")?, &header)?;
        self.header_written = true;
        Ok(())
    }

    fn flush_basket(&mut self) -> Result<(), OutputError> {
        let rows = self.pages.rows();
        if rows == 0 {
            return Ok(());
        }
        let frame = Frame::Basket {
            rows: u32::try_from(rows).map_err(|_overflow| OutputError::CountOverflow)?,
            pages: self.pages.take(),
        };
        bincode::serialize_into(self.out("write a basket")?, &frame)?;
        debug!(rows, "columnar basket written");
        Ok(())
    }
}

impl NtupleBackend for ColumnarBackend {
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
        let mut out = BufWriter::new(file);
        out.write_all(MAGIC)?;
        self.out = Some(out);
        self.meta = Some(meta.clone());
        self.layout = layout;
        debug!(path = %path.display(), run_id = %meta.run_id, %layout, "columnar output opened");
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
        self.pages.push_row(row)?;
        if self.pages.rows() >= BASKET_ROWS {
            self.flush_basket()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.ensure_header()?;
        self.flush_basket()?;
        let frame = Frame::End {
            total_rows: self.buffer.rows(),
        };
        let out = self.out("close")?;
        bincode::serialize_into(&mut *out, &frame)?;
        out.flush()?;
        self.out = None;
        Ok(())
    }
}

/// A columnar file read back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnarFile {
    /// File header.
    pub header: ColumnarHeader,
    /// One page per column holding every row.
    pub pages: Vec<ColumnPage>,
    /// Row count from the trailer.
    pub total_rows: u64,
}

impl ColumnarFile {
    /// Page of the named column.
    pub fn column(&self, name: &str) -> Option<&ColumnPage> {
        self.header
            .columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.pages.get(i))
    }
}

/// Read a whole columnar file.
pub fn read_file(path: &Path) -> Result<ColumnarFile, OutputError> {
    let mut input = BufReader::new(File::open(path)?);
    let mut magic = [0_u8; 8];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(OutputError::BadMagic {
            expected: "columnar ntuple",
        });
    }

    let header: ColumnarHeader = bincode::deserialize_from(&mut input)?;
    let mut pages = PageSet::for_columns(&header.columns);
    loop {
        match bincode::deserialize_from(&mut input)? {
            Frame::Basket {
                pages: basket_pages,
                ..
            } => pages.extend_from(basket_pages)?,
            Frame::End { total_rows } => {
                return Ok(ColumnarFile {
                    header,
                    pages: pages.into_pages(),
                    total_rows,
                });
            }
        }
    }
}
