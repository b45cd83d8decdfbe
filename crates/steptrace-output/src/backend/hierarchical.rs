//! Hierarchical binary backend.
//!
//! A file read back through [`read_file`] is a tree of named groups holding
//! attributes and datasets:
//!
//! ```text
//! /                                   attrs: run, created
//! └── default_ntuples/
//!     └── g4sntuple/                  attrs: layout, columns, entries
//!         ├── event/pages
//!         ├── Edep/pages
//!         ├── Edep/lengths            (sequence columns only)
//!         └── ...
//! ```
//!
//! On disk the tree is streamed so memory stays bounded for long runs:
//!
//! ```text
//! MAGIC ("STNTHIER")
//! bincode(HierarchicalHeader)      run metadata, layout, column list
//! bincode(Chunk::Rows) ...         up to CHUNK_ROWS rows, flushed to disk
//! bincode(Chunk::End)              entry count
//! ```
//!
//! The output file is created at open so an unwritable path fails before
//! any step is processed.

use std::collections::BTreeMap;
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

/// Magic bytes at the start of every hierarchical file.
pub const MAGIC: &[u8; 8] = b"STNTHIER";

/// Name of the group that holds every ntuple.
pub const NTUPLES_GROUP: &str = "default_ntuples";

/// Data stored in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatasetData {
    /// Integer values.
    Int(Vec<i32>),
    /// Real values.
    Real(Vec<f64>),
    /// Per-row sequence lengths.
    Lengths(Vec<u32>),
}

/// A named leaf of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset name.
    pub name: String,
    /// Stored values.
    pub data: DatasetData,
}

/// A named interior node of the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group name (empty for the root).
    pub name: String,
    /// String attributes.
    pub attributes: BTreeMap<String, String>,
    /// Child groups.
    pub groups: Vec<Group>,
    /// Datasets directly in this group.
    pub datasets: Vec<Dataset>,
}

impl Group {
    /// Create an empty named group.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Child group by name.
    pub fn group(&self, name: &str) -> Option<&Self> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Look up a dataset by slash-separated path relative to this group,
    /// e.g. `default_ntuples/g4sntuple/Edep/pages`.
    pub fn dataset(&self, path: &str) -> Option<&Dataset> {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let leaf = segments.pop()?;
        let mut group = self;
        for segment in segments {
            group = group.group(segment)?;
        }
        group.datasets.iter().find(|d| d.name == leaf)
    }
}

/// Split a finished column page into its datasets.
fn page_datasets(page: ColumnPage) -> Vec<Dataset> {
    let dataset = |name: &str, data| Dataset {
        name: name.to_owned(),
        data,
    };
    match page {
        ColumnPage::Ints(values) => vec![dataset("pages", DatasetData::Int(values))],
        ColumnPage::Reals(values) => vec![dataset("pages", DatasetData::Real(values))],
        ColumnPage::IntSeqs { lengths, values } => vec![
            dataset("pages", DatasetData::Int(values)),
            dataset("lengths", DatasetData::Lengths(lengths)),
        ],
        ColumnPage::RealSeqs { lengths, values } => vec![
            dataset("pages", DatasetData::Real(values)),
            dataset("lengths", DatasetData::Lengths(lengths)),
        ],
    }
}

/// Maximum rows per chunk.
pub const CHUNK_ROWS: usize = 1024;

/// Header written once, before the first chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalHeader {
    /// Run metadata, stored as root attributes.
    pub meta: RunMeta,
    /// Row layout.
    pub layout: LayoutMode,
    /// Declared columns, in order.
    pub columns: Vec<Column>,
}

/// One framed block after the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Chunk {
    /// Rows appended to every column dataset.
    Rows {
        /// Rows in this chunk.
        rows: u32,
        /// Column pages, in declaration order.
        pages: Vec<ColumnPage>,
    },
    /// Trailer written on close.
    End {
        /// Rows in the whole ntuple.
        entries: u64,
    },
}

/// Hierarchical encoder.
#[derive(Default)]
pub struct HierarchicalBackend {
    out: Option<BufWriter<File>>,
    meta: Option<RunMeta>,
    layout: LayoutMode,
    buffer: RowBuffer,
    pages: PageSet,
    header_written: bool,
}

impl HierarchicalBackend {
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
        let header = HierarchicalHeader {
            meta,
            layout: self.layout,
            columns: self.buffer.columns().to_vec(),
        };
        self.pages = PageSet::for_columns(&header.columns);
        bincode::serialize_into(self.out("write the header")?, &header)?;
        self.header_written = true;
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<(), OutputError> {
        let rows = self.pages.rows();
        if rows == 0 {
            return Ok(());
        }
        let chunk = Chunk::Rows {
            rows: u32::try_from(rows).map_err(|_overflow| OutputError::CountOverflow)?,
            pages: self.pages.take(),
        };
        let out = self.out("write a chunk")?;
        bincode::serialize_into(&mut *out, &chunk)?;
        out.flush()?;
        debug!(rows, "hierarchical chunk written");
        Ok(())
    }
}

impl NtupleBackend for HierarchicalBackend {
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
        self.header_written = false;
        debug!(
            path = %path.display(),
            run_id = %meta.run_id,
            %layout,
            "hierarchical output opened"
        );
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
        if self.pages.rows() >= CHUNK_ROWS {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.ensure_header()?;
        self.flush_chunk()?;
        let chunk = Chunk::End {
            entries: self.buffer.rows(),
        };
        let out = self.out("close")?;
        bincode::serialize_into(&mut *out, &chunk)?;
        out.flush()?;
        self.out = None;
        self.meta = None;
        Ok(())
    }
}

/// Assemble the group tree from a header and every column's pages.
fn build_tree(header: &HierarchicalHeader, pages: Vec<ColumnPage>, entries: u64) -> Group {
    let mut ntuple = Group::named(NTUPLE_NAME);
    ntuple
        .attributes
        .insert("layout".to_owned(), header.layout.as_str().to_owned());
    ntuple.attributes.insert(
        "columns".to_owned(),
        header
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    ntuple
        .attributes
        .insert("entries".to_owned(), entries.to_string());
    for (column, page) in header.columns.iter().zip(pages) {
        let mut group = Group::named(column.name.clone());
        group
            .attributes
            .insert("type".to_owned(), column.kind.as_str().to_owned());
        group
            .attributes
            .insert("shape".to_owned(), column.shape.as_str().to_owned());
        group.datasets = page_datasets(page);
        ntuple.groups.push(group);
    }

    let mut ntuples = Group::named(NTUPLES_GROUP);
    ntuples.groups.push(ntuple);

    let mut root = Group::default();
    root.attributes
        .insert("run".to_owned(), header.meta.run_id.to_string());
    root.attributes
        .insert("created".to_owned(), header.meta.created_at.to_rfc3339());
    root.groups.push(ntuples);
    root
}

/// Read a whole hierarchical file, returning its root group.
pub fn read_file(path: &Path) -> Result<Group, OutputError> {
    let mut input = BufReader::new(File::open(path)?);
    let mut magic = [0_u8; 8];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(OutputError::BadMagic {
            expected: "hierarchical ntuple",
        });
    }

    let header: HierarchicalHeader = bincode::deserialize_from(&mut input)?;
    let mut pages = PageSet::for_columns(&header.columns);
    loop {
        match bincode::deserialize_from(&mut input)? {
            Chunk::Rows {
                pages: chunk_pages,
                ..
            } => pages.extend_from(chunk_pages)?,
            Chunk::End { entries } => {
                return Ok(build_tree(&header, pages.into_pages(), entries));
            }
        }
    }
}
