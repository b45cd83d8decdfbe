//! Column-wise storage shared by the binary encodings.
//!
//! A [`ColumnPage`] holds the values of one column for a run of rows.
//! Sequence columns store one length per row plus the flattened values,
//! so pages can be concatenated without rewriting offsets.

use serde::{Deserialize, Serialize};

use crate::backend::Value;
use crate::error::OutputError;
use crate::schema::{Column, ColumnKind, ColumnShape};

/// Values of one column for a contiguous run of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnPage {
    /// Scalar integers, one per row.
    Ints(Vec<i32>),
    /// Scalar reals, one per row.
    Reals(Vec<f64>),
    /// Integer sequences.
    IntSeqs {
        /// Sequence length of each row.
        lengths: Vec<u32>,
        /// All rows' values, concatenated.
        values: Vec<i32>,
    },
    /// Real sequences.
    RealSeqs {
        /// Sequence length of each row.
        lengths: Vec<u32>,
        /// All rows' values, concatenated.
        values: Vec<f64>,
    },
}

impl ColumnPage {
    /// An empty page matching the column's kind and shape.
    pub const fn for_column(column: &Column) -> Self {
        match (column.kind, column.shape) {
            (ColumnKind::Int, ColumnShape::Scalar) => Self::Ints(Vec::new()),
            (ColumnKind::Real, ColumnShape::Scalar) => Self::Reals(Vec::new()),
            (ColumnKind::Int, ColumnShape::Sequence) => Self::IntSeqs {
                lengths: Vec::new(),
                values: Vec::new(),
            },
            (ColumnKind::Real, ColumnShape::Sequence) => Self::RealSeqs {
                lengths: Vec::new(),
                values: Vec::new(),
            },
        }
    }

    /// Number of rows stored.
    pub fn rows(&self) -> usize {
        match self {
            Self::Ints(v) => v.len(),
            Self::Reals(v) => v.len(),
            Self::IntSeqs { lengths, .. } | Self::RealSeqs { lengths, .. } => lengths.len(),
        }
    }

    /// Append one row's value.
    pub fn push(&mut self, value: Value) -> Result<(), OutputError> {
        match (self, value) {
            (Self::Ints(page), Value::Int(v)) => page.push(v),
            (Self::Reals(page), Value::Real(v)) => page.push(v),
            (Self::IntSeqs { lengths, values }, Value::Ints(vs)) => {
                lengths.push(seq_len(vs.len())?);
                values.extend(vs);
            }
            (Self::RealSeqs { lengths, values }, Value::Reals(vs)) => {
                lengths.push(seq_len(vs.len())?);
                values.extend(vs);
            }
            _ => {
                return Err(OutputError::TypeMismatch {
                    column: "page".to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Append every row of `other`, which must have the same variant.
    pub fn extend_from(&mut self, other: Self) -> Result<(), OutputError> {
        match (self, other) {
            (Self::Ints(a), Self::Ints(b)) => a.extend(b),
            (Self::Reals(a), Self::Reals(b)) => a.extend(b),
            (
                Self::IntSeqs { lengths, values },
                Self::IntSeqs {
                    lengths: more_lengths,
                    values: more_values,
                },
            ) => {
                lengths.extend(more_lengths);
                values.extend(more_values);
            }
            (
                Self::RealSeqs { lengths, values },
                Self::RealSeqs {
                    lengths: more_lengths,
                    values: more_values,
                },
            ) => {
                lengths.extend(more_lengths);
                values.extend(more_values);
            }
            _ => {
                return Err(OutputError::TypeMismatch {
                    column: "page".to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Move the stored rows out, leaving an empty page of the same variant.
    pub fn take(&mut self) -> Self {
        let empty = match self {
            Self::Ints(_) => Self::Ints(Vec::new()),
            Self::Reals(_) => Self::Reals(Vec::new()),
            Self::IntSeqs { .. } => Self::IntSeqs {
                lengths: Vec::new(),
                values: Vec::new(),
            },
            Self::RealSeqs { .. } => Self::RealSeqs {
                lengths: Vec::new(),
                values: Vec::new(),
            },
        };
        std::mem::replace(self, empty)
    }
}

/// One page per declared column, holding the rows buffered since the last
/// flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSet {
    pages: Vec<ColumnPage>,
}

impl PageSet {
    /// Empty pages for the given columns.
    pub fn for_columns(columns: &[Column]) -> Self {
        Self {
            pages: columns.iter().map(ColumnPage::for_column).collect(),
        }
    }

    /// Rows currently buffered.
    pub fn rows(&self) -> usize {
        self.pages.first().map_or(0, ColumnPage::rows)
    }

    /// Append one committed row, one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), OutputError> {
        for (page, value) in self.pages.iter_mut().zip(row) {
            page.push(value)?;
        }
        Ok(())
    }

    /// Append pages read back from a file, in column order.
    pub fn extend_from(&mut self, pages: Vec<ColumnPage>) -> Result<(), OutputError> {
        for (page, more) in self.pages.iter_mut().zip(pages) {
            page.extend_from(more)?;
        }
        Ok(())
    }

    /// Move the buffered rows out, leaving empty pages behind.
    pub fn take(&mut self) -> Vec<ColumnPage> {
        self.pages.iter_mut().map(ColumnPage::take).collect()
    }

    /// The pages, consuming the set.
    pub fn into_pages(self) -> Vec<ColumnPage> {
        self.pages
    }
}

fn seq_len(len: usize) -> Result<u32, OutputError> {
    u32::try_from(len).map_err(|_overflow| OutputError::CountOverflow)
}

#[cfg(test)]
mod tests {
    use steptrace_types::FieldGroup;

    use super::*;
    use crate::schema::RecordField;

    fn seq_column() -> Column {
        Column {
            name: "Edep".to_owned(),
            kind: ColumnKind::Real,
            shape: ColumnShape::Sequence,
            group: FieldGroup::EnergyDeposit,
            field: RecordField::EnergyDeposit,
        }
    }

    #[test]
    fn sequence_pages_concatenate_by_length() {
        let mut first = ColumnPage::for_column(&seq_column());
        assert!(first.push(Value::Reals(vec![1.0, 2.0])).is_ok());
        let mut second = ColumnPage::for_column(&seq_column());
        assert!(second.push(Value::Reals(Vec::new())).is_ok());
        assert!(second.push(Value::Reals(vec![3.0])).is_ok());

        assert!(first.extend_from(second).is_ok());
        assert_eq!(first.rows(), 3);
        assert_eq!(
            first,
            ColumnPage::RealSeqs {
                lengths: vec![2, 0, 1],
                values: vec![1.0, 2.0, 3.0],
            }
        );
    }

    #[test]
    fn take_leaves_empty_page_of_same_variant() {
        let mut page = ColumnPage::Ints(vec![4, 5]);
        let taken = page.take();
        assert_eq!(taken, ColumnPage::Ints(vec![4, 5]));
        assert_eq!(page, ColumnPage::Ints(Vec::new()));
    }

    #[test]
    fn page_set_buffers_rows_until_taken() {
        let mut set = PageSet::for_columns(&[seq_column()]);
        assert!(set.push_row(vec![Value::Reals(vec![0.5])]).is_ok());
        assert!(set.push_row(vec![Value::Reals(vec![0.25, 0.75])]).is_ok());
        assert_eq!(set.rows(), 2);

        let taken = set.take();
        assert_eq!(set.rows(), 0);
        assert!(set.extend_from(taken).is_ok());
        assert_eq!(
            set.into_pages(),
            vec![ColumnPage::RealSeqs {
                lengths: vec![1, 2],
                values: vec![0.5, 0.25, 0.75],
            }]
        );
    }

    #[test]
    fn push_rejects_mismatched_value() {
        let mut page = ColumnPage::Ints(Vec::new());
        assert!(page.push(Value::Real(0.5)).is_err());
    }
}
