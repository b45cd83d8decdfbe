//! Detector hits built from a recorded ntuple.
//!
//! A hit is the energy one detector element collected in one event: every
//! positive `Edep` with the same `(event, volID, iRep)` is summed, and the
//! sum is optionally smeared with a Gaussian energy resolution
//!
//! ```text
//! sigma = resolution_pct / 100 * sqrt(energy)
//! ```
//!
//! Only the binary encodings can be read back. Both row layouts are
//! accepted; per-event sequence columns are unrolled against the scalar
//! `event` column.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use steptrace_types::OutputFormat;
use tracing::debug;

use crate::backend::hierarchical::{DatasetData, Group};
use crate::backend::page::ColumnPage;
use crate::backend::{columnar, hierarchical};
use crate::error::OutputError;
use crate::schema::NTUPLE_NAME;

/// One recorded energy deposit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deposit {
    /// Event the deposit belongs to.
    pub event: i32,
    /// Classified volume id.
    pub volume_id: i32,
    /// Replica index of the volume.
    pub replica: i32,
    /// Deposited energy.
    pub energy: f64,
}

/// Summed (and possibly smeared) energy of one detector element in one
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Event the hit belongs to.
    pub event: i32,
    /// Classified volume id.
    #[serde(rename = "volID")]
    pub volume_id: i32,
    /// Detector element, taken from the replica index.
    #[serde(rename = "detID")]
    pub detector_id: i32,
    /// Collected energy.
    pub energy: f64,
}

/// How deposits are turned into hits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HitOptions {
    /// Keep only deposits in this volume id. `None` keeps every sensitive
    /// volume (`volID > 0`).
    pub volume_id: Option<i32>,
    /// Energy resolution in percent at unit energy. Zero disables
    /// smearing.
    pub resolution_pct: f64,
}

impl HitOptions {
    fn accepts(&self, deposit: &Deposit) -> bool {
        let volume_ok = self
            .volume_id
            .map_or(deposit.volume_id > 0, |id| deposit.volume_id == id);
        volume_ok && deposit.energy > 0.0
    }
}

/// Sum deposits into hits, ordered by event, volume id and detector id.
pub fn build_hits<R: Rng + ?Sized>(
    deposits: &[Deposit],
    options: &HitOptions,
    rng: &mut R,
) -> Vec<Hit> {
    let mut sums: BTreeMap<(i32, i32, i32), f64> = BTreeMap::new();
    for deposit in deposits.iter().filter(|d| options.accepts(d)) {
        *sums
            .entry((deposit.event, deposit.volume_id, deposit.replica))
            .or_insert(0.0) += deposit.energy;
    }

    let hits: Vec<Hit> = sums
        .into_iter()
        .map(|((event, volume_id, detector_id), energy)| Hit {
            event,
            volume_id,
            detector_id,
            energy: smear(energy, options.resolution_pct, rng),
        })
        .collect();
    debug!(
        deposits = deposits.len(),
        hits = hits.len(),
        resolution_pct = options.resolution_pct,
        "hits built"
    );
    hits
}

fn smear<R: Rng + ?Sized>(energy: f64, resolution_pct: f64, rng: &mut R) -> f64 {
    if resolution_pct <= 0.0 {
        return energy;
    }
    let sigma = resolution_pct / 100.0 * energy.sqrt();
    standard_normal(rng).mul_add(sigma, energy)
}

/// Box-Muller draw from N(0, 1).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - [0, 1) keeps the logarithm finite.
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Write hits as CSV with an `event,volID,detID,energy` header.
pub fn write_hits(path: &Path, hits: &[Hit]) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_path(path)?;
    for hit in hits {
        writer.serialize(hit)?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading deposits back
// ---------------------------------------------------------------------------

/// Read every deposit from a file written in `format`.
pub fn read_deposits(path: &Path, format: OutputFormat) -> Result<Vec<Deposit>, OutputError> {
    let pages = match format {
        OutputFormat::Columnar => {
            let file = columnar::read_file(path)?;
            let column = |name: &str| {
                file.column(name)
                    .cloned()
                    .ok_or_else(|| OutputError::MissingColumn {
                        column: name.to_owned(),
                    })
            };
            DepositPages {
                event: column("event")?,
                energy: column("Edep")?,
                volume_id: column("volID")?,
                replica: column("iRep")?,
            }
        }
        OutputFormat::Hierarchical => {
            let root = hierarchical::read_file(path)?;
            let ntuple = root
                .group(hierarchical::NTUPLES_GROUP)
                .and_then(|g| g.group(NTUPLE_NAME))
                .ok_or_else(|| OutputError::MissingColumn {
                    column: NTUPLE_NAME.to_owned(),
                })?;
            DepositPages {
                event: group_page(ntuple, "event")?,
                energy: group_page(ntuple, "Edep")?,
                volume_id: group_page(ntuple, "volID")?,
                replica: group_page(ntuple, "iRep")?,
            }
        }
        OutputFormat::Delimited | OutputFormat::Markup => {
            return Err(OutputError::UnreadableFormat {
                format: format.as_str(),
            });
        }
    };
    pages.into_deposits()
}

/// The four columns a hit needs, as stored in the file.
struct DepositPages {
    event: ColumnPage,
    energy: ColumnPage,
    volume_id: ColumnPage,
    replica: ColumnPage,
}

impl DepositPages {
    fn into_deposits(self) -> Result<Vec<Deposit>, OutputError> {
        let events = match self.event {
            ColumnPage::Ints(values) => values,
            _ => return Err(mismatch("event")),
        };
        let (lengths, energies) = match self.energy {
            ColumnPage::Reals(values) => (vec![1; values.len()], values),
            ColumnPage::RealSeqs { lengths, values } => (lengths, values),
            _ => return Err(mismatch("Edep")),
        };
        let volume_ids = int_values(self.volume_id, "volID")?;
        let replicas = int_values(self.replica, "iRep")?;
        if volume_ids.len() != energies.len() || replicas.len() != energies.len() {
            return Err(OutputError::IncompleteRow {
                column: "volID".to_owned(),
            });
        }

        let mut row_events = Vec::with_capacity(energies.len());
        for (event, length) in events.iter().zip(&lengths) {
            let count = usize::try_from(*length).map_err(|_overflow| OutputError::CountOverflow)?;
            row_events.extend(std::iter::repeat_n(*event, count));
        }
        if row_events.len() != energies.len() {
            return Err(OutputError::IncompleteRow {
                column: "event".to_owned(),
            });
        }

        Ok(row_events
            .into_iter()
            .zip(energies)
            .zip(volume_ids.into_iter().zip(replicas))
            .map(|((event, energy), (volume_id, replica))| Deposit {
                event,
                volume_id,
                replica,
                energy,
            })
            .collect())
    }
}

fn int_values(page: ColumnPage, column: &str) -> Result<Vec<i32>, OutputError> {
    match page {
        ColumnPage::Ints(values) | ColumnPage::IntSeqs { values, .. } => Ok(values),
        _ => Err(mismatch(column)),
    }
}

fn mismatch(column: &str) -> OutputError {
    OutputError::TypeMismatch {
        column: column.to_owned(),
    }
}

/// Rebuild a column page from a hierarchical column group.
fn group_page(ntuple: &Group, name: &str) -> Result<ColumnPage, OutputError> {
    let missing = || OutputError::MissingColumn {
        column: name.to_owned(),
    };
    let group = ntuple.group(name).ok_or_else(missing)?;
    let pages = group.dataset("pages").ok_or_else(missing)?;
    let lengths = match group.dataset("lengths").map(|d| &d.data) {
        Some(DatasetData::Lengths(lengths)) => Some(lengths.clone()),
        Some(_) => return Err(mismatch(name)),
        None => None,
    };
    match (&pages.data, lengths) {
        (DatasetData::Int(values), None) => Ok(ColumnPage::Ints(values.clone())),
        (DatasetData::Real(values), None) => Ok(ColumnPage::Reals(values.clone())),
        (DatasetData::Int(values), Some(lengths)) => Ok(ColumnPage::IntSeqs {
            lengths,
            values: values.clone(),
        }),
        (DatasetData::Real(values), Some(lengths)) => Ok(ColumnPage::RealSeqs {
            lengths,
            values: values.clone(),
        }),
        (DatasetData::Lengths(_), _) => Err(mismatch(name)),
    }
}
