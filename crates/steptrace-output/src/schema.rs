//! Output schema: the frozen column list derived from the enabled field
//! groups and the layout mode.
//!
//! The schema is built once, when the sink opens, and never changes for
//! the rest of the run. Each [`Column`] knows how to pull its value out of
//! a [`StepRecord`], so backends never look at records directly.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use steptrace_types::{FieldGroup, LayoutMode, StepRecord};

/// Name of the single ntuple every backend writes.
pub const NTUPLE_NAME: &str = "g4sntuple";

/// Scalar type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// 32-bit signed integer.
    Int,
    /// 64-bit float.
    Real,
}

impl ColumnKind {
    /// Type name written into self-describing headers.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Real => "real",
        }
    }
}

/// Whether a column holds one value per row or a sequence per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnShape {
    /// One value per row.
    Scalar,
    /// A variable-length sequence per row.
    Sequence,
}

impl ColumnShape {
    /// Shape name written into self-describing headers.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Sequence => "sequence",
        }
    }
}

/// Which [`StepRecord`] field a column reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordField {
    /// `run_event_count`
    RunEventCount,
    /// `event_index`
    EventIndex,
    /// `particle_id`
    ParticleId,
    /// `track_id`
    TrackId,
    /// `parent_id`
    ParentId,
    /// `step_number`
    StepNumber,
    /// `kinetic_energy`
    KineticEnergy,
    /// `energy_deposit`
    EnergyDeposit,
    /// `global_position.x`
    X,
    /// `global_position.y`
    Y,
    /// `global_position.z`
    Z,
    /// `local_position.x`
    LocalX,
    /// `local_position.y`
    LocalY,
    /// `local_position.z`
    LocalZ,
    /// `momentum_direction.x`
    DirX,
    /// `momentum_direction.y`
    DirY,
    /// `momentum_direction.z`
    DirZ,
    /// `time`
    Time,
    /// `volume_id`
    VolumeId,
    /// `replica_index`
    ReplicaIndex,
}

/// One scalar cell extracted from a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    /// Integer cell.
    Int(i32),
    /// Real cell.
    Real(f64),
}

impl RecordField {
    /// Extract this field from a record.
    pub const fn cell(self, record: &StepRecord) -> Cell {
        match self {
            Self::RunEventCount => Cell::Int(record.run_event_count),
            Self::EventIndex => Cell::Int(record.event_index),
            Self::ParticleId => Cell::Int(record.particle_id),
            Self::TrackId => Cell::Int(record.track_id),
            Self::ParentId => Cell::Int(record.parent_id),
            Self::StepNumber => Cell::Int(record.step_number),
            Self::KineticEnergy => Cell::Real(record.kinetic_energy),
            Self::EnergyDeposit => Cell::Real(record.energy_deposit),
            Self::X => Cell::Real(record.global_position.x),
            Self::Y => Cell::Real(record.global_position.y),
            Self::Z => Cell::Real(record.global_position.z),
            Self::LocalX => Cell::Real(record.local_position.x),
            Self::LocalY => Cell::Real(record.local_position.y),
            Self::LocalZ => Cell::Real(record.local_position.z),
            Self::DirX => Cell::Real(record.momentum_direction.x),
            Self::DirY => Cell::Real(record.momentum_direction.y),
            Self::DirZ => Cell::Real(record.momentum_direction.z),
            Self::Time => Cell::Real(record.time),
            Self::VolumeId => Cell::Int(record.volume_id),
            Self::ReplicaIndex => Cell::Int(record.replica_index),
        }
    }

    /// Scalar kind of the field.
    pub const fn kind(self) -> ColumnKind {
        match self {
            Self::RunEventCount
            | Self::EventIndex
            | Self::ParticleId
            | Self::TrackId
            | Self::ParentId
            | Self::StepNumber
            | Self::VolumeId
            | Self::ReplicaIndex => ColumnKind::Int,
            Self::KineticEnergy
            | Self::EnergyDeposit
            | Self::X
            | Self::Y
            | Self::Z
            | Self::LocalX
            | Self::LocalY
            | Self::LocalZ
            | Self::DirX
            | Self::DirY
            | Self::DirZ
            | Self::Time => ColumnKind::Real,
        }
    }
}

/// Column definitions per field group, in output order.
const fn group_columns(group: FieldGroup) -> &'static [(&'static str, RecordField)] {
    match group {
        FieldGroup::Event => &[
            ("nEvents", RecordField::RunEventCount),
            ("event", RecordField::EventIndex),
        ],
        FieldGroup::Particle => &[("pid", RecordField::ParticleId)],
        FieldGroup::Track => &[
            ("trackID", RecordField::TrackId),
            ("parentID", RecordField::ParentId),
            ("step", RecordField::StepNumber),
        ],
        FieldGroup::KineticEnergy => &[("KE", RecordField::KineticEnergy)],
        FieldGroup::EnergyDeposit => &[("Edep", RecordField::EnergyDeposit)],
        FieldGroup::Position => &[
            ("x", RecordField::X),
            ("y", RecordField::Y),
            ("z", RecordField::Z),
        ],
        FieldGroup::LocalPosition => &[
            ("lx", RecordField::LocalX),
            ("ly", RecordField::LocalY),
            ("lz", RecordField::LocalZ),
        ],
        FieldGroup::Direction => &[
            ("px", RecordField::DirX),
            ("py", RecordField::DirY),
            ("pz", RecordField::DirZ),
        ],
        FieldGroup::Time => &[("t", RecordField::Time)],
        FieldGroup::Volume => &[
            ("volID", RecordField::VolumeId),
            ("iRep", RecordField::ReplicaIndex),
        ],
    }
}

/// A declared output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as it appears in the artifact.
    pub name: String,
    /// Scalar type.
    pub kind: ColumnKind,
    /// Scalar or per-row sequence.
    pub shape: ColumnShape,
    /// Field group the column belongs to.
    pub group: FieldGroup,
    /// Record field the column reads.
    pub field: RecordField,
}

/// The frozen column list and layout of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    layout: LayoutMode,
    columns: Vec<Column>,
}

impl OutputSchema {
    /// Build the schema for the given layout and enabled field groups.
    ///
    /// Columns follow the fixed order of [`FieldGroup::ALL`] regardless of
    /// the order groups were enabled in. In per-event layout the event
    /// identifiers stay scalar (one event per row); every other column
    /// becomes a sequence.
    pub fn new(layout: LayoutMode, enabled: &BTreeSet<FieldGroup>) -> Self {
        let columns = FieldGroup::ALL
            .into_iter()
            .filter(|group| enabled.contains(group))
            .flat_map(|group| {
                group_columns(group).iter().map(move |&(name, field)| {
                    let kind = field.kind();
                    let shape = if layout == LayoutMode::PerEvent && group != FieldGroup::Event {
                        ColumnShape::Sequence
                    } else {
                        ColumnShape::Scalar
                    };
                    Column {
                        name: name.to_owned(),
                        kind,
                        shape,
                        group,
                        field,
                    }
                })
            })
            .collect();

        Self { layout, columns }
    }

    /// Layout mode the schema was built for.
    pub const fn layout(&self) -> LayoutMode {
        self.layout
    }

    /// Declared columns, in output order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names, in output order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_groups() -> BTreeSet<FieldGroup> {
        FieldGroup::ALL.into_iter().collect()
    }

    #[test]
    fn full_stepwise_schema_has_every_column_scalar() {
        let schema = OutputSchema::new(LayoutMode::PerStep, &all_groups());
        assert_eq!(
            schema.column_names(),
            vec![
                "nEvents", "event", "pid", "trackID", "parentID", "step", "KE", "Edep", "x", "y",
                "z", "lx", "ly", "lz", "px", "py", "pz", "t", "volID", "iRep",
            ]
        );
        assert!(
            schema
                .columns()
                .iter()
                .all(|c| c.shape == ColumnShape::Scalar)
        );
    }

    #[test]
    fn eventwise_keeps_event_ids_scalar() {
        let schema = OutputSchema::new(LayoutMode::PerEvent, &all_groups());
        for column in schema.columns() {
            let expected = if column.group == FieldGroup::Event {
                ColumnShape::Scalar
            } else {
                ColumnShape::Sequence
            };
            assert_eq!(column.shape, expected, "column {}", column.name);
        }
    }

    #[test]
    fn disabled_groups_are_omitted_and_order_is_fixed() {
        let enabled: BTreeSet<FieldGroup> = [FieldGroup::Volume, FieldGroup::EnergyDeposit]
            .into_iter()
            .collect();
        let schema = OutputSchema::new(LayoutMode::PerStep, &enabled);
        assert_eq!(schema.column_names(), vec!["Edep", "volID", "iRep"]);
    }

    #[test]
    fn column_kinds_follow_record_fields() {
        let schema = OutputSchema::new(LayoutMode::PerStep, &all_groups());
        let kind_of = |name: &str| {
            schema
                .columns()
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.kind)
        };
        assert_eq!(kind_of("pid"), Some(ColumnKind::Int));
        assert_eq!(kind_of("Edep"), Some(ColumnKind::Real));
        assert_eq!(kind_of("iRep"), Some(ColumnKind::Int));
    }
}
