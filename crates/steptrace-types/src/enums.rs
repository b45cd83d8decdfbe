//! Enumeration types shared by the recording pipeline and the output layer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Field groups
// ---------------------------------------------------------------------------

/// A group of related output columns whose visibility is toggled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    /// Event index and the run's total event count.
    Event,
    /// Particle species code.
    Particle,
    /// Track id, parent id and step ordinal.
    Track,
    /// Kinetic energy at the sampled point.
    #[serde(rename = "energy")]
    KineticEnergy,
    /// Energy deposited by the step.
    #[serde(rename = "edep")]
    EnergyDeposit,
    /// Global position.
    Position,
    /// Position in the attributed volume's frame.
    #[serde(rename = "local")]
    LocalPosition,
    /// Momentum direction.
    Direction,
    /// Global time.
    Time,
    /// Volume classification and replica index.
    Volume,
}

impl FieldGroup {
    /// Every group, in column order.
    pub const ALL: [Self; 10] = [
        Self::Event,
        Self::Particle,
        Self::Track,
        Self::KineticEnergy,
        Self::EnergyDeposit,
        Self::Position,
        Self::LocalPosition,
        Self::Direction,
        Self::Time,
        Self::Volume,
    ];

    /// Name used in configuration files and commands.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Particle => "particle",
            Self::Track => "track",
            Self::KineticEnergy => "energy",
            Self::EnergyDeposit => "edep",
            Self::Position => "position",
            Self::LocalPosition => "local",
            Self::Direction => "direction",
            Self::Time => "time",
            Self::Volume => "volume",
        }
    }
}

impl core::fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// How records map onto output rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutMode {
    /// One row per recorded step, scalar columns.
    #[default]
    #[serde(rename = "stepwise")]
    PerStep,
    /// One row per event, columns hold the event's records as sequences.
    #[serde(rename = "eventwise")]
    PerEvent,
}

impl LayoutMode {
    /// Name used in configuration files, commands, and file metadata.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerStep => "stepwise",
            Self::PerEvent => "eventwise",
        }
    }
}

impl core::fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// Backend encoding of the output artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Plain delimited text (CSV).
    #[default]
    #[serde(rename = "csv")]
    Delimited,
    /// Tagged markup (XML).
    #[serde(rename = "xml")]
    Markup,
    /// Self-describing binary, stored column-wise in baskets.
    Columnar,
    /// Binary tree of groups and datasets.
    Hierarchical,
}

impl OutputFormat {
    /// Name used in configuration files and commands.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delimited => "csv",
            Self::Markup => "xml",
            Self::Columnar => "columnar",
            Self::Hierarchical => "hierarchical",
        }
    }
}

impl core::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step point kind
// ---------------------------------------------------------------------------

/// Which end of a step a record samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPointKind {
    /// The point where the step started.
    Pre,
    /// The point where the step ended.
    Post,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_group_names_match_serde() {
        for group in FieldGroup::ALL {
            let json = serde_json::to_string(&group).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", group.as_str()));
        }
    }

    #[test]
    fn defaults_are_stepwise_csv() {
        assert_eq!(LayoutMode::default(), LayoutMode::PerStep);
        assert_eq!(OutputFormat::default(), OutputFormat::Delimited);
    }
}
