//! Configuration loading and typed config structures for the step recorder.
//!
//! The configuration lives in `steptrace-config.yaml`. Every section is
//! optional and defaults to the recorder's built-in behavior: CSV output
//! named `g4simpleout`, one row per step, every field group shown,
//! sensitive-volume recording, no volume rules.
//!
//! ```yaml
//! output:
//!   file_name: run42
//!   format: columnar
//!   layout: eventwise
//!   fields:
//!     local: false
//! recording:
//!   record_all_steps: false
//! volume_rules:
//!   - pattern: 'Det_(\d+)'
//!     replacement: '$1'
//! logging:
//!   level: debug
//! ```
//!
//! Unknown format, layout or field-group names are logged and the default
//! is kept. Only malformed YAML fails to load.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use steptrace_output::{DEFAULT_FILE_NAME, SinkConfig};
use steptrace_types::{FieldGroup, LayoutMode, OutputFormat};
use tracing::warn;

use crate::command::{parse_field_group, parse_format, parse_layout};

/// Environment variable that overrides `output.file_name`.
pub const OUTPUT_ENV: &str = "STEPTRACE_OUTPUT";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level recorder configuration.
///
/// Mirrors the structure of `steptrace-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecorderConfig {
    /// Output file, encoding, layout and visible fields.
    #[serde(default)]
    pub output: OutputConfig,

    /// Recording mode.
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Volume classification rules, in match order.
    #[serde(default)]
    pub volume_rules: Vec<VolumeRuleConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RecorderConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `STEPTRACE_OUTPUT` overrides `output.file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.output.apply_env_overrides();
        Ok(config)
    }
}

/// Output section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Output base name; the format's extension is appended when missing.
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Backend encoding. Accepts the command aliases `root` and `hdf5`.
    #[serde(default, deserialize_with = "lenient_format")]
    pub format: OutputFormat,

    /// Row layout.
    #[serde(default, deserialize_with = "lenient_layout")]
    pub layout: LayoutMode,

    /// Per-group visibility. Groups not listed are shown.
    #[serde(default, deserialize_with = "lenient_fields")]
    pub fields: BTreeMap<FieldGroup, bool>,
}

impl OutputConfig {
    /// Apply `STEPTRACE_OUTPUT` if it is set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_file_name_override(std::env::var(OUTPUT_ENV).ok());
    }

    /// Replace the file name when an override is present and non-empty.
    pub fn apply_file_name_override(&mut self, file_name: Option<String>) {
        if let Some(name) = file_name.filter(|n| !n.trim().is_empty()) {
            self.file_name = name;
        }
    }

    /// The sink configuration this section describes.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            file_name: self.file_name.clone(),
            format: self.format,
            layout: self.layout,
            fields: FieldGroup::ALL
                .into_iter()
                .filter(|group| self.fields.get(group).copied().unwrap_or(true))
                .collect(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            format: OutputFormat::default(),
            layout: LayoutMode::default(),
            fields: BTreeMap::new(),
        }
    }
}

/// Recording section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordingConfig {
    /// Record every step instead of only sensitive-volume steps.
    #[serde(default)]
    pub record_all_steps: bool,
}

/// One volume rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeRuleConfig {
    /// Regex matched against the whole volume name.
    pub pattern: String,
    /// Template producing the integer id.
    pub replacement: String,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient name resolution (unknown names warn and keep the default)
// ---------------------------------------------------------------------------

fn lenient_format<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OutputFormat, D::Error> {
    let name = String::deserialize(deserializer)?;
    Ok(parse_format(&name).unwrap_or_else(|error| {
        let fallback = OutputFormat::default();
        warn!(%error, fallback = fallback.as_str(), "output.format ignored");
        fallback
    }))
}

fn lenient_layout<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LayoutMode, D::Error> {
    let name = String::deserialize(deserializer)?;
    Ok(parse_layout(&name).unwrap_or_else(|error| {
        let fallback = LayoutMode::default();
        warn!(%error, fallback = fallback.as_str(), "output.layout ignored");
        fallback
    }))
}

fn lenient_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<FieldGroup, bool>, D::Error> {
    let raw = BTreeMap::<String, bool>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, shown)| match parse_field_group(&name) {
            Ok(group) => Some((group, shown)),
            Err(error) => {
                warn!(%error, "output.fields entry ignored");
                None
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config: RecorderConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config.output.file_name, "g4simpleout");
        assert_eq!(config.output.format, OutputFormat::Delimited);
        assert_eq!(config.output.layout, LayoutMode::PerStep);
        assert!(!config.recording.record_all_steps);
        assert!(config.volume_rules.is_empty());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.sink_config(), SinkConfig::default());
    }

    #[test]
    fn full_yaml_parses() {
        let yaml = r"
output:
  file_name: run42
  format: hierarchical
  layout: eventwise
  fields:
    local: false
    direction: false
    edep: true
recording:
  record_all_steps: true
volume_rules:
  - pattern: 'Det_(\d+)'
    replacement: '$1'
  - pattern: 'Veto'
    replacement: '99'
logging:
  level: debug
";
        let config: RecorderConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.output.format, OutputFormat::Hierarchical);
        assert_eq!(config.output.layout, LayoutMode::PerEvent);
        assert!(config.recording.record_all_steps);
        assert_eq!(config.volume_rules.len(), 2);
        assert_eq!(
            config.volume_rules.first().map(|r| r.pattern.as_str()),
            Some(r"Det_(\d+)")
        );
        assert_eq!(config.logging.level, "debug");

        let sink = config.output.sink_config();
        assert_eq!(sink.fields.len(), FieldGroup::ALL.len() - 2);
        assert!(!sink.fields.contains(&FieldGroup::LocalPosition));
        assert!(sink.fields.contains(&FieldGroup::EnergyDeposit));
    }

    #[test]
    fn file_name_override_ignores_blank_values() {
        let mut output = OutputConfig::default();
        output.apply_file_name_override(Some("  ".to_owned()));
        assert_eq!(output.file_name, "g4simpleout");
        output.apply_file_name_override(Some("from_env".to_owned()));
        assert_eq!(output.file_name, "from_env");
        output.apply_file_name_override(None);
        assert_eq!(output.file_name, "from_env");
    }

    #[test]
    fn unknown_names_keep_defaults() {
        let config = RecorderConfig::parse("output:\n  format: parquet\n").unwrap();
        assert_eq!(config.output.format, OutputFormat::Delimited);

        let config = RecorderConfig::parse("output:\n  layout: sideways\n").unwrap();
        assert_eq!(config.output.layout, LayoutMode::PerStep);

        let yaml = "output:\n  fields:\n    mass: false\n    local: false\n";
        let config = RecorderConfig::parse(yaml).unwrap();
        let sink = config.output.sink_config();
        assert_eq!(sink.fields.len(), FieldGroup::ALL.len() - 1);
        assert!(!sink.fields.contains(&FieldGroup::LocalPosition));
    }

    #[test]
    fn format_aliases_match_the_command_language() {
        let config = RecorderConfig::parse("output:\n  format: root\n").unwrap();
        assert_eq!(config.output.format, OutputFormat::Columnar);
        let config = RecorderConfig::parse("output:\n  format: HDF5\n").unwrap();
        assert_eq!(config.output.format, OutputFormat::Hierarchical);
    }

    #[test]
    fn malformed_yaml_is_still_an_error() {
        let result = RecorderConfig::parse("output: [unclosed\n");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
