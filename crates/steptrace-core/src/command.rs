//! The `/steptrace/` command language.
//!
//! Commands arrive one per line, from macro files or trace entries:
//!
//! ```text
//! # comment
//! /steptrace/setOutputFileName run42
//! /steptrace/setOutputFormat columnar
//! /steptrace/setOutputOption eventwise
//! /steptrace/setVolID Det_(\d+) $1
//! /steptrace/hideField local
//! /steptrace/recordAllSteps
//! /steptrace/listPhysVols Det.*
//! ```
//!
//! Parsing is separate from applying: [`parse_command`] only checks
//! syntax, and the recorder decides whether a command is allowed in its
//! current state.

use steptrace_types::{FieldGroup, LayoutMode, OutputFormat};

use crate::classifier::ClassifierError;

/// Prefix shared by every command.
pub const COMMAND_PREFIX: &str = "/steptrace/";

/// Errors from parsing or applying a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command path is not recognized.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// A required argument is missing.
    #[error("{command} requires argument <{argument}>")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// Missing argument name.
        argument: &'static str,
    },

    /// More arguments than the command takes.
    #[error("{command} does not take argument {argument:?}")]
    UnexpectedArgument {
        /// Command name.
        command: &'static str,
        /// First surplus argument.
        argument: String,
    },

    /// Output format name not recognized.
    #[error("unknown output format {0:?} (expected csv, xml, columnar, or hierarchical)")]
    UnknownFormat(String),

    /// Layout name not recognized.
    #[error("unknown output option {0:?} (expected stepwise or eventwise)")]
    UnknownLayout(String),

    /// Field group name not recognized.
    #[error("unknown field group {0:?}")]
    UnknownField(String),

    /// Boolean argument not recognized.
    #[error("expected a boolean, got {0:?}")]
    InvalidBool(String),

    /// The output is open; the schema and file can no longer change.
    #[error("{command} rejected: output is already open for this run")]
    SchemaFrozen {
        /// Command name.
        command: &'static str,
    },

    /// A volume rule or filter was rejected.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// One parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the output base name.
    SetOutputFileName(String),
    /// Add or replace a volume classification rule.
    SetVolId {
        /// Regex matched against the whole volume name.
        pattern: String,
        /// Template producing the integer id.
        replacement: String,
    },
    /// Choose the backend encoding.
    SetOutputFormat(OutputFormat),
    /// Choose the row layout.
    SetOutputOption(LayoutMode),
    /// Switch between all-steps and sensitive-volume recording.
    RecordAllSteps(bool),
    /// Enable a field group.
    ShowField(FieldGroup),
    /// Disable a field group.
    HideField(FieldGroup),
    /// List known volumes, optionally filtered by a regex.
    ListPhysVols(Option<String>),
}

impl Command {
    /// Command name without the prefix.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetOutputFileName(_) => "setOutputFileName",
            Self::SetVolId { .. } => "setVolID",
            Self::SetOutputFormat(_) => "setOutputFormat",
            Self::SetOutputOption(_) => "setOutputOption",
            Self::RecordAllSteps(_) => "recordAllSteps",
            Self::ShowField(_) => "showField",
            Self::HideField(_) => "hideField",
            Self::ListPhysVols(_) => "listPhysVols",
        }
    }

    /// Most arguments the command accepts.
    const fn arity(&self) -> usize {
        match self {
            Self::SetVolId { .. } => 2,
            _ => 1,
        }
    }

    /// Whether the command changes the output file or its schema, and so
    /// must arrive before the output opens.
    pub const fn affects_output(&self) -> bool {
        matches!(
            self,
            Self::SetOutputFileName(_)
                | Self::SetOutputFormat(_)
                | Self::SetOutputOption(_)
                | Self::ShowField(_)
                | Self::HideField(_)
        )
    }
}

/// Parse an output format name. `root` and `hdf5` are accepted as aliases
/// for the columnar and hierarchical encodings.
pub fn parse_format(text: &str) -> Result<OutputFormat, CommandError> {
    match text.to_ascii_lowercase().as_str() {
        "csv" => Ok(OutputFormat::Delimited),
        "xml" => Ok(OutputFormat::Markup),
        "columnar" | "root" => Ok(OutputFormat::Columnar),
        "hierarchical" | "hdf5" => Ok(OutputFormat::Hierarchical),
        _ => Err(CommandError::UnknownFormat(text.to_owned())),
    }
}

/// Parse a layout name.
pub fn parse_layout(text: &str) -> Result<LayoutMode, CommandError> {
    match text.to_ascii_lowercase().as_str() {
        "stepwise" => Ok(LayoutMode::PerStep),
        "eventwise" => Ok(LayoutMode::PerEvent),
        _ => Err(CommandError::UnknownLayout(text.to_owned())),
    }
}

/// Parse a field group name.
pub fn parse_field_group(text: &str) -> Result<FieldGroup, CommandError> {
    FieldGroup::ALL
        .into_iter()
        .find(|group| group.as_str().eq_ignore_ascii_case(text))
        .ok_or_else(|| CommandError::UnknownField(text.to_owned()))
}

fn parse_bool(text: &str) -> Result<bool, CommandError> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CommandError::InvalidBool(text.to_owned())),
    }
}

/// Parse one line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let path = tokens.next().unwrap_or_default();
    let Some(name) = path.strip_prefix(COMMAND_PREFIX) else {
        return Err(CommandError::UnknownCommand(path.to_owned()));
    };
    let args: Vec<&str> = tokens.collect();
    let optional = |index: usize| args.get(index).copied();
    let required = |index: usize, command: &'static str, argument: &'static str| {
        optional(index).ok_or(CommandError::MissingArgument { command, argument })
    };

    let command = match name {
        "setOutputFileName" => {
            Command::SetOutputFileName(required(0, "setOutputFileName", "name")?.to_owned())
        }
        "setVolID" => Command::SetVolId {
            pattern: required(0, "setVolID", "pattern")?.to_owned(),
            replacement: required(1, "setVolID", "replacement")?.to_owned(),
        },
        "setOutputFormat" => {
            Command::SetOutputFormat(parse_format(required(0, "setOutputFormat", "format")?)?)
        }
        "setOutputOption" => {
            Command::SetOutputOption(parse_layout(required(0, "setOutputOption", "option")?)?)
        }
        "recordAllSteps" => Command::RecordAllSteps(optional(0).map_or(Ok(true), parse_bool)?),
        "showField" => Command::ShowField(parse_field_group(required(0, "showField", "group")?)?),
        "hideField" => Command::HideField(parse_field_group(required(0, "hideField", "group")?)?),
        "listPhysVols" => Command::ListPhysVols(optional(0).map(str::to_owned)),
        _ => return Err(CommandError::UnknownCommand(path.to_owned())),
    };
    if let Some(surplus) = args.get(command.arity()) {
        return Err(CommandError::UnexpectedArgument {
            command: command.name(),
            argument: (*surplus).to_owned(),
        });
    }
    Ok(Some(command))
}
