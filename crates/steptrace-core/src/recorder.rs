//! The step recorder: the per-run pipeline the transport engine drives.
//!
//! ```text
//! StepNotification
//!     |
//!     +-- RecordingPolicy  (classify pre/post volumes, 0-2 records)
//!     +-- EventAccumulator (event boundaries, per-event buffering)
//!     +-- Sink             (opened lazily on the first record)
//! ```
//!
//! Output settings may change freely until the sink opens. From then until
//! [`StepRecorder::end_run`], commands that would alter the file or its
//! schema are rejected with [`CommandError::SchemaFrozen`]. After `end_run`
//! the recorder is ready for another run, which may use a different
//! schema.

use steptrace_output::{OutputError, Sink, SinkConfig, SinkSummary};
use steptrace_types::{LayoutMode, StepNotification, StepRecord, VolumeRef};
use tracing::{debug, info, warn};

use crate::accumulator::{EventAccumulator, EventBatch};
use crate::classifier::VolumeClassifier;
use crate::command::{Command, CommandError, parse_command};
use crate::config::RecorderConfig;
use crate::policy::{RecordingMode, RecordingPolicy};

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The output could not be opened, written, or closed.
    #[error("output error: {source}")]
    Output {
        /// The underlying output error.
        #[from]
        source: OutputError,
    },
}

/// Result of applying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The setting was changed.
    Applied,
    /// Volumes listed by `listPhysVols`.
    Volumes(Vec<VolumeRef>),
}

/// A macro line that could not be applied.
#[derive(Debug)]
pub struct RejectedLine {
    /// 1-based line number.
    pub line: usize,
    /// Why it was rejected.
    pub error: CommandError,
}

/// Totals reported when a run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// What the sink wrote.
    pub output: SinkSummary,
    /// Step notifications received.
    pub steps: u64,
    /// Records produced by the policy.
    pub records: u64,
    /// Distinct events that produced records.
    pub events: u64,
    /// Per-event flushes.
    pub flushes: u64,
}

/// The recording pipeline for one run at a time.
#[derive(Debug)]
pub struct StepRecorder {
    sink_config: SinkConfig,
    policy: RecordingPolicy,
    classifier: VolumeClassifier,
    accumulator: EventAccumulator,
    sink: Option<Sink>,
    steps: u64,
    records: u64,
}

fn write_batch(sink: &mut Sink, batch: &EventBatch) -> Result<(), OutputError> {
    sink.write(&batch.records)?;
    sink.end_event()?;
    debug!(
        event = batch.event_id,
        records = batch.records.len(),
        "event flushed"
    );
    Ok(())
}

impl StepRecorder {
    /// Build a recorder from configuration. Invalid volume rules are
    /// logged and skipped.
    pub fn new(config: &RecorderConfig) -> Self {
        let mut classifier = VolumeClassifier::new();
        for rule in &config.volume_rules {
            if let Err(e) = classifier.add_rule(&rule.pattern, &rule.replacement) {
                warn!(error = %e, "volume rule from config ignored");
            }
        }
        let mode = if config.recording.record_all_steps {
            RecordingMode::AllSteps
        } else {
            RecordingMode::SensitiveVolumes
        };
        Self {
            sink_config: config.output.sink_config(),
            policy: RecordingPolicy::new(mode),
            classifier,
            accumulator: EventAccumulator::new(),
            sink: None,
            steps: 0,
            records: 0,
        }
    }

    /// Output settings for the next sink.
    pub const fn sink_config(&self) -> &SinkConfig {
        &self.sink_config
    }

    /// Current recording mode.
    pub const fn mode(&self) -> RecordingMode {
        self.policy.mode()
    }

    /// The volume classifier.
    pub const fn classifier(&self) -> &VolumeClassifier {
        &self.classifier
    }

    /// Whether the output is open for the current run.
    pub const fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Apply a parsed command.
    pub fn apply_command(&mut self, command: Command) -> Result<CommandOutcome, CommandError> {
        if command.affects_output() && self.is_open() {
            let error = CommandError::SchemaFrozen {
                command: command.name(),
            };
            warn!(command = command.name(), "{error}");
            return Err(error);
        }

        match command {
            Command::SetOutputFileName(name) => self.sink_config.file_name = name,
            Command::SetVolId {
                pattern,
                replacement,
            } => {
                self.classifier.add_rule(&pattern, &replacement)?;
            }
            Command::SetOutputFormat(format) => self.sink_config.format = format,
            Command::SetOutputOption(layout) => self.sink_config.layout = layout,
            Command::RecordAllSteps(all) => self.policy.set_mode(if all {
                RecordingMode::AllSteps
            } else {
                RecordingMode::SensitiveVolumes
            }),
            Command::ShowField(group) => {
                self.sink_config.fields.insert(group);
            }
            Command::HideField(group) => {
                self.sink_config.fields.remove(&group);
            }
            Command::ListPhysVols(filter) => {
                let volumes = self.classifier.known_volumes(filter.as_deref())?;
                for volume in &volumes {
                    info!(handle = %volume.handle, name = %volume.name, "physical volume");
                }
                return Ok(CommandOutcome::Volumes(volumes));
            }
        }
        Ok(CommandOutcome::Applied)
    }

    /// Parse and apply one command line. Blank and comment lines yield
    /// `Ok(None)`.
    pub fn execute(&mut self, line: &str) -> Result<Option<CommandOutcome>, CommandError> {
        parse_command(line)?
            .map(|command| self.apply_command(command))
            .transpose()
    }

    /// Apply every line of a macro. Bad lines are logged and skipped; the
    /// rest still take effect.
    pub fn apply_macro(&mut self, text: &str) -> Vec<RejectedLine> {
        let mut rejected = Vec::new();
        for (line, content) in (1_usize..).zip(text.lines()) {
            if let Err(error) = self.execute(content) {
                warn!(line, command = content.trim(), %error, "macro line rejected");
                rejected.push(RejectedLine { line, error });
            }
        }
        rejected
    }

    /// Add a volume to the `listPhysVols` catalogue.
    pub fn register_volume(&mut self, volume: &VolumeRef) {
        self.classifier.register_volume(volume.handle, &volume.name);
    }

    /// Process one step notification.
    pub fn record_step(&mut self, step: &StepNotification) -> Result<(), RecorderError> {
        self.steps = self.steps.saturating_add(1);
        for volume in [&step.pre.volume, &step.post.volume].into_iter().flatten() {
            self.classifier.register_volume(volume.handle, &volume.name);
        }

        let records = self.policy.decide(step, &mut self.classifier);
        if records.is_empty() {
            return Ok(());
        }
        self.records = self
            .records
            .saturating_add(u64::try_from(records.len()).unwrap_or(u64::MAX));

        self.open_sink()?;
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        for record in records {
            if let Some(batch) = self.accumulator.on_event_boundary(record.event_index) {
                write_batch(sink, &batch)?;
            }
            match self.sink_config.layout {
                LayoutMode::PerStep => sink.write(std::slice::from_ref(&record))?,
                LayoutMode::PerEvent => self.accumulator.append(record),
            }
        }
        Ok(())
    }

    /// Finish the run: flush the last event and close the output. A run
    /// with no records still produces a valid, empty file.
    ///
    /// The run's counters and buffered event are cleared even when the
    /// output fails, so the next run starts from zero.
    pub fn end_run(&mut self) -> Result<RunSummary, RecorderError> {
        let mut accumulator = std::mem::replace(&mut self.accumulator, EventAccumulator::new());
        let steps = std::mem::take(&mut self.steps);
        let records = std::mem::take(&mut self.records);
        let output = self.close_output(&mut accumulator)?;

        let summary = RunSummary {
            output,
            steps,
            records,
            events: accumulator.events_seen(),
            flushes: accumulator.flushes(),
        };
        info!(
            path = %summary.output.path.display(),
            rows = summary.output.rows,
            steps = summary.steps,
            records = summary.records,
            events = summary.events,
            "run finished"
        );
        Ok(summary)
    }

    /// Flush the last event of `accumulator` and close the sink, opening
    /// it first for an empty run. The sink is gone afterwards either way.
    fn close_output(
        &mut self,
        accumulator: &mut EventAccumulator,
    ) -> Result<SinkSummary, OutputError> {
        self.open_sink()?;
        let Some(mut sink) = self.sink.take() else {
            return Err(OutputError::Lifecycle {
                state: "not open",
                operation: "end the run",
            });
        };
        if let Some(batch) = accumulator.take_remaining() {
            write_batch(&mut sink, &batch)?;
        }
        sink.close()
    }

    fn open_sink(&mut self) -> Result<(), OutputError> {
        if self.sink.is_none() {
            self.sink = Some(Sink::open(&self.sink_config)?);
        }
        Ok(())
    }

    /// Records buffered for the event in flight (per-event layout).
    pub fn pending_records(&self) -> &[StepRecord] {
        self.accumulator.buffered()
    }
}

impl Drop for StepRecorder {
    fn drop(&mut self) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        if let Some(batch) = self.accumulator.take_remaining() {
            if let Err(e) = write_batch(&mut sink, &batch) {
                warn!(error = %e, "failed to flush last event on drop");
            }
        }
        if let Err(e) = sink.close() {
            warn!(error = %e, "failed to close output on drop");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use steptrace_types::FieldGroup;

    fn recorder(dir: &std::path::Path) -> StepRecorder {
        let mut config = RecorderConfig::default();
        config.output.file_name = dir.join("out").to_string_lossy().into_owned();
        StepRecorder::new(&config)
    }

    #[test]
    fn settings_change_freely_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        rec.execute("/steptrace/setOutputOption eventwise").unwrap();
        rec.execute("/steptrace/hideField time").unwrap();
        rec.execute("/steptrace/recordAllSteps").unwrap();
        assert_eq!(rec.sink_config().layout, LayoutMode::PerEvent);
        assert!(!rec.sink_config().fields.contains(&FieldGroup::Time));
        assert_eq!(rec.mode(), RecordingMode::AllSteps);
    }

    #[test]
    fn macro_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        let rejected = rec.apply_macro(concat!(
            "# setup\n",
            "/steptrace/setVolID Det 1\n",
            "/steptrace/setOutputFormat parquet\n",
            "\n",
            "/steptrace/setVolID (bad 2\n",
        ));
        let lines: Vec<usize> = rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 5]);
        assert_eq!(rec.classifier().rules().len(), 1);
    }

    #[test]
    fn invalid_config_rules_are_skipped() {
        let mut config = RecorderConfig::default();
        config.volume_rules = vec![
            crate::config::VolumeRuleConfig {
                pattern: "(".to_owned(),
                replacement: "1".to_owned(),
            },
            crate::config::VolumeRuleConfig {
                pattern: "Det".to_owned(),
                replacement: "1".to_owned(),
            },
        ];
        let rec = StepRecorder::new(&config);
        assert_eq!(rec.classifier().rules().len(), 1);
    }
}
