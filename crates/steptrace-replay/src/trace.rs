//! JSON-lines step traces.
//!
//! A trace is what a transport engine would have pushed into the recorder,
//! one entry per line:
//!
//! ```text
//! {"kind":"volume","handle":7,"name":"Shield"}
//! {"kind":"command","line":"/steptrace/setOutputFormat xml"}
//! {"kind":"step","event_id":0,"run_event_count":1,...}
//! {"kind":"end_run"}
//! ```
//!
//! Blank lines are ignored.

use std::io::BufRead;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use steptrace_types::StepNotification;

use crate::error::ReplayError;

/// One line of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
    /// Announce a physical volume before any step touches it.
    Volume {
        /// Interned handle.
        handle: u32,
        /// Display name.
        name: String,
    },
    /// One step notification.
    Step(Box<StepNotification>),
    /// A `/steptrace/` command line.
    Command {
        /// The raw command text.
        line: String,
    },
    /// End the current run.
    EndRun,
}

/// Streams [`TraceEntry`] values from a line-oriented reader.
#[derive(Debug)]
pub struct TraceReader<R> {
    source: R,
    path: PathBuf,
    line: usize,
    buffer: String,
}

impl<R: BufRead> TraceReader<R> {
    /// Wrap a reader; `path` is only used in error messages.
    pub fn new(source: R, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
            line: 0,
            buffer: String::new(),
        }
    }

    /// Lines consumed so far.
    pub const fn lines_read(&self) -> usize {
        self.line
    }

    fn next_entry(&mut self) -> Result<Option<TraceEntry>, ReplayError> {
        loop {
            self.buffer.clear();
            let read = self
                .source
                .read_line(&mut self.buffer)
                .map_err(|source| ReplayError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            if read == 0 {
                return Ok(None);
            }
            self.line = self.line.saturating_add(1);
            let text = self.buffer.trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str(text)
                .map(Some)
                .map_err(|source| ReplayError::Trace {
                    line: self.line,
                    source,
                });
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceEntry, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn entries(text: &str) -> Vec<Result<TraceEntry, ReplayError>> {
        TraceReader::new(Cursor::new(text.to_owned()), "test.jsonl").collect()
    }

    #[test]
    fn reads_each_entry_kind() {
        let text = r#"{"kind":"volume","handle":3,"name":"Det_3"}

{"kind":"command","line":"/steptrace/recordAllSteps"}
{"kind":"step","event_id":2,"run_event_count":5,"particle_id":22,"track_id":1,"parent_id":0,"step_number":1,"energy_deposit":0.25,
 "pre":{"volume":{"handle":3,"name":"Det_3"},"kinetic_energy":1.0,"position":{"x":0.0,"y":0.0,"z":0.0},"momentum_direction":{"x":0.0,"y":0.0,"z":1.0},"global_time":0.0},
 "post":{"volume":null,"kinetic_energy":0.5,"position":{"x":0.0,"y":0.0,"z":1.0},"momentum_direction":{"x":0.0,"y":0.0,"z":1.0},"global_time":0.1}}
{"kind":"end_run"}
"#
        .replace("\n \"", " \"");
        let parsed: Vec<TraceEntry> = entries(&text).into_iter().map(Result::unwrap).collect();

        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed.first(),
            Some(&TraceEntry::Volume {
                handle: 3,
                name: "Det_3".to_owned()
            })
        );
        let Some(TraceEntry::Step(step)) = parsed.get(2) else {
            panic!("third entry should be a step");
        };
        assert_eq!(step.event_id, 2);
        assert!(step.post.volume.is_none());
        assert_eq!(step.pre.replica, 0);
        assert_eq!(parsed.last(), Some(&TraceEntry::EndRun));
    }

    #[test]
    fn bad_line_reports_its_number() {
        let result = entries("{\"kind\":\"end_run\"}\n\n{\"kind\":\"explode\"}\n");
        assert!(result.first().is_some_and(Result::is_ok));
        assert!(matches!(
            result.get(1),
            Some(Err(ReplayError::Trace { line: 3, .. }))
        ));
    }
}
