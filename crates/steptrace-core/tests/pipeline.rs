//! End-to-end tests for the step recorder: notifications in, files out.
//!
//! Every test writes into its own temporary directory and reads the
//! artifact back through the output crate's readers or the csv crate.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::too_many_lines,
    clippy::panic
)]

use std::path::Path;

use steptrace_core::{CommandError, CommandOutcome, RecorderConfig, RecorderError, StepRecorder};
use steptrace_output::backend::columnar;
use steptrace_output::backend::page::ColumnPage;
use steptrace_types::{AffineTransform, StepNotification, StepPoint, ThreeVector, VolumeRef};

// =============================================================================
// Helpers
// =============================================================================

const WORLD: (u32, &str) = (0, "World");
const DET: (u32, &str) = (1, "Det_1");

fn point(volume: (u32, &str), z: f64) -> StepPoint {
    StepPoint {
        volume: Some(VolumeRef::new(volume.0, volume.1)),
        kinetic_energy: 2.0,
        position: ThreeVector::new(0.0, 0.0, z),
        momentum_direction: ThreeVector::new(0.0, 0.0, 1.0),
        global_time: z,
        replica: 0,
        frame: AffineTransform::IDENTITY,
    }
}

fn step(
    event: i32,
    track: i32,
    number: i32,
    edep: f64,
    pre: (u32, &str),
    post: (u32, &str),
) -> StepNotification {
    StepNotification {
        event_id: event,
        run_event_count: 3,
        particle_id: 11,
        track_id: track,
        parent_id: if track == 1 { 0 } else { 1 },
        step_number: number,
        energy_deposit: edep,
        pre: point(pre, 0.0),
        post: point(post, 1.0),
    }
}

fn recorder(dir: &Path, yaml: &str) -> StepRecorder {
    let mut config = RecorderConfig::parse(yaml).unwrap();
    config.output.file_name = dir.join("run").to_string_lossy().into_owned();
    let mut rec = StepRecorder::new(&config);
    rec.execute(r"/steptrace/setVolID Det_(\d+) $1").unwrap();
    rec
}

/// One CSV column as strings.
fn csv_column(path: &Path, name: &str) -> Vec<String> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let index = reader
        .headers()
        .unwrap()
        .iter()
        .position(|h| h == name)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap()[index].to_owned())
        .collect()
}

// =============================================================================
// Event framing
// =============================================================================

#[test]
fn eventwise_run_flushes_once_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "output:\n  format: columnar\n  layout: eventwise\n");

    for (number, event) in (2..).zip([1, 1, 1, 2, 2, 3]) {
        rec.record_step(&step(event, 2, number, 0.5, DET, DET)).unwrap();
    }
    let summary = rec.end_run().unwrap();

    assert_eq!(summary.steps, 6);
    assert_eq!(summary.records, 6);
    assert_eq!(summary.events, 3);
    assert_eq!(summary.flushes, 3);
    assert_eq!(summary.output.rows, 3);

    let file = columnar::read_file(&summary.output.path).unwrap();
    assert_eq!(file.column("event"), Some(&ColumnPage::Ints(vec![1, 2, 3])));
    let Some(ColumnPage::IntSeqs { lengths, values }) = file.column("step") else {
        panic!("step column should be a sequence");
    };
    assert_eq!(lengths, &vec![3, 2, 1]);
    assert_eq!(values, &vec![2, 3, 4, 5, 6, 7]);
}

#[test]
fn stepwise_run_writes_rows_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "");

    rec.record_step(&step(0, 2, 2, 0.5, DET, DET)).unwrap();
    rec.record_step(&step(1, 2, 3, 0.5, DET, DET)).unwrap();
    assert!(rec.pending_records().is_empty());
    let summary = rec.end_run().unwrap();

    assert_eq!(summary.output.rows, 2);
    assert_eq!(summary.flushes, 0);
    assert_eq!(csv_column(&summary.output.path, "event"), vec!["0", "1"]);
}

// =============================================================================
// Recording policy through the pipeline
// =============================================================================

#[test]
fn boundary_entry_is_recorded_as_zero_deposit_marker() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "");

    // Primary's first step in the world: production state only.
    rec.record_step(&step(0, 1, 1, 0.0, WORLD, WORLD)).unwrap();
    // A secondary crosses into the detector; the deposit belongs to the world.
    rec.record_step(&step(0, 2, 3, 0.2, WORLD, DET)).unwrap();
    // A step in the world that does not touch the detector.
    rec.record_step(&step(0, 2, 4, 0.2, WORLD, WORLD)).unwrap();
    let summary = rec.end_run().unwrap();

    let path = &summary.output.path;
    assert_eq!(summary.output.rows, 2);
    assert_eq!(csv_column(path, "trackID"), vec!["1", "2"]);
    assert_eq!(csv_column(path, "step"), vec!["0", "3"]);
    assert_eq!(csv_column(path, "Edep"), vec!["0", "0"]);
    assert_eq!(csv_column(path, "volID"), vec!["0", "1"]);
}

#[test]
fn record_all_steps_keeps_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "recording:\n  record_all_steps: true\n");

    let steps = [
        step(0, 1, 1, 0.0, WORLD, WORLD),
        step(0, 1, 2, 0.0, WORLD, WORLD),
        step(0, 2, 1, 0.1, WORLD, WORLD),
        step(0, 3, 1, 0.0, WORLD, DET),
        step(0, 3, 2, 0.3, DET, DET),
    ];
    for s in &steps {
        rec.record_step(s).unwrap();
    }
    let summary = rec.end_run().unwrap();

    // One post record per step plus one pre record per track.
    assert_eq!(summary.output.rows, 8);
    assert_eq!(
        csv_column(&summary.output.path, "trackID"),
        vec!["1", "1", "1", "2", "2", "3", "3", "3"]
    );
}

// =============================================================================
// Schema freeze and run lifecycle
// =============================================================================

#[test]
fn output_commands_are_rejected_while_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "");

    rec.record_step(&step(0, 2, 2, 0.5, DET, DET)).unwrap();
    assert!(rec.is_open());

    for line in [
        "/steptrace/hideField time",
        "/steptrace/setOutputOption eventwise",
        "/steptrace/setOutputFormat xml",
        "/steptrace/setOutputFileName other",
    ] {
        assert!(
            matches!(rec.execute(line), Err(CommandError::SchemaFrozen { .. })),
            "{line} should be rejected"
        );
    }
    // Non-output commands still work mid-run.
    assert!(rec.execute("/steptrace/setVolID Veto 9").is_ok());

    rec.record_step(&step(0, 2, 3, 0.5, DET, DET)).unwrap();
    let first = rec.end_run().unwrap();
    let mut reader = csv::Reader::from_path(&first.output.path).unwrap();
    assert_eq!(reader.headers().unwrap().len(), 20);
    assert_eq!(reader.records().count(), 2);

    // A new run may choose a different schema.
    rec.execute(&format!(
        "/steptrace/setOutputFileName {}",
        dir.path().join("second").display()
    ))
    .unwrap();
    rec.execute("/steptrace/hideField time").unwrap();
    rec.record_step(&step(1, 2, 2, 0.5, DET, DET)).unwrap();
    let second = rec.end_run().unwrap();
    let mut reader = csv::Reader::from_path(&second.output.path).unwrap();
    assert_eq!(reader.headers().unwrap().len(), 19);
    assert_ne!(first.output.run_id, second.output.run_id);
}

#[test]
fn empty_run_still_produces_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "output:\n  format: xml\n");
    rec.record_step(&step(0, 2, 5, 0.0, WORLD, WORLD)).unwrap();
    assert!(!rec.is_open());

    let summary = rec.end_run().unwrap();
    assert_eq!(summary.output.rows, 0);
    assert_eq!(summary.steps, 1);
    let text = std::fs::read_to_string(&summary.output.path).unwrap();
    assert!(text.contains("<columns>"));
    assert!(!text.contains("<row>"));
    assert!(text.trim_end().ends_with("</ntuples>"));
}

#[test]
fn dropping_the_recorder_flushes_the_last_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = {
        let mut rec = recorder(dir.path(), "output:\n  format: columnar\n  layout: eventwise\n");
        rec.record_step(&step(4, 2, 2, 0.5, DET, DET)).unwrap();
        rec.record_step(&step(4, 2, 3, 0.5, DET, DET)).unwrap();
        assert_eq!(rec.pending_records().len(), 2);
        dir.path().join("run.ntc")
    };

    let file = columnar::read_file(&path).unwrap();
    assert_eq!(file.total_rows, 1);
    assert_eq!(file.column("event"), Some(&ColumnPage::Ints(vec![4])));
}

#[test]
fn unwritable_output_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RecorderConfig::default();
    config.output.file_name = dir
        .path()
        .join("no_such_dir")
        .join("run")
        .to_string_lossy()
        .into_owned();
    let mut rec = StepRecorder::new(&config);
    rec.execute("/steptrace/setVolID Det_1 1").unwrap();

    let result = rec.record_step(&step(0, 2, 2, 0.5, DET, DET));
    assert!(matches!(result, Err(RecorderError::Output { .. })));
}

#[test]
fn failed_end_run_still_resets_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RecorderConfig::default();
    config.output.file_name = dir
        .path()
        .join("no_such_dir")
        .join("run")
        .to_string_lossy()
        .into_owned();
    let mut rec = StepRecorder::new(&config);
    rec.record_step(&step(0, 2, 2, 0.0, WORLD, WORLD)).unwrap();
    rec.record_step(&step(0, 2, 3, 0.0, WORLD, WORLD)).unwrap();

    assert!(matches!(rec.end_run(), Err(RecorderError::Output { .. })));
    assert!(!rec.is_open());

    let retry = dir.path().join("retry");
    rec.execute(&format!("/steptrace/setOutputFileName {}", retry.display()))
        .unwrap();
    let summary = rec.end_run().unwrap();
    assert_eq!(summary.steps, 0);
    assert_eq!(summary.records, 0);
    assert_eq!(summary.events, 0);
    assert_eq!(summary.output.rows, 0);
    assert!(summary.output.path.exists());
}

#[test]
fn list_phys_vols_reports_seen_volumes() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = recorder(dir.path(), "");
    rec.register_volume(&VolumeRef::new(7, "Shield"));
    rec.record_step(&step(0, 2, 2, 0.0, WORLD, DET)).unwrap();

    let Some(CommandOutcome::Volumes(all)) = rec.execute("/steptrace/listPhysVols").unwrap()
    else {
        panic!("listPhysVols should list volumes");
    };
    let names: Vec<&str> = all.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["World", "Det_1", "Shield"]);

    let Some(CommandOutcome::Volumes(dets)) =
        rec.execute("/steptrace/listPhysVols Det.*").unwrap()
    else {
        panic!("listPhysVols should list volumes");
    };
    assert_eq!(dets.len(), 1);
}
